//! The per-page keyed value store.
//!
//! Writes and notifications are split on purpose: `write` is synchronous,
//! silent and safe during a render pass; `notify` invokes listeners and
//! belongs to the effect phase. The scheduler relies on this split to let
//! every producer finish its writes before any consumer hears about them.
//!
//! The version counter increments on every successful write and serves as
//! a cheap external-change token for tearing-free reads: a consumer that
//! saw the same version twice saw the same store.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::value::Value;

/// Handle returned by [`Store::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&str, &Value)>;

/// Keyed value exchange for one mounted page.
///
/// Lives exactly as long as its page instance; never shared across mounts
/// or reused after unmount. None of its operations can fail.
pub struct Store {
    values: RefCell<FxHashMap<String, Value>>,
    version: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            values: RefCell::new(FxHashMap::default()),
            version: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    /// Identity-compared update. Returns whether the store changed; a
    /// write with a reference-identical value is a no-op and leaves the
    /// version counter untouched. Never triggers listeners.
    pub fn write(&self, name: &str, value: Value) -> bool {
        let mut values = self.values.borrow_mut();
        if let Some(existing) = values.get(name)
            && existing.same(&value)
        {
            return false;
        }
        values.insert(name.to_string(), value);
        self.version.set(self.version.get() + 1);
        true
    }

    /// Current value of a name, if any unit has published it.
    pub fn read(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }

    /// Invoke every registered listener with the changed name and its
    /// value. Listeners self-filter by name. Must run outside the
    /// synchronous render pass.
    pub fn notify(&self, name: &str, value: &Value) {
        // Snapshot so listeners may subscribe or unsubscribe mid-call.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(name, value);
        }
    }

    /// Register a listener; returns the id to unsubscribe with.
    pub fn subscribe(&self, listener: impl Fn(&str, &Value) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(l, _)| *l != id);
    }

    /// Monotonic change token; bumps on every successful write.
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

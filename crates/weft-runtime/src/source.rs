//! Ambient event sources.
//!
//! Builtin reactive values (viewport width, dark-mode flag, clock tick)
//! come from the host, not from any cell. Each is a typed event source a
//! unit subscribes to and tears down on unmount; they are deliberately
//! decoupled from the store, which carries only cell-produced names.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_core::{BUILTIN_NAMES, DISPLAY_BUILTIN, VIEW_BUILTIN};

use crate::value::Value;

/// One host-driven stream of values with a current snapshot.
pub struct ExternalSource {
    name: String,
    current: RefCell<Value>,
    subscribers: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
    next_id: Cell<u64>,
}

impl ExternalSource {
    pub fn new(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            current: RefCell::new(initial),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current snapshot of the source.
    pub fn get(&self) -> Value {
        self.current.borrow().clone()
    }

    /// Push a new value and wake every subscriber.
    pub fn emit(&self, value: Value) {
        *self.current.borrow_mut() = value;
        let subscribers: Vec<Rc<dyn Fn()>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for subscriber in subscribers {
            subscriber();
        }
    }

    pub fn subscribe(&self, f: impl Fn() + 'static) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.borrow_mut().retain(|(s, _)| *s != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// The ambient value sources for one page mount.
///
/// `display` and `view` are capabilities on the unit scope rather than
/// values, so they carry no source here.
pub struct Builtins {
    sources: Vec<Rc<ExternalSource>>,
}

impl Builtins {
    /// The standard host set with quiet defaults.
    pub fn standard() -> Self {
        let sources = BUILTIN_NAMES
            .iter()
            .filter(|n| **n != DISPLAY_BUILTIN && **n != VIEW_BUILTIN)
            .map(|name| {
                let initial = match *name {
                    "width" => Value::from(1280i64),
                    "dark" => Value::from(false),
                    "now" => Value::from(0i64),
                    _ => Value::Null,
                };
                Rc::new(ExternalSource::new(*name, initial))
            })
            .collect();
        Self { sources }
    }

    pub fn source(&self, name: &str) -> Option<&Rc<ExternalSource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Current snapshot of a builtin, or `Null` for an unknown name.
    pub fn get(&self, name: &str) -> Value {
        self.source(name).map(|s| s.get()).unwrap_or_default()
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_updates_snapshot_and_wakes() {
        let source = ExternalSource::new("width", Value::from(1280i64));
        let woken = Rc::new(Cell::new(0));
        let counter = woken.clone();
        let id = source.subscribe(move || counter.set(counter.get() + 1));

        source.emit(Value::from(640i64));
        assert_eq!(woken.get(), 1);
        assert_eq!(source.get().to_string(), "640");

        source.unsubscribe(id);
        source.emit(Value::from(320i64));
        assert_eq!(woken.get(), 1);
    }

    #[test]
    fn test_standard_builtins() {
        let builtins = Builtins::standard();
        assert!(builtins.source("width").is_some());
        assert!(builtins.source("dark").is_some());
        assert!(builtins.source("now").is_some());
        // Capabilities are not sources.
        assert!(builtins.source("display").is_none());
        assert!(builtins.source("view").is_none());
        assert!(matches!(builtins.get("unknown"), Value::Null));
    }
}

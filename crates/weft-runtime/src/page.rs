//! Page scheduling: the render, commit and effect phases.
//!
//! A [`PageDef`] is the mountable description generated code builds; a
//! [`Page`] is one mounted instance, owning exactly one [`Store`] and the
//! unit states. Scheduling is single-threaded and cooperative: a render
//! pass computes dirty units (its only side effect is silent same-pass
//! store writes), commit attaches artifacts, and the effect phase delivers
//! notifications and starts asynchronous tasks on a local pool. Within one
//! change cycle every producer's writes land before any consumer's
//! notification fires.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{UnitError, UnitResult};
use crate::source::{Builtins, ExternalSource};
use crate::store::{ListenerId, Store};
use crate::unit::{Rendered, UnitBody, UnitDef, UnitScope, render_value};
use crate::value::{Artifact, Value};

/// Lifecycle of one published name across its producing unit's life.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotPhase {
    /// No value yet; renders nothing.
    #[default]
    Unset,
    /// Holds a computed value.
    Ready,
    /// A dependency changed; the previous value stays visible until the
    /// new computation lands.
    Recomputing,
    /// The last change cycle failed. Cleared by the next change.
    Error(String),
}

#[derive(Debug, Clone, Default)]
struct Slot {
    phase: SlotPhase,
    value: Option<Value>,
}

impl Slot {
    fn set(&mut self, value: Value) {
        self.phase = SlotPhase::Ready;
        self.value = Some(value);
    }

    fn recomputing(&mut self) {
        self.phase = SlotPhase::Recomputing;
    }

    fn error(&mut self, message: String) {
        self.phase = SlotPhase::Error(message);
    }

    /// A task settled without assigning this slot; fall back to whatever
    /// it held before.
    fn settle(&mut self) {
        self.phase = if self.value.is_some() {
            SlotPhase::Ready
        } else {
            SlotPhase::Unset
        };
    }

    fn rendered(&self) -> Rendered {
        match (&self.phase, &self.value) {
            (SlotPhase::Ready | SlotPhase::Recomputing, Some(value)) => render_value(value),
            _ => Rendered::Nothing,
        }
    }
}

/// Write-backs from a unit's asynchronous task or bound artifact.
enum Event {
    TaskValue {
        unit: usize,
        generation: u64,
        result: UnitResult<Value>,
    },
    TaskAssign {
        unit: usize,
        generation: u64,
        name: String,
        value: Value,
    },
    TaskDisplay {
        unit: usize,
        generation: u64,
        value: Value,
    },
    ArtifactChanged {
        unit: usize,
        value: Value,
    },
}

type Inbox = Rc<RefCell<Vec<Event>>>;

/// Handle a unit's asynchronous body writes back through.
///
/// The generation is captured when the task starts; a later dependency
/// change or unmount bumps the unit's counter, turning every method here
/// into a silent no-op. A superseded task can therefore never write.
#[derive(Clone)]
pub struct TaskHandle {
    unit: usize,
    generation: u64,
    current: Rc<Cell<u64>>,
    inbox: Inbox,
    spawner: LocalSpawner,
}

impl TaskHandle {
    /// Run the task body. Its eventual result is delivered in a later
    /// effect phase, subject to the generation check.
    pub fn run(&self, task: impl Future<Output = UnitResult<Value>> + 'static) {
        let handle = self.clone();
        let spawned = self.spawner.spawn_local(async move {
            let result = task.await;
            handle.deliver(Event::TaskValue {
                unit: handle.unit,
                generation: handle.generation,
                result,
            });
        });
        if let Err(e) = spawned {
            tracing::warn!("failed to start unit task: {}", e);
        }
    }

    /// Assign one declared name's slot. Slots update independently as the
    /// task reaches each assignment.
    pub fn assign(&self, name: &str, value: Value) {
        self.deliver(Event::TaskAssign {
            unit: self.unit,
            generation: self.generation,
            name: name.to_string(),
            value,
        });
    }

    /// Append to the unit's display list.
    pub fn display(&self, value: Value) {
        self.deliver(Event::TaskDisplay {
            unit: self.unit,
            generation: self.generation,
            value,
        });
    }

    fn deliver(&self, event: Event) {
        if self.current.get() != self.generation {
            tracing::debug!("superseded task output dropped");
            return;
        }
        self.inbox.borrow_mut().push(event);
    }
}

/// A mountable page description: units in initial-compute order, the
/// assembled body template and the host-provided free environment.
pub struct PageDef {
    units: Vec<UnitDef>,
    template: String,
    free_env: FxHashMap<String, Value>,
}

impl PageDef {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            template: String::new(),
            free_env: FxHashMap::default(),
        }
    }

    /// Add a unit. The initial render pass computes units in push order.
    pub fn push(&mut self, unit: UnitDef) {
        self.units.push(unit);
    }

    /// Attach the assembled body template.
    pub fn template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    /// Provide a value for a free reference.
    pub fn provide(&mut self, name: impl Into<String>, value: Value) {
        self.free_env.insert(name.into(), value);
    }

    /// Mount with the standard builtin sources.
    pub fn mount(self) -> Page {
        self.mount_with(Builtins::standard())
    }

    /// Mount one page instance. Creates the store, wires subscriptions
    /// and runs the initial change cycle.
    pub fn mount_with(self, builtins: Builtins) -> Page {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let store = Store::new();
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));

        let mut units = Vec::new();
        for def in self.units {
            let dirty = Rc::new(Cell::new(true));

            // Units with no sibling references never touch the store's
            // listener list.
            let listener = if def.read_names().is_empty() {
                None
            } else {
                let names: FxHashSet<String> = def.read_names().iter().cloned().collect();
                let flag = dirty.clone();
                Some(store.subscribe(move |name, _| {
                    if names.contains(name) {
                        flag.set(true);
                    }
                }))
            };

            let mut ambient_subs = Vec::new();
            for name in def.ambient_names() {
                if let Some(source) = builtins.source(name) {
                    let flag = dirty.clone();
                    let id = source.subscribe(move || flag.set(true));
                    ambient_subs.push((source.clone(), id));
                }
            }

            let body = def.body();
            let mut slot_names: Vec<String> = def.write_names().to_vec();
            if let Some(
                UnitBody::SyncBlock { names, .. } | UnitBody::AsyncBlock { names, .. },
            ) = body.as_deref()
            {
                for name in names {
                    if !slot_names.contains(name) {
                        slot_names.push(name.clone());
                    }
                }
            }
            if let Some(UnitBody::ViewBinding { name, .. }) = body.as_deref()
                && !slot_names.contains(name)
            {
                slot_names.push(name.clone());
            }

            units.push(UnitState {
                def,
                dirty,
                generation: Rc::new(Cell::new(0)),
                memo: None,
                value: Slot::default(),
                slots: slot_names.into_iter().map(|n| (n, Slot::default())).collect(),
                displayed: Vec::new(),
                listener,
                ambient_subs,
                artifact: None,
                pending: false,
            });
        }

        let mut page = Page {
            store,
            builtins,
            free_env: self.free_env,
            template: self.template,
            units,
            inbox,
            pool,
            spawner,
        };
        page.flush();
        page
    }
}

impl Default for PageDef {
    fn default() -> Self {
        Self::new()
    }
}

struct UnitState {
    def: UnitDef,
    dirty: Rc<Cell<bool>>,
    generation: Rc<Cell<u64>>,
    /// Identity tuple of the last computed inputs.
    memo: Option<Vec<Value>>,
    /// The unit's own value, for expression-shaped bodies.
    value: Slot,
    /// One slot per published name.
    slots: Vec<(String, Slot)>,
    /// Display-sink output for the current cycle, in call order.
    displayed: Vec<Value>,
    listener: Option<ListenerId>,
    ambient_subs: Vec<(Rc<ExternalSource>, u64)>,
    artifact: Option<Artifact>,
    /// An asynchronous task is in flight.
    pending: bool,
}

impl UnitState {
    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn set_error(&mut self, error: &UnitError) {
        let message = error.to_string();
        self.value.error(message.clone());
        for (_, slot) in &mut self.slots {
            slot.error(message.clone());
        }
        self.pending = false;
    }
}

/// One mounted occurrence of a compiled document. Owns exactly one store,
/// discarded with the page; separate mounts share nothing.
pub struct Page {
    store: Store,
    builtins: Builtins,
    free_env: FxHashMap<String, Value>,
    template: String,
    units: Vec<UnitState>,
    inbox: Inbox,
    pool: LocalPool,
    spawner: LocalSpawner,
}

impl Page {
    /// Run change cycles until the page is stable: no dirty unit, no
    /// undelivered task output. Tasks still awaiting external input stay
    /// parked on the pool.
    pub fn flush(&mut self) {
        loop {
            self.pool.run_until_stalled();
            self.drain_inbox();

            if !self.units.iter().any(|u| u.dirty.get()) {
                break;
            }

            // Render pass: pure compute; the only side effect is the
            // silent same-pass store write.
            let mut changed: Vec<String> = Vec::new();
            let mut starts: Vec<usize> = Vec::new();
            for i in 0..self.units.len() {
                if self.units[i].dirty.get() {
                    self.render_unit(i, &mut changed, &mut starts);
                }
            }

            // Commit phase: artifacts already hold their mount handles;
            // output is pulled through `rendered`.

            // Effect phase: producers have all written, so consumers may
            // now hear about it; then tasks start.
            self.notify_changed(changed);
            for i in starts {
                self.start_async(i);
            }
        }
    }

    fn render_unit(&mut self, i: usize, changed: &mut Vec<String>, starts: &mut Vec<usize>) {
        let Self {
            store,
            builtins,
            free_env,
            inbox,
            units,
            ..
        } = self;
        let unit = &mut units[i];
        unit.dirty.set(false);

        let Some(body) = unit.def.body() else {
            return;
        };

        // Memoize over the identity tuple of every read and ambient input.
        let mut inputs: Vec<Value> =
            Vec::with_capacity(unit.def.read_names().len() + unit.def.ambient_names().len());
        for name in unit.def.read_names() {
            inputs.push(store.read(name).unwrap_or_default());
        }
        for name in unit.def.ambient_names() {
            inputs.push(builtins.get(name));
        }
        if let Some(prev) = &unit.memo
            && prev.len() == inputs.len()
            && prev.iter().zip(&inputs).all(|(a, b)| a.same(b))
        {
            return;
        }
        unit.memo = Some(inputs);

        // A dependency change rebuilds the display list.
        unit.displayed.clear();

        if body.is_async() {
            // Supersede any in-flight task; the new one starts in the
            // effect phase.
            unit.generation.set(unit.generation.get() + 1);
            unit.value.recomputing();
            for (_, slot) in &mut unit.slots {
                slot.recomputing();
            }
            unit.pending = true;
            starts.push(i);
            return;
        }

        let displayed = RefCell::new(Vec::new());
        let missing: RefCell<Option<UnitError>> = RefCell::new(None);
        let scope = UnitScope {
            store,
            builtins,
            free_env,
            displayed: &displayed,
            missing_free: &missing,
        };

        match &*body {
            UnitBody::SyncExpr(run) => {
                let outcome = guard(run(&scope), &missing);
                match outcome {
                    Ok(value) => {
                        unit.value.set(value.clone());
                        let names: Vec<String> = unit.def.write_names().to_vec();
                        for name in &names {
                            if let Some(slot) = unit.slot_mut(name) {
                                slot.set(value.clone());
                            }
                            publish(store, name, value.clone(), changed);
                        }
                    }
                    Err(e) => unit.set_error(&e),
                }
            }
            UnitBody::SyncBlock { names, run } => {
                let names = names.clone();
                let outcome = guard(run(&scope), &missing);
                match outcome {
                    Ok(value) if names.len() == 1 => {
                        // A single declared name takes the block value
                        // directly and renders it.
                        if let Some(slot) = unit.slot_mut(&names[0]) {
                            slot.set(value.clone());
                        }
                        publish(store, &names[0], value, changed);
                    }
                    Ok(value) => {
                        // The block ran once; per-name bindings come from
                        // the returned record.
                        for name in &names {
                            match value.field(name) {
                                Some(field) => {
                                    if let Some(slot) = unit.slot_mut(name) {
                                        slot.set(field.clone());
                                    }
                                    publish(store, name, field, changed);
                                }
                                None => {
                                    unit.set_error(&UnitError::MissingSlot(name.clone()));
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => unit.set_error(&e),
                }
            }
            UnitBody::Effect(run) | UnitBody::Display(run) => {
                match guard(run(&scope), &missing) {
                    Ok(()) => unit.value = Slot::default(),
                    Err(e) => unit.set_error(&e),
                }
            }
            UnitBody::ViewBinding { name, make } => {
                let name = name.clone();
                if let Some(old) = unit.artifact.take() {
                    old.detach();
                }
                match guard(make(&scope), &missing) {
                    Ok(Value::Artifact(artifact)) => {
                        let events = inbox.clone();
                        let index = i;
                        artifact.bind_change(move |value| {
                            events
                                .borrow_mut()
                                .push(Event::ArtifactChanged { unit: index, value });
                        });
                        // Initial value is captured immediately after
                        // construction.
                        let initial = artifact.current();
                        if let Some(slot) = unit.slot_mut(&name) {
                            slot.set(initial.clone());
                        }
                        publish(store, &name, initial, changed);
                        unit.artifact = Some(artifact);
                    }
                    Ok(_) => unit.set_error(&UnitError::NotAnArtifact),
                    Err(e) => unit.set_error(&e),
                }
            }
            UnitBody::AsyncExpr(_) | UnitBody::AsyncBlock { .. } => {
                unreachable!("async bodies start in the effect phase")
            }
        }

        drop(scope);
        unit.displayed.extend(displayed.into_inner());
    }

    /// Effect-phase start of one unit's asynchronous body.
    fn start_async(&mut self, i: usize) {
        let Self {
            store,
            builtins,
            free_env,
            inbox,
            units,
            spawner,
            ..
        } = self;
        let unit = &mut units[i];
        let Some(body) = unit.def.body() else {
            return;
        };

        let handle = TaskHandle {
            unit: i,
            generation: unit.generation.get(),
            current: unit.generation.clone(),
            inbox: inbox.clone(),
            spawner: spawner.clone(),
        };

        let displayed = RefCell::new(Vec::new());
        let missing: RefCell<Option<UnitError>> = RefCell::new(None);
        let scope = UnitScope {
            store,
            builtins,
            free_env,
            displayed: &displayed,
            missing_free: &missing,
        };

        if let UnitBody::AsyncExpr(spawn) | UnitBody::AsyncBlock { spawn, .. } = &*body {
            spawn(&scope, handle);
        }

        drop(scope);
        unit.displayed.extend(displayed.into_inner());
        if let Some(error) = missing.into_inner() {
            // Cancel whatever the closure managed to start.
            unit.generation.set(unit.generation.get() + 1);
            unit.set_error(&error);
        }
    }

    /// Apply task and artifact write-backs, then notify. This is an
    /// effect-phase turn of its own.
    fn drain_inbox(&mut self) {
        let events: Vec<Event> = self.inbox.borrow_mut().drain(..).collect();
        if events.is_empty() {
            return;
        }
        let mut changed = Vec::new();
        for event in events {
            self.apply_event(event, &mut changed);
        }
        self.notify_changed(changed);
    }

    fn apply_event(&mut self, event: Event, changed: &mut Vec<String>) {
        let Self { store, units, .. } = self;
        match event {
            Event::TaskValue {
                unit: i,
                generation,
                result,
            } => {
                let unit = &mut units[i];
                if generation != unit.generation.get() {
                    tracing::debug!(unit = %unit.def.id(), "superseded task result dropped");
                    return;
                }
                unit.pending = false;
                match result {
                    Ok(value) => {
                        if matches!(unit.def.body().as_deref(), Some(UnitBody::AsyncBlock { .. })) {
                            // Block completion: settle slots the task
                            // never assigned.
                            for (_, slot) in &mut unit.slots {
                                if slot.phase == SlotPhase::Recomputing {
                                    slot.settle();
                                }
                            }
                        } else {
                            unit.value.set(value.clone());
                            let names: Vec<String> = unit.def.write_names().to_vec();
                            for name in &names {
                                if let Some(slot) = unit.slot_mut(name) {
                                    slot.set(value.clone());
                                }
                                publish(store, name, value.clone(), changed);
                            }
                        }
                    }
                    Err(e) => unit.set_error(&e),
                }
            }
            Event::TaskAssign {
                unit: i,
                generation,
                name,
                value,
            } => {
                let unit = &mut units[i];
                if generation != unit.generation.get() {
                    tracing::debug!(unit = %unit.def.id(), "superseded slot assignment dropped");
                    return;
                }
                if let Some(slot) = unit.slot_mut(&name) {
                    slot.set(value.clone());
                }
                publish(store, &name, value, changed);
            }
            Event::TaskDisplay {
                unit: i,
                generation,
                value,
            } => {
                let unit = &mut units[i];
                if generation != unit.generation.get() {
                    return;
                }
                unit.displayed.push(value);
            }
            Event::ArtifactChanged { unit: i, value } => {
                let unit = &mut units[i];
                let body = unit.def.body();
                let Some(UnitBody::ViewBinding { name, .. }) = body.as_deref() else {
                    return;
                };
                let name = name.clone();
                if let Some(slot) = unit.slot_mut(&name) {
                    slot.set(value.clone());
                }
                publish(store, &name, value, changed);
            }
        }
    }

    fn notify_changed(&mut self, changed: Vec<String>) {
        for name in changed {
            let value = self.store.read(&name).unwrap_or_default();
            self.store.notify(&name, &value);
        }
    }

    /// A unit's contribution to the page: display-sink items in call
    /// order, then its own value under the value-rendering rule. Errors
    /// dominate and render as an isolated failure.
    pub fn rendered(&self, unit_id: &str) -> Rendered {
        let Some(unit) = self.units.iter().find(|u| u.def.id() == unit_id) else {
            return Rendered::Nothing;
        };

        if let SlotPhase::Error(message) = &unit.value.phase {
            return Rendered::Failure(message.clone());
        }
        for (_, slot) in &unit.slots {
            if let SlotPhase::Error(message) = &slot.phase {
                return Rendered::Failure(message.clone());
            }
        }

        let mut items: Vec<Rendered> = unit.displayed.iter().map(render_value).collect();

        let own = match unit.def.body().as_deref() {
            Some(UnitBody::ViewBinding { .. }) => unit
                .artifact
                .clone()
                .map(Rendered::Artifact)
                .unwrap_or(Rendered::Nothing),
            Some(UnitBody::SyncExpr(_) | UnitBody::AsyncExpr(_)) => unit.value.rendered(),
            Some(UnitBody::SyncBlock { names, .. } | UnitBody::AsyncBlock { names, .. })
                if names.len() == 1 =>
            {
                unit.slot(&names[0])
                    .map(Slot::rendered)
                    .unwrap_or(Rendered::Nothing)
            }
            _ => Rendered::Nothing,
        };

        if items.is_empty() {
            return own;
        }
        if !own.is_nothing() {
            items.push(own);
        }
        Rendered::Items(items)
    }

    /// Current phase of one published name's slot.
    pub fn slot_phase(&self, unit_id: &str, name: &str) -> Option<SlotPhase> {
        self.units
            .iter()
            .find(|u| u.def.id() == unit_id)
            .and_then(|u| u.slot(name))
            .map(|s| s.phase.clone())
    }

    /// Whether a unit has an asynchronous task in flight.
    pub fn is_pending(&self, unit_id: &str) -> bool {
        self.units
            .iter()
            .find(|u| u.def.id() == unit_id)
            .is_some_and(|u| u.pending)
    }

    /// The page's store. Exactly one per mount.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The ambient sources this mount subscribes to.
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// The assembled body template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Unit ids in push order.
    pub fn unit_ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.def.id()).collect()
    }

    /// Tear the page down: cancel in-flight tasks, detach listeners and
    /// artifacts, discard the store. A cancelled task can never write.
    pub fn unmount(mut self) {
        for unit in &mut self.units {
            unit.generation.set(unit.generation.get() + 1);
            if let Some(id) = unit.listener.take() {
                self.store.unsubscribe(id);
            }
            for (source, id) in unit.ambient_subs.drain(..) {
                source.unsubscribe(id);
            }
            if let Some(artifact) = unit.artifact.take() {
                artifact.detach();
            }
        }
        tracing::debug!("page unmounted, store discarded");
    }
}

/// Replace a body result with the unresolved-reference error the scope
/// recorded, if any.
fn guard<T>(result: UnitResult<T>, missing: &RefCell<Option<UnitError>>) -> UnitResult<T> {
    match missing.borrow_mut().take() {
        Some(error) => Err(error),
        None => result,
    }
}

fn publish(store: &Store, name: &str, value: Value, changed: &mut Vec<String>) {
    if store.write(name, value) && !changed.iter().any(|n| n == name) {
        changed.push(name.to_string());
    }
}

//! Cell unit definitions.
//!
//! A [`UnitDef`] is what generated code builds: the uniform wrapper
//! (store subscriptions, ambient subscriptions, published names) plus one
//! body keyed by the cell's kind. The page scheduler owns execution;
//! nothing here runs user code by itself.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{UnitError, UnitResult};
use crate::page::TaskHandle;
use crate::source::Builtins;
use crate::store::Store;
use crate::value::{Artifact, Value};

pub type SyncBody = Box<dyn Fn(&UnitScope<'_>) -> UnitResult<Value>>;
pub type EffectBody = Box<dyn Fn(&UnitScope<'_>) -> UnitResult<()>>;
pub type AsyncBody = Box<dyn Fn(&UnitScope<'_>, TaskHandle)>;

/// The synthesis rule a unit executes under.
pub enum UnitBody {
    /// Memoized expression; renders its value.
    SyncExpr(SyncBody),
    /// Cancellable task per dependency change; renders nothing until the
    /// first resolution.
    AsyncExpr(AsyncBody),
    /// One memoized block. A single declared name publishes the returned
    /// value; several publish fields destructured from a returned record.
    SyncBlock { names: Vec<String>, run: SyncBody },
    /// Post-render effect; renders nothing itself.
    Effect(EffectBody),
    /// Cancellable task assigning declared names to slots as it runs.
    AsyncBlock { names: Vec<String>, spawn: AsyncBody },
    /// Whole body is one display-sink call.
    Display(EffectBody),
    /// Publishes an interactive input artifact's value.
    ViewBinding { name: String, make: SyncBody },
}

impl UnitBody {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, UnitBody::AsyncExpr(_) | UnitBody::AsyncBlock { .. })
    }
}

/// One generated rendering unit, bound to a cell.
pub struct UnitDef {
    id: String,
    reads: Vec<String>,
    ambient: Vec<String>,
    writes: Vec<String>,
    // Shared so the scheduler can run the body while mutating unit state.
    body: Option<Rc<UnitBody>>,
}

impl UnitDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reads: Vec::new(),
            ambient: Vec::new(),
            writes: Vec::new(),
            body: None,
        }
    }

    /// Sibling-cell names this unit subscribes to on the store.
    pub fn reads(mut self, names: &[&str]) -> Self {
        self.reads = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Ambient sources this unit subscribes to.
    pub fn ambient(mut self, names: &[&str]) -> Self {
        self.ambient = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Names this unit publishes, written strictly after its computation.
    pub fn writes(mut self, names: &[&str]) -> Self {
        self.writes = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn sync_expr(mut self, body: impl Fn(&UnitScope<'_>) -> UnitResult<Value> + 'static) -> Self {
        self.body = Some(Rc::new(UnitBody::SyncExpr(Box::new(body))));
        self
    }

    pub fn async_expr(mut self, body: impl Fn(&UnitScope<'_>, TaskHandle) + 'static) -> Self {
        self.body = Some(Rc::new(UnitBody::AsyncExpr(Box::new(body))));
        self
    }

    pub fn sync_block(
        mut self,
        names: &[&str],
        run: impl Fn(&UnitScope<'_>) -> UnitResult<Value> + 'static,
    ) -> Self {
        self.body = Some(Rc::new(UnitBody::SyncBlock {
            names: names.iter().map(|s| s.to_string()).collect(),
            run: Box::new(run),
        }));
        self
    }

    pub fn effect(mut self, body: impl Fn(&UnitScope<'_>) -> UnitResult<()> + 'static) -> Self {
        self.body = Some(Rc::new(UnitBody::Effect(Box::new(body))));
        self
    }

    pub fn async_block(
        mut self,
        names: &[&str],
        spawn: impl Fn(&UnitScope<'_>, TaskHandle) + 'static,
    ) -> Self {
        self.body = Some(Rc::new(UnitBody::AsyncBlock {
            names: names.iter().map(|s| s.to_string()).collect(),
            spawn: Box::new(spawn),
        }));
        self
    }

    pub fn display(mut self, body: impl Fn(&UnitScope<'_>) -> UnitResult<()> + 'static) -> Self {
        self.body = Some(Rc::new(UnitBody::Display(Box::new(body))));
        self
    }

    pub fn view_binding(
        mut self,
        name: &str,
        make: impl Fn(&UnitScope<'_>) -> UnitResult<Value> + 'static,
    ) -> Self {
        self.body = Some(Rc::new(UnitBody::ViewBinding {
            name: name.to_string(),
            make: Box::new(make),
        }));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn read_names(&self) -> &[String] {
        &self.reads
    }

    pub fn ambient_names(&self) -> &[String] {
        &self.ambient
    }

    pub fn write_names(&self) -> &[String] {
        &self.writes
    }

    pub(crate) fn body(&self) -> Option<Rc<UnitBody>> {
        self.body.clone()
    }
}

/// What a unit body sees while it runs.
pub struct UnitScope<'a> {
    pub(crate) store: &'a Store,
    pub(crate) builtins: &'a Builtins,
    pub(crate) free_env: &'a FxHashMap<String, Value>,
    pub(crate) displayed: &'a RefCell<Vec<Value>>,
    pub(crate) missing_free: &'a RefCell<Option<UnitError>>,
}

impl UnitScope<'_> {
    /// A sibling cell's published value; `Null` while still unset.
    pub fn input(&self, name: &str) -> Value {
        self.store.read(name).unwrap_or_default()
    }

    /// Current snapshot of an ambient source.
    pub fn ambient(&self, name: &str) -> Value {
        self.builtins.get(name)
    }

    /// A free reference resolved from the host environment. An absent
    /// name is this unit's runtime error, not a compile error.
    pub fn free(&self, name: &str) -> Value {
        match self.free_env.get(name) {
            Some(value) => value.clone(),
            None => {
                tracing::warn!(%name, "unresolved free reference");
                self.missing_free
                    .borrow_mut()
                    .get_or_insert(UnitError::Unresolved(name.to_string()));
                Value::Null
            }
        }
    }

    /// The display sink: appends to this unit's output list in call order.
    pub fn display(&self, value: Value) {
        self.displayed.borrow_mut().push(value);
    }
}

/// What a unit contributes to the page after a change cycle.
#[derive(Debug, Clone)]
pub enum Rendered {
    /// Nothing at all (unset value, effect unit, pending async).
    Nothing,
    /// Text form of a computed value.
    Text(String),
    /// An artifact attached imperatively.
    Artifact(Artifact),
    /// Display-sink output, in call order, possibly ending with the
    /// unit's own value.
    Items(Vec<Rendered>),
    /// The unit's isolated, visible failure.
    Failure(String),
}

impl Rendered {
    /// Text content if this is a plain text rendering.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Rendered::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Rendered::Nothing)
    }
}

/// The value-rendering rule: artifacts attach imperatively, null renders
/// nothing, everything else renders its text form.
pub(crate) fn render_value(value: &Value) -> Rendered {
    match value {
        Value::Null => Rendered::Nothing,
        Value::Artifact(a) => Rendered::Artifact(a.clone()),
        other => Rendered::Text(other.to_string()),
    }
}

//! Dynamic values exchanged through the store.
//!
//! Composite variants are reference-counted so change detection stays
//! identity-based: the store never deep-compares, and cloning a [`Value`]
//! is cheap.

use std::cell::RefCell;
use std::rc::Rc;

/// A value published by one cell unit and consumed by others.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Renders nothing.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    List(Rc<Vec<Value>>),
    Record(Rc<Vec<(String, Value)>>),
    /// An externally constructed artifact, attached imperatively.
    Artifact(Artifact),
}

impl Value {
    /// Identity comparison: primitives by value, composites by pointer.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            (Value::Artifact(a), Value::Artifact(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The text form shown by the value-rendering rule, or `None` for
    /// values that render nothing or attach imperatively.
    pub fn render_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Artifact(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Look up a field of a record value.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Artifact(a) => write!(f, "[{}]", a.kind()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(Rc::from(v.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(Rc::new(v))
    }
}

impl From<Artifact> for Value {
    fn from(v: Artifact) -> Self {
        Value::Artifact(v)
    }
}

/// Build a record value from field pairs. Generated multi-declaration
/// blocks return their declared names through this.
pub fn record(fields: &[(&str, Value)]) -> Value {
    Value::Record(Rc::new(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    ))
}

/// An externally constructed interactive or visual artifact.
///
/// Attached into the render target imperatively, never serialized. For
/// view bindings the runtime captures the initial value right after
/// construction and listens for changes until unmount.
#[derive(Clone)]
pub struct Artifact {
    inner: Rc<ArtifactInner>,
}

struct ArtifactInner {
    kind: String,
    value: RefCell<Value>,
    on_change: RefCell<Option<Rc<dyn Fn(Value)>>>,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, initial: Value) -> Self {
        Self {
            inner: Rc::new(ArtifactInner {
                kind: kind.into(),
                value: RefCell::new(initial),
                on_change: RefCell::new(None),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// The artifact's current value.
    pub fn current(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Update the artifact's value, firing the change listener. This is
    /// the host-interaction entry point (a slider moved, text typed).
    pub fn set_value(&self, value: Value) {
        *self.inner.value.borrow_mut() = value.clone();
        let listener = self.inner.on_change.borrow().clone();
        if let Some(listener) = listener {
            listener(value);
        }
    }

    /// Install the single change listener. Replaces any previous one.
    pub(crate) fn bind_change(&self, listener: impl Fn(Value) + 'static) {
        *self.inner.on_change.borrow_mut() = Some(Rc::new(listener));
    }

    /// Detach the change listener. Called on unmount.
    pub(crate) fn detach(&self) {
        self.inner.on_change.borrow_mut().take();
    }

    pub fn ptr_eq(&self, other: &Artifact) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("kind", &self.inner.kind)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_for_primitives() {
        assert!(Value::from(1i64).same(&Value::from(1i64)));
        assert!(!Value::from(1i64).same(&Value::from(2i64)));
        assert!(!Value::from(1i64).same(&Value::from(true)));
    }

    #[test]
    fn test_identity_for_composites() {
        let a = Value::from("hello");
        let b = a.clone();
        let c = Value::from("hello");
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn test_render_text() {
        assert_eq!(Value::Null.render_text(), None);
        assert_eq!(Value::from(20i64).render_text().as_deref(), Some("20"));
        assert_eq!(
            Artifact::new("slider", Value::Null)
                .current()
                .render_text(),
            None
        );
        assert_eq!(
            Value::Artifact(Artifact::new("slider", Value::Null)).render_text(),
            None
        );
    }

    #[test]
    fn test_record_fields() {
        let r = record(&[("a", Value::from(1i64)), ("b", Value::from(2i64))]);
        assert_eq!(r.field("b").unwrap().to_string(), "2");
        assert!(r.field("c").is_none());
    }

    #[test]
    fn test_artifact_change_listener() {
        let artifact = Artifact::new("slider", Value::from(0i64));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        artifact.bind_change(move |v| sink.borrow_mut().push(v.to_string()));

        artifact.set_value(Value::from(42i64));
        assert_eq!(seen.borrow().as_slice(), ["42"]);
        assert_eq!(artifact.current().to_string(), "42");

        artifact.detach();
        artifact.set_value(Value::from(7i64));
        assert_eq!(seen.borrow().len(), 1);
    }
}

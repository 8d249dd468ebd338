//! Error types for weft-runtime.

use thiserror::Error;

/// Result type for unit computations.
pub type UnitResult<T> = std::result::Result<T, UnitError>;

/// A failure local to one unit's computation.
///
/// Caught per unit and surfaced as that unit's error state; it never
/// unmounts or disturbs sibling units, and store operations never raise it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// The unit's own computation failed.
    #[error("{0}")]
    Failed(String),

    /// A free reference was not provided by the host environment.
    #[error("unresolved reference: {0}")]
    Unresolved(String),

    /// A view binding's wrapped expression did not produce an input
    /// artifact.
    #[error("view binding did not produce an input artifact")]
    NotAnArtifact,

    /// A program block produced no value for one of its declared names.
    #[error("block produced no value for '{0}'")]
    MissingSlot(String),
}

impl UnitError {
    /// Shorthand for a plain computation failure.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

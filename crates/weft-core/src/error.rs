//! Error types for weft-core.

use thiserror::Error;

use crate::document::CellId;

/// Result type for weft-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling a document.
#[derive(Debug, Error)]
pub enum Error {
    /// Upstream parser payload could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Two cells declare the same name.
    #[error("duplicate declared name '{name}' ({first} and {second})")]
    DuplicateName {
        name: String,
        first: CellId,
        second: CellId,
    },

    /// Cyclic dependency detected between cells.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// Cell referenced by the body template does not exist.
    #[error("cell not found: {0}")]
    CellNotFound(String),

    /// The body template is malformed.
    #[error("template error: {0}")]
    Template(String),
}

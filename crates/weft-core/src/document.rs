//! Document model shared by the compiler stages.
//!
//! A [`Document`] is what the upstream parser hands us: an ordered list of
//! [`Cell`]s with pre-extracted name facts, plus a static body template
//! containing one placeholder token per cell.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique identifier for a cell within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Where a cell sits in the body template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// A block of its own in the document flow.
    Block,
    /// An expression embedded in surrounding static markup.
    Inline,
}

/// One independently authored unit of source sharing the document namespace.
///
/// Immutable once produced by the upstream parser. All name facts are
/// pre-extracted there; this core never re-parses `source_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Unique identifier, also the placeholder key in the body template.
    pub id: CellId,
    /// Raw source text, spliced verbatim into the generated unit.
    pub source_text: String,
    /// Whether the cell body is a bare expression.
    pub is_expression: bool,
    /// Whether the cell body awaits.
    pub is_async: bool,
    /// Block or inline placement in the body template.
    pub placement: Placement,
    /// Names this cell publishes into the document namespace.
    pub declared_names: Vec<String>,
    /// Names this cell consumes.
    pub referenced_names: Vec<String>,
    /// Import specifiers, for import-only cells.
    pub import_specifiers: Vec<String>,
}

/// A parsed document: ordered cells plus the static body template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Static body template containing one placeholder per cell.
    pub body: String,
    /// Cells in document order.
    pub cells: Vec<Cell>,
}

impl Document {
    /// Decode a document from the upstream parser's JSON protocol.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Get a cell by ID.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }
}

/// Ambient reactive values supplied by the host runtime.
///
/// `display` and `view` are capabilities rather than values, but occupy the
/// same namespace tier: a cell-declared name shadows any of these.
pub const BUILTIN_NAMES: &[&str] = &["width", "dark", "now", "display", "view"];

/// Name of the display sink builtin.
pub const DISPLAY_BUILTIN: &str = "display";

/// Name of the view-binding builtin.
pub const VIEW_BUILTIN: &str = "view";

/// The placeholder token the upstream parser leaves in the body template.
pub fn placeholder(id: CellId) -> String {
    format!("<!--weft:{}-->", id)
}

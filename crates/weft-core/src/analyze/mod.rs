//! Cell classification and reference partitioning.
//!
//! Works entirely over the facts the upstream parser pre-extracted
//! (`declared_names`, `referenced_names`, `is_expression`, `is_async`,
//! `import_specifiers`). Raw source text is only consulted where those facts
//! cannot expose call shape: the view-binding and display-call matchers.
//! Classification never fails; an unrecognized shape falls back to the most
//! general kind.

mod graph;

pub use graph::DependencyGraph;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::document::{BUILTIN_NAMES, Cell, CellId, DISPLAY_BUILTIN, Document, VIEW_BUILTIN};
use crate::error::{Error, Result};

/// What synthesis rule a cell compiles under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Only import statements; no unit is generated.
    ImportOnly,
    /// `let name = view(inner)`: publishes an interactive input's value.
    ViewBinding,
    /// Expression cell whose whole body is one display-sink call.
    Display,
    /// Any other expression cell.
    Expression,
    /// Everything else.
    Program,
}

/// Classification result for one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedCell {
    pub id: CellId,
    pub kind: CellKind,
    /// Names this cell publishes.
    pub declared_names: Vec<String>,
    /// References produced by sibling cells (store subscriptions).
    pub cell_refs: Vec<String>,
    /// References to host-supplied ambient values.
    pub builtin_refs: Vec<String>,
    /// Everything else, passed through verbatim to the generated code.
    pub free_refs: Vec<String>,
    /// Inner expression of a view binding (the argument of `view(..)`).
    pub view_expr: Option<String>,
}

/// The set of names a reference may resolve against: every name declared by
/// a non-import-only cell.
pub fn namespace_universe(cells: &[Cell]) -> FxHashSet<String> {
    cells
        .iter()
        .filter(|c| !is_import_only(c))
        .flat_map(|c| c.declared_names.iter().cloned())
        .collect()
}

/// Classify one cell against the document namespace.
///
/// Reference partition precedence: a locally declared name shadows
/// everything; a sibling-cell declaration shadows a builtin; the rest is
/// free.
pub fn classify(cell: &Cell, universe: &FxHashSet<String>) -> ClassifiedCell {
    let mut view_expr = None;

    let kind = if is_import_only(cell) {
        CellKind::ImportOnly
    } else if let Some(inner) = view_binding_expr(cell) {
        view_expr = Some(inner);
        CellKind::ViewBinding
    } else if is_display_call(cell) {
        CellKind::Display
    } else if cell.is_expression {
        CellKind::Expression
    } else {
        tracing::debug!(cell = %cell.id, "no specific shape matched, compiling as program");
        CellKind::Program
    };

    let local: FxHashSet<&str> = cell.declared_names.iter().map(String::as_str).collect();

    let mut cell_refs = Vec::new();
    let mut builtin_refs = Vec::new();
    let mut free_refs = Vec::new();

    for name in &cell.referenced_names {
        if local.contains(name.as_str()) {
            continue;
        }
        if universe.contains(name) {
            cell_refs.push(name.clone());
        } else if BUILTIN_NAMES.contains(&name.as_str()) {
            builtin_refs.push(name.clone());
        } else {
            free_refs.push(name.clone());
        }
    }

    ClassifiedCell {
        id: cell.id,
        kind,
        declared_names: cell.declared_names.clone(),
        cell_refs,
        builtin_refs,
        free_refs,
        view_expr,
    }
}

/// Classification of every cell plus the document dependency graph.
#[derive(Debug)]
pub struct Analysis {
    /// Classified cells in document order.
    pub cells: Vec<ClassifiedCell>,
    /// Producer-to-consumer edges over `cell_refs`.
    pub graph: DependencyGraph,
}

impl Analysis {
    /// Get a classified cell by ID.
    pub fn cell(&self, id: CellId) -> Option<&ClassifiedCell> {
        self.cells.iter().find(|c| c.id == id)
    }
}

/// Analyze a whole document: validate names, classify every cell, build the
/// dependency graph and reject cycles.
pub fn analyze(document: &Document) -> Result<Analysis> {
    validate_unique_names(&document.cells)?;

    let universe = namespace_universe(&document.cells);
    let cells: Vec<ClassifiedCell> = document
        .cells
        .iter()
        .map(|c| classify(c, &universe))
        .collect();

    let graph = DependencyGraph::build(&document.cells, &cells)?;

    Ok(Analysis { cells, graph })
}

/// Reject documents where two cells declare the same name.
fn validate_unique_names(cells: &[Cell]) -> Result<()> {
    let mut seen: rustc_hash::FxHashMap<&str, CellId> = rustc_hash::FxHashMap::default();
    for cell in cells {
        if is_import_only(cell) {
            continue;
        }
        for name in &cell.declared_names {
            if let Some(&first) = seen.get(name.as_str()) {
                return Err(Error::DuplicateName {
                    name: name.clone(),
                    first,
                    second: cell.id,
                });
            }
            seen.insert(name, cell.id);
        }
    }
    Ok(())
}

fn is_import_only(cell: &Cell) -> bool {
    !cell.import_specifiers.is_empty()
        && cell.declared_names.is_empty()
        && cell.referenced_names.is_empty()
        && !cell.is_expression
}

/// Match `let NAME = view(inner);` and return the inner expression.
///
/// The upstream facts expose declarations and references but not call
/// shape, so this is the one place the classifier looks at source text.
fn view_binding_expr(cell: &Cell) -> Option<String> {
    if cell.is_async || cell.declared_names.len() != 1 {
        return None;
    }
    if !cell.referenced_names.iter().any(|n| n == VIEW_BUILTIN) {
        return None;
    }

    let src = cell.source_text.trim();
    let src = src.strip_suffix(';').unwrap_or(src).trim();
    let rest = src.strip_prefix("let ").unwrap_or(src);
    let (name, rhs) = rest.split_once('=')?;
    if name.trim() != cell.declared_names[0] {
        return None;
    }

    single_call_argument(rhs.trim(), VIEW_BUILTIN)
}

/// Match an expression cell whose entire body is one `display(..)` call
/// with a single argument.
fn is_display_call(cell: &Cell) -> bool {
    if !cell.is_expression || !cell.declared_names.is_empty() {
        return false;
    }
    if !cell.referenced_names.iter().any(|n| n == DISPLAY_BUILTIN) {
        return false;
    }

    let src = cell.source_text.trim();
    let src = src.strip_suffix(';').unwrap_or(src).trim();
    match single_call_argument(src, DISPLAY_BUILTIN) {
        Some(arg) => top_level_comma_count(&arg) == 0,
        None => false,
    }
}

/// If `expr` is exactly `callee(args)` with balanced parentheses, return
/// the argument text.
fn single_call_argument(expr: &str, callee: &str) -> Option<String> {
    let inner = expr
        .strip_prefix(callee)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;

    // Reject `view(a) + view(b)`: the stripped text must stay balanced.
    let mut depth = 0i32;
    for ch in inner.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }

    Some(inner.trim().to_string())
}

fn top_level_comma_count(args: &str) -> usize {
    let mut depth = 0i32;
    let mut commas = 0;
    for ch in args.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    commas
}

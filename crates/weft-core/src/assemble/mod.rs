//! Page assembly: placeholder substitution over the static body template.
//!
//! Walks the template once, in document order. Ordinary cells become
//! `<weft-cell>` mount points wrapped in the failure-isolation and
//! pending-state boundaries (both external contracts, applied here as
//! uniform markers); import-only cells vanish; static inline expressions
//! are spliced literally; reactive inline expressions become minimal
//! subscription units. Markup normalization runs once, after substitution.

mod markup;

pub use markup::normalize_markup;

use crate::analyze::{Analysis, CellKind, ClassifiedCell};
use crate::document::{Cell, Document, Placement};
use crate::error::{Error, Result};

const PLACEHOLDER_OPEN: &str = "<!--weft:";
const PLACEHOLDER_CLOSE: &str = "-->";

/// Substitute every placeholder, then normalize the result.
pub fn assemble_body(document: &Document, analysis: &Analysis) -> Result<String> {
    let mut out = String::with_capacity(document.body.len());
    let mut rest = document.body.as_str();

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];
        let Some(end) = after_open.find(PLACEHOLDER_CLOSE) else {
            return Err(Error::Template(format!(
                "unterminated placeholder at byte {}",
                start
            )));
        };
        let key = after_open[..end].trim();

        let cell = document
            .cells
            .iter()
            .find(|c| c.id.to_string() == key)
            .ok_or_else(|| Error::CellNotFound(key.to_string()))?;
        let classified = analysis
            .cell(cell.id)
            .ok_or_else(|| Error::CellNotFound(key.to_string()))?;

        out.push_str(&substitute(cell, classified));
        rest = &after_open[end + PLACEHOLDER_CLOSE.len()..];
    }
    out.push_str(rest);

    Ok(normalize_markup(&out))
}

/// An inline expression with no reactive inputs is spliced literally; it
/// never re-renders, so no unit is generated for it.
pub(crate) fn is_static_inline(cell: &Cell, classified: &ClassifiedCell) -> bool {
    cell.placement == Placement::Inline
        && classified.cell_refs.is_empty()
        && classified.builtin_refs.is_empty()
}

fn substitute(cell: &Cell, classified: &ClassifiedCell) -> String {
    match classified.kind {
        CellKind::ImportOnly => String::new(),
        _ if is_static_inline(cell, classified) => {
            let src = cell.source_text.trim();
            src.strip_suffix(';').unwrap_or(src).trim().to_string()
        }
        _ if cell.placement == Placement::Inline => {
            format!("<weft-cell id=\"{}\"></weft-cell>", cell.id)
        }
        _ => format!(
            "<weft-boundary><weft-pending><weft-cell id=\"{}\"></weft-cell></weft-pending></weft-boundary>",
            cell.id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;
    use crate::document::CellId;

    fn make_cell(id: usize, source: &str, declares: &[&str], references: &[&str]) -> Cell {
        Cell {
            id: CellId::new(id),
            source_text: source.to_string(),
            is_expression: false,
            is_async: false,
            placement: Placement::Block,
            declared_names: declares.iter().map(|s| s.to_string()).collect(),
            referenced_names: references.iter().map(|s| s.to_string()).collect(),
            import_specifiers: Vec::new(),
        }
    }

    fn assemble(document: &Document) -> String {
        let analysis = analyze::analyze(document).unwrap();
        assemble_body(document, &analysis).unwrap()
    }

    #[test]
    fn test_block_cell_is_wrapped_in_boundaries() {
        let doc = Document {
            body: "<main><!--weft:cell_0--></main>".to_string(),
            cells: vec![make_cell(0, "let x = 1;", &["x"], &[])],
        };

        let body = assemble(&doc);
        assert_eq!(
            body,
            "<main><weft-boundary><weft-pending><weft-cell id=\"cell_0\"></weft-cell></weft-pending></weft-boundary></main>"
        );
    }

    #[test]
    fn test_import_only_placeholder_removed() {
        let mut cell = make_cell(0, "use charts::bar;", &[], &[]);
        cell.import_specifiers = vec!["charts::bar".to_string()];

        let doc = Document {
            body: "<p>before</p><!--weft:cell_0--><p>after</p>".to_string(),
            cells: vec![cell],
        };

        assert_eq!(assemble(&doc), "<p>before</p><p>after</p>");
    }

    #[test]
    fn test_static_inline_spliced_literally() {
        let mut cell = make_cell(0, "6 * 7", &[], &[]);
        cell.is_expression = true;
        cell.placement = Placement::Inline;

        let doc = Document {
            body: "<p>answer: <!--weft:cell_0--></p>".to_string(),
            cells: vec![cell],
        };

        assert_eq!(assemble(&doc), "<p>answer: 6 * 7</p>");
    }

    #[test]
    fn test_reactive_inline_becomes_subscription_unit() {
        let producer = make_cell(0, "let x = 1;", &["x"], &[]);
        let mut inline = make_cell(1, "x + 1", &[], &["x"]);
        inline.is_expression = true;
        inline.placement = Placement::Inline;

        let doc = Document {
            body: "<!--weft:cell_0--><p><!--weft:cell_1--></p>".to_string(),
            cells: vec![producer, inline],
        };

        let body = assemble(&doc);
        // The inline mount point is bare: the enclosing markup stays
        // static while the unit re-renders.
        assert!(body.contains("<p><weft-cell id=\"cell_1\"></weft-cell></p>"));
    }

    #[test]
    fn test_document_order_preserved() {
        let doc = Document {
            body: "<!--weft:cell_1--><!--weft:cell_0-->".to_string(),
            cells: vec![
                make_cell(0, "let a = 1;", &["a"], &[]),
                make_cell(1, "let b = 2;", &["b"], &[]),
            ],
        };

        let body = assemble(&doc);
        let first = body.find("cell_1").unwrap();
        let second = body.find("cell_0").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let doc = Document {
            body: "<!--weft:cell_9-->".to_string(),
            cells: vec![],
        };
        let analysis = analyze::analyze(&doc).unwrap();
        let err = assemble_body(&doc, &analysis).unwrap_err();
        assert!(matches!(err, Error::CellNotFound(_)));
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        let doc = Document {
            body: "<!--weft:cell_0".to_string(),
            cells: vec![make_cell(0, "1", &[], &[])],
        };
        let analysis = analyze::analyze(&doc).unwrap();
        let err = assemble_body(&doc, &analysis).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn test_author_comments_stripped_after_substitution() {
        let doc = Document {
            body: "<p>kept</p><!-- note to self -->".to_string(),
            cells: vec![],
        };

        assert_eq!(assemble(&doc), "<p>kept</p>");
    }
}

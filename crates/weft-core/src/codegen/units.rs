//! Per-kind unit synthesis.
//!
//! Every non-import-only cell becomes one `UnitDef` builder chain: the
//! uniform wrapper (`reads` for store subscriptions, `ambient` for builtin
//! sources, `writes` for published names) plus a body keyed by the cell's
//! kind. Publishing is the runtime's job and always happens after the body
//! completes; nothing here interleaves it with user code.

use super::GeneratorOptions;
use crate::analyze::{CellKind, ClassifiedCell};
use crate::assemble::is_static_inline;
use crate::document::{Cell, DISPLAY_BUILTIN, VIEW_BUILTIN};

/// Emit the unit function for one cell.
///
/// Import-only cells and fully static inline expressions generate no unit;
/// the assembler hoists the former and splices the latter.
pub(super) fn emit_unit(
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) -> Option<String> {
    if classified.kind == CellKind::ImportOnly || is_static_inline(cell, classified) {
        return None;
    }

    let mut w = Writer::new();
    w.line(&format!("fn unit_{}() -> UnitDef {{", cell.id));
    w.indent();
    w.line(&format!("UnitDef::new(\"{}\")", cell.id));
    w.indent();

    if !classified.cell_refs.is_empty() {
        w.line(&format!(".reads(&[{}])", quoted_list(&classified.cell_refs)));
    }
    if !classified.builtin_refs.is_empty() {
        let values: Vec<String> = classified
            .builtin_refs
            .iter()
            .filter(|n| *n != DISPLAY_BUILTIN && *n != VIEW_BUILTIN)
            .cloned()
            .collect();
        if !values.is_empty() {
            w.line(&format!(".ambient(&[{}])", quoted_list(&values)));
        }
    }
    if !classified.declared_names.is_empty() {
        w.line(&format!(
            ".writes(&[{}])",
            quoted_list(&classified.declared_names)
        ));
    }

    match classified.kind {
        CellKind::ImportOnly => unreachable!("filtered above"),
        CellKind::Expression if cell.is_async => emit_async_expr(&mut w, cell, classified, options),
        CellKind::Expression => emit_sync_expr(&mut w, cell, classified, options),
        CellKind::Display => emit_display(&mut w, cell, classified, options),
        CellKind::ViewBinding => match classified.view_expr.as_deref() {
            Some(inner) => emit_view_binding(&mut w, classified, inner, options),
            // The classifier always extracts the inner expression; stay
            // total anyway.
            None => emit_sync_block(&mut w, cell, classified, options),
        },
        CellKind::Program if cell.is_async => emit_async_block(&mut w, cell, classified, options),
        CellKind::Program => emit_sync_block(&mut w, cell, classified, options),
    }

    w.dedent();
    w.dedent();
    w.line("}");
    Some(w.finish())
}

/// Memoized over the unit's input tuple by the runtime; renders its value.
fn emit_sync_expr(
    w: &mut Writer,
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) {
    w.line(".sync_expr(|scope| {");
    w.indent();
    emit_bindings(w, classified, options);
    w.line(&format!("Ok(Value::from({}))", expression_source(cell)));
    w.dedent();
    w.line("})");
}

/// Starts a cancellable task per dependency change; renders nothing until
/// the first resolution.
fn emit_async_expr(
    w: &mut Writer,
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) {
    w.line(".async_expr(|scope, task| {");
    w.indent();
    emit_bindings(w, classified, options);
    w.line("task.run(async move {");
    w.indent();
    w.line(&format!("Ok(Value::from({}))", expression_source(cell)));
    w.dedent();
    w.line("});");
    w.dedent();
    w.line("})");
}

/// One memoized block; a single declared name returns its value directly,
/// several return one record the runtime destructures, so the body runs
/// once per dependency change rather than once per name.
fn emit_sync_block(
    w: &mut Writer,
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) {
    let names = &classified.declared_names;

    if names.is_empty() {
        // Post-render effect; renders nothing itself.
        w.line(".effect(|scope| {");
        w.indent();
        emit_bindings(w, classified, options);
        w.splice(&cell.source_text);
        w.line("Ok(())");
        w.dedent();
        w.line("})");
        return;
    }

    w.line(&format!(".sync_block(&[{}], |scope| {{", quoted_list(names)));
    w.indent();
    emit_bindings(w, classified, options);
    w.splice(&cell.source_text);
    if names.len() == 1 {
        w.line(&format!("Ok(Value::from({}))", names[0]));
    } else {
        let fields: Vec<String> = names
            .iter()
            .map(|n| format!("(\"{}\", Value::from({}))", n, n))
            .collect();
        w.line(&format!(
            "Ok(weft_runtime::record(&[{}]))",
            fields.join(", ")
        ));
    }
    w.dedent();
    w.line("})");
}

/// Cancellable task assigning each declared name to its slot when the
/// block completes; stale results are suppressed by the task handle.
fn emit_async_block(
    w: &mut Writer,
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) {
    let names = &classified.declared_names;

    w.line(&format!(
        ".async_block(&[{}], |scope, task| {{",
        quoted_list(names)
    ));
    w.indent();
    emit_bindings(w, classified, options);
    if !names.is_empty() {
        w.line("let slots = task.clone();");
    }
    w.line("task.run(async move {");
    w.indent();
    w.splice(&cell.source_text);
    for name in names {
        w.line(&format!("slots.assign(\"{}\", Value::from({}));", name, name));
    }
    w.line("Ok(Value::Null)");
    w.dedent();
    w.line("});");
    w.dedent();
    w.line("})");
}

/// The sink appends in call order; the runtime clears the list on every
/// dependency change.
fn emit_display(
    w: &mut Writer,
    cell: &Cell,
    classified: &ClassifiedCell,
    options: &GeneratorOptions,
) {
    w.line(".display(|scope| {");
    w.indent();
    emit_bindings(w, classified, options);
    w.line(&format!("{};", expression_source(cell)));
    w.line("Ok(())");
    w.dedent();
    w.line("})");
}

/// Builds the input artifact from the wrapped expression; the runtime
/// captures its initial value, listens for changes and detaches the
/// listener on unmount.
fn emit_view_binding(
    w: &mut Writer,
    classified: &ClassifiedCell,
    inner: &str,
    options: &GeneratorOptions,
) {
    let name = &classified.declared_names[0];

    w.line(&format!(".view_binding(\"{}\", |scope| {{", name));
    w.indent();
    emit_bindings(w, classified, options);
    w.line(&format!("Ok(Value::from({}))", inner));
    w.dedent();
    w.line("})");
}

/// One binding line per consumed name, ahead of the spliced source.
fn emit_bindings(w: &mut Writer, classified: &ClassifiedCell, options: &GeneratorOptions) {
    for name in &classified.cell_refs {
        w.line(&format!("let {} = scope.input(\"{}\");", name, name));
    }
    for name in &classified.builtin_refs {
        match name.as_str() {
            DISPLAY_BUILTIN => {
                w.line("let display = |v| scope.display(Value::from(v));");
            }
            VIEW_BUILTIN => {
                // Consumed by the view-binding wrapper itself; no local
                // binding exists for it.
            }
            _ => {
                w.line(&format!("let {} = scope.ambient(\"{}\");", name, name));
            }
        }
    }
    for name in &classified.free_refs {
        match options.file_resolver.resolve(name) {
            Some(path) => {
                w.line(&format!("let {} = Value::from(\"{}\");", name, path));
            }
            None => {
                // Unresolved free names fail at runtime, not here.
                w.line(&format!("let {} = scope.free(\"{}\");", name, name));
            }
        }
    }
}

fn expression_source(cell: &Cell) -> String {
    let src = cell.source_text.trim();
    src.strip_suffix(';').unwrap_or(src).trim().to_string()
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Small indented-text writer for emitted code.
struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        self.depth -= 1;
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Splice user source, re-indented line by line.
    fn splice(&mut self, source: &str) {
        for line in source.trim().lines() {
            self.line(line.trim_end());
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

//! Code generation for classified cells.
//!
//! Emits one output module (as text) per document: a `UnitDef` builder call
//! per non-trivial cell, targeting the `weft-runtime` API, plus the
//! `page()` entry point carrying the assembled body template. Cell source
//! is spliced verbatim; the wrapper around it is what this module owns.

mod units;

use rayon::prelude::*;

use crate::analyze::{Analysis, CellKind};
use crate::assemble;
use crate::document::{CellId, Document};
use crate::error::{Error, Result};

/// Resolves an import specifier to the reference emitted in generated code.
pub trait ImportResolver: Send + Sync {
    fn resolve(&self, specifier: &str) -> String;
}

/// Resolves a logical file name to its served path, if it names a file.
pub trait FileResolver: Send + Sync {
    fn resolve(&self, logical_name: &str) -> Option<String>;
}

/// Emits specifiers unchanged.
pub struct PassthroughImports;

impl ImportResolver for PassthroughImports {
    fn resolve(&self, specifier: &str) -> String {
        specifier.to_string()
    }
}

/// Treats no free name as a file reference.
pub struct NoFiles;

impl FileResolver for NoFiles {
    fn resolve(&self, _logical_name: &str) -> Option<String> {
        None
    }
}

/// Configuration for the generator.
pub struct GeneratorOptions {
    /// Emit the module header comment.
    pub header: bool,
    /// Import-specifier resolver supplied by the host.
    pub import_resolver: Box<dyn ImportResolver>,
    /// File-reference resolver supplied by the host.
    pub file_resolver: Box<dyn FileResolver>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            header: true,
            import_resolver: Box::new(PassthroughImports),
            file_resolver: Box::new(NoFiles),
        }
    }
}

/// The compiled output module.
#[derive(Debug, Clone)]
pub struct GeneratedModule {
    /// Module source text.
    pub code: String,
    /// Cells that became rendering units, in topological (initial-compute)
    /// order.
    pub unit_ids: Vec<CellId>,
}

/// Generates the output module for one document.
pub struct Generator<'a> {
    options: &'a GeneratorOptions,
}

impl<'a> Generator<'a> {
    pub fn new(options: &'a GeneratorOptions) -> Self {
        Self { options }
    }

    /// Generate the output module: hoisted imports, one unit per
    /// non-trivial cell, and the `page()` entry point with the assembled
    /// body template.
    pub fn generate(&self, document: &Document, analysis: &Analysis) -> Result<GeneratedModule> {
        let template = assemble::assemble_body(document, analysis)?;

        // Unit emission is independent per cell; fan out, then reassemble.
        let emitted: Vec<Option<(CellId, String)>> = document
            .cells
            .par_iter()
            .map(|cell| {
                let classified = analysis
                    .cell(cell.id)
                    .ok_or_else(|| Error::CellNotFound(cell.id.to_string()))?;
                Ok(units::emit_unit(cell, classified, self.options)
                    .map(|code| (cell.id, code)))
            })
            .collect::<Result<_>>()?;

        let mut code = String::new();

        if self.options.header {
            code.push_str("//! Generated by weft. Do not edit.\n\n");
        }
        code.push_str("#![allow(unused_variables)]\n");
        code.push_str("#![allow(unused_imports)]\n\n");
        code.push_str("use weft_runtime::{PageDef, UnitDef, Value};\n");

        for specifier in self.hoisted_imports(analysis, document) {
            code.push_str(&format!("use {};\n", specifier));
        }
        code.push('\n');

        // Units are pushed in topological order, producers ahead of their
        // consumers, so the initial pass computes each name before anyone
        // reads it. The unit definitions below stay in document order.
        let generated: rustc_hash::FxHashSet<CellId> =
            emitted.iter().flatten().map(|(id, _)| *id).collect();
        let unit_ids: Vec<CellId> = analysis
            .graph
            .topological_order()?
            .into_iter()
            .filter(|id| generated.contains(id))
            .collect();

        code.push_str("pub fn page() -> PageDef {\n");
        code.push_str("    let mut page = PageDef::new();\n");
        for id in &unit_ids {
            code.push_str(&format!("    page.push(unit_{}());\n", id));
        }
        code.push_str(&format!("    page.template(r##\"{}\"##);\n", template));
        code.push_str("    page\n");
        code.push_str("}\n");

        for (_, unit_code) in emitted.iter().flatten() {
            code.push('\n');
            code.push_str(unit_code);
        }

        Ok(GeneratedModule { code, unit_ids })
    }

    /// Import specifiers from import-only cells, merged across cells
    /// sharing a specifier, resolved through the host resolver.
    fn hoisted_imports(&self, analysis: &Analysis, document: &Document) -> Vec<String> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut resolved = Vec::new();

        for classified in &analysis.cells {
            if classified.kind != CellKind::ImportOnly {
                continue;
            }
            let Some(cell) = document.cell(classified.id) else {
                continue;
            };
            for specifier in &cell.import_specifiers {
                if seen.insert(specifier.clone()) {
                    resolved.push(self.options.import_resolver.resolve(specifier));
                } else {
                    tracing::debug!(%specifier, "merged duplicate import specifier");
                }
            }
        }

        resolved
    }
}

//! weft: notebook documents as reactive pages.
//!
//! An author writes an ordered collection of independent cells sharing one
//! flat namespace; weft recovers the implicit dependency edges, generates
//! one rendering unit per cell and stitches them back into the static body
//! template. At execution time the units exchange values through a keyed
//! per-mount store instead of being wired together by the author.
//!
//! The compile half lives in [`weft_core`], the execution half in
//! [`weft_runtime`]; this crate re-exports both and offers the one-call
//! entry point.

pub use weft_core as compiler;
pub use weft_runtime as runtime;

pub use weft_core::{
    Analysis, Cell, CellId, CellKind, Document, Error, GeneratedModule, GeneratorOptions,
    Placement, Result,
};
pub use weft_runtime::{Page, PageDef, Rendered, Store, UnitDef, Value};

/// Compile a parsed document into its output module.
pub fn compile(document: &Document, options: &GeneratorOptions) -> Result<GeneratedModule> {
    let analysis = weft_core::analyze(document)?;
    weft_core::Generator::new(options).generate(document, &analysis)
}

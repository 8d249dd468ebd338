//! Compiler core for weft reactive documents.
//!
//! This crate provides:
//! - Cell classification and reference partitioning over parser facts
//! - Dependency graph recovery with cycle rejection
//! - Per-kind unit code generation against the runtime API
//! - Page assembly and markup normalization

pub mod analyze;
pub mod assemble;
pub mod codegen;
pub mod document;
pub mod error;

pub use analyze::{Analysis, CellKind, ClassifiedCell, DependencyGraph, analyze, classify};
pub use assemble::{assemble_body, normalize_markup};
pub use codegen::{
    FileResolver, GeneratedModule, Generator, GeneratorOptions, ImportResolver, NoFiles,
    PassthroughImports,
};
pub use document::{
    BUILTIN_NAMES, Cell, CellId, DISPLAY_BUILTIN, Document, Placement, VIEW_BUILTIN, placeholder,
};
pub use error::{Error, Result};

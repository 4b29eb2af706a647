//! Text-level analysis of INTERLIS documents.
//!
//! Nothing in here knows about the compiler; these modules work on raw text
//! and LSP positions only.

pub mod context;
pub mod document;
pub mod position;
pub mod tokens;

pub use context::{
    dotted_path_before, find_imports_context, is_type_reference_context, word_before,
    DottedPath, ImportContext, WordPrefix,
};
pub use document::{DocumentState, DocumentStore};
pub use position::{line_span, line_start_offset, position_at, range_between, to_offset};

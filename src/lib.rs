//! INTERLIS Language Server library.
//!
//! The editing engines (rename, completion, auto-close) work on the live
//! document text and consult the symbol table produced by an external
//! INTERLIS compiler. `server` wires them into tower-lsp.

pub mod analysis;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod server;
pub mod uri;

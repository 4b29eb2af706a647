//! LSP request handlers.
//!
//! Handlers are synchronous and may block on disk reads or the compiler;
//! the server runs them on the blocking pool with a [`FeatureContext`]
//! snapshot.

pub mod auto_close;
pub mod completion;
pub mod diagnostics;
pub mod goto_definition;
pub mod rename;
pub mod symbols;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use crate::analysis::DocumentStore;
use crate::compiler::{CompilationCache, CompilationOutcome, Compiler};
use crate::config::ClientSettings;
use crate::error::{check_cancelled, FeatureError, FeatureResult};
use crate::uri::read_document;

/// Everything a feature needs to look at documents and compile them.
pub struct FeatureContext<'a> {
    pub documents: &'a DocumentStore,
    pub cache: &'a CompilationCache,
    pub compiler: &'a dyn Compiler,
    pub settings: &'a ClientSettings,
    pub cancel: &'a CancellationToken,
}

impl FeatureContext<'_> {
    /// Open buffer contents, else the file on disk.
    ///
    /// Unreadable files yield `Ok(None)`; only cancellation is an error.
    pub fn document_text(&self, uri: &Url) -> FeatureResult<Option<Arc<str>>> {
        check_cancelled(self.cancel)?;
        if let Some(text) = self.documents.get_text(uri) {
            return Ok(Some(text));
        }
        match read_document(uri) {
            Ok(text) => Ok(Some(text.into())),
            Err(FeatureError::Cancelled) => Err(FeatureError::Cancelled),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", uri, e);
                Ok(None)
            }
        }
    }

    /// Compilation outcome for a document, from the cache when possible.
    pub fn compile(&self, uri: &Url) -> FeatureResult<Arc<CompilationOutcome>> {
        self.cache
            .get_or_compile(uri.as_str(), self.compiler, self.settings, self.cancel)
    }
}

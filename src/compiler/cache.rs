//! Compilation cache.
//!
//! Outcomes are keyed by canonical path. Only outcomes carrying a symbol
//! table are kept; a failed compile is retried on the next request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::{CompilationOutcome, Compiler};
use crate::config::ClientSettings;
use crate::error::{check_cancelled, FeatureResult};
use crate::uri::canonical_path;

#[derive(Debug, Default)]
pub struct CompilationCache {
    entries: DashMap<PathBuf, Arc<CompilationOutcome>>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri_or_path: &str) -> Option<Arc<CompilationOutcome>> {
        let key = canonical_path(uri_or_path)?;
        self.entries.get(&key).map(|entry| Arc::clone(&entry))
    }

    /// Store an outcome. Outcomes without a symbol table are ignored.
    pub fn put(&self, uri_or_path: &str, outcome: Arc<CompilationOutcome>) {
        if outcome.symbol_table.is_none() {
            return;
        }
        if let Some(key) = canonical_path(uri_or_path) {
            self.entries.insert(key, outcome);
        }
    }

    /// Drop the entry for a file, and every entry whose model closure
    /// includes that file.
    pub fn invalidate(&self, uri_or_path: &str) {
        let Some(key) = canonical_path(uri_or_path) else {
            return;
        };
        self.entries.remove(&key);
        self.entries
            .retain(|_, outcome| !depends_on(outcome, &key));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached outcome for a file, compiling it on a miss.
    ///
    /// Non-file documents yield an empty outcome without running the
    /// compiler.
    pub fn get_or_compile(
        &self,
        uri_or_path: &str,
        compiler: &dyn Compiler,
        settings: &ClientSettings,
        cancel: &CancellationToken,
    ) -> FeatureResult<Arc<CompilationOutcome>> {
        let Some(path) = canonical_path(uri_or_path) else {
            return Ok(Arc::new(CompilationOutcome::default()));
        };
        if let Some(hit) = self.entries.get(&path) {
            tracing::debug!("Compilation cache hit for {}", path.display());
            return Ok(Arc::clone(&hit));
        }

        check_cancelled(cancel)?;
        tracing::debug!("Compiling {}", path.display());
        let outcome = Arc::new(compiler.compile(&path, settings));
        check_cancelled(cancel)?;

        if outcome.symbol_table.is_some() {
            self.entries.insert(path, Arc::clone(&outcome));
        } else {
            tracing::debug!(
                "Compilation of {} produced no symbol table ({} messages)",
                path.display(),
                outcome.diagnostics.len()
            );
        }
        Ok(outcome)
    }
}

fn depends_on(outcome: &CompilationOutcome, file: &Path) -> bool {
    let Some(table) = outcome.symbol_table.as_ref() else {
        return false;
    };
    table.reachable_models().into_iter().any(|id| {
        table
            .model(id)
            .and_then(|m| m.file.as_deref())
            .and_then(canonical_path)
            .is_some_and(|p| p == file)
    })
}

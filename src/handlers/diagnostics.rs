//! Compiler messages as LSP diagnostics.

use std::path::Path;

use tower_lsp::lsp_types::*;

use crate::analysis::position::{line_start_offset, position_at};
use crate::compiler::{CompilationOutcome, Message, Severity};
use crate::uri::canonical_path;

const SOURCE: &str = "ili2c";

/// Diagnostics for `file` from a compilation outcome.
///
/// Messages about other files (imported models) are dropped. Messages
/// without a file are attributed to the compiled one.
pub fn to_diagnostics(outcome: &CompilationOutcome, file: &Path, text: &str) -> Vec<Diagnostic> {
    let target = canonical_path(&file.to_string_lossy());

    outcome
        .diagnostics
        .iter()
        .filter(|message| match message.file.as_deref() {
            None => true,
            Some(f) => canonical_path(f) == target,
        })
        .map(|message| to_diagnostic(message, text))
        .collect()
}

fn to_diagnostic(message: &Message, text: &str) -> Diagnostic {
    let line = message.line.saturating_sub(1);
    let line_start = line_start_offset(text, line);
    let line_end = text[line_start..]
        .find(['\n', '\r'])
        .map(|i| line_start + i)
        .unwrap_or(text.len());

    let start = Position::new(line, message.column.saturating_sub(1));
    let end = if message.line == 0 {
        start
    } else {
        position_at(text, line_end).max(start)
    };

    Diagnostic {
        range: Range::new(start, end),
        severity: Some(match message.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
            Severity::Info => DiagnosticSeverity::INFORMATION,
        }),
        source: Some(SOURCE.to_string()),
        message: message.text.clone(),
        ..Default::default()
    }
}

//! Out-of-process compiler.
//!
//! Runs `<command> --modeldir <repositories> <file>` and reads a JSON
//! [`CompilationOutcome`] from its stdout.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

use super::{CompilationOutcome, Compiler};
use crate::config::ClientSettings;

#[derive(Debug, Clone, Default)]
pub struct CommandCompiler;

impl CommandCompiler {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, path: &Path, settings: &ClientSettings) -> Result<CompilationOutcome> {
        let program = settings.compiler_command();
        let output = Command::new(&program)
            .arg("--modeldir")
            .arg(settings.repositories().join(";"))
            .arg(path)
            .output()
            .with_context(|| format!("failed to run compiler `{}`", program))?;

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "compiler `{}` exited with {} and no output: {}",
                program,
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("compiler `{}` produced unreadable output", program))
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, path: &Path, settings: &ClientSettings) -> CompilationOutcome {
        match self.run(path, settings) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Compilation of {} failed: {:#}", path.display(), e);
                CompilationOutcome::failed(path, format!("{:#}", e))
            }
        }
    }
}

//! Compiler adapter and the symbol table it produces.
//!
//! The INTERLIS compiler runs out of process (see [`command`]). It reports a
//! [`CompilationOutcome`]: diagnostics plus, when the model set could be
//! resolved, a [`SymbolTable`]. Models live in an arena and refer to their
//! imports by [`ModelId`], so import cycles are plain edges.

pub mod cache;
pub mod command;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::CompletionItemKind;

use crate::config::ClientSettings;
use crate::uri::canonical_path;

pub use cache::CompilationCache;
pub use command::CommandCompiler;

/// Index of a model in [`SymbolTable::models`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub usize);

/// Kind of a declared element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclKind {
    Model,
    Topic,
    Class,
    Structure,
    Association,
    View,
    Domain,
    Unit,
    Function,
    Attribute,
    Role,
    #[serde(other)]
    Other,
}

impl DeclKind {
    /// Classes, structures, associations and views.
    pub fn is_viewable(self) -> bool {
        matches!(
            self,
            DeclKind::Class | DeclKind::Structure | DeclKind::Association | DeclKind::View
        )
    }

    /// Attributes and association roles.
    pub fn is_member(self) -> bool {
        matches!(self, DeclKind::Attribute | DeclKind::Role)
    }

    pub fn completion_kind(self) -> CompletionItemKind {
        match self {
            DeclKind::Model | DeclKind::Topic => CompletionItemKind::MODULE,
            DeclKind::Class | DeclKind::Structure | DeclKind::Association | DeclKind::View => {
                CompletionItemKind::CLASS
            }
            DeclKind::Domain => CompletionItemKind::STRUCT,
            DeclKind::Unit => CompletionItemKind::UNIT,
            DeclKind::Function => CompletionItemKind::FUNCTION,
            DeclKind::Attribute => CompletionItemKind::FIELD,
            DeclKind::Role => CompletionItemKind::PROPERTY,
            DeclKind::Other => CompletionItemKind::TEXT,
        }
    }
}

/// A named element nested in a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    /// 1-based source line, 0 when unknown
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub children: Vec<Declaration>,
}

impl Declaration {
    pub fn child(&self, name: &str) -> Option<&Declaration> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A model and its top-level declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDecl {
    pub name: String,
    /// Declaring file as reported by the compiler (path or `file:` URI)
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub imports: Vec<ModelId>,
    #[serde(default)]
    pub children: Vec<Declaration>,
}

impl ModelDecl {
    pub fn child(&self, name: &str) -> Option<&Declaration> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Resolved element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub name: String,
    /// Fully scoped name, `Model.Topic.Class`
    pub scoped_name: String,
    pub kind: DeclKind,
    pub declaring_file: Option<String>,
    /// 1-based, 0 when unknown
    pub source_line: u32,
}

/// Resolved model set of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTable {
    pub models: Vec<ModelDecl>,
    /// Models declared in the compiled file itself
    #[serde(default)]
    pub last_file_models: Vec<ModelId>,
}

impl SymbolTable {
    pub fn model(&self, id: ModelId) -> Option<&ModelDecl> {
        self.models.get(id.0)
    }

    /// Models declared in the compiled file.
    pub fn models_from_last_file(&self) -> impl Iterator<Item = (ModelId, &ModelDecl)> + '_ {
        self.last_file_models
            .iter()
            .filter_map(|&id| self.model(id).map(|m| (id, m)))
    }

    /// The compiled file's models followed by everything they import,
    /// transitively, each listed once.
    pub fn reachable_models(&self) -> Vec<ModelId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<ModelId> = self.last_file_models.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(model) = self.model(id) else {
                continue;
            };
            order.push(id);
            stack.extend(model.imports.iter().rev().copied());
        }
        order
    }

    /// Names of all reachable models.
    pub fn model_names(&self) -> Vec<String> {
        self.reachable_models()
            .into_iter()
            .filter_map(|id| self.model(id).map(|m| m.name.clone()))
            .collect()
    }

    /// Find a reachable model by name, ignoring case.
    pub fn resolve_model(&self, name: &str) -> Option<ModelId> {
        self.reachable_models().into_iter().find(|&id| {
            self.model(id)
                .is_some_and(|m| m.name.eq_ignore_ascii_case(name))
        })
    }

    fn model_by_exact_name(&self, name: &str) -> Option<ModelId> {
        self.models
            .iter()
            .position(|m| m.name == name)
            .map(ModelId)
    }

    /// Resolve a possibly qualified name.
    ///
    /// A fully scoped path (`Model.Topic.Class`) is walked from its model.
    /// Failing that, the last segment is tried as a model name.
    pub fn resolve(&self, dotted: &str) -> Option<SymbolRef> {
        let segments: Vec<&str> = dotted.split('.').collect();
        if let Some(found) = self.resolve_path(&segments) {
            return Some(found);
        }
        if segments.len() > 1 {
            let last = segments.last()?;
            return self.resolve_path(&[last]);
        }
        None
    }

    fn resolve_path(&self, segments: &[&str]) -> Option<SymbolRef> {
        let (first, rest) = segments.split_first()?;
        let model = self.model(self.model_by_exact_name(first)?)?;

        let Some((head, tail)) = rest.split_first() else {
            return Some(SymbolRef {
                name: model.name.clone(),
                scoped_name: model.name.clone(),
                kind: DeclKind::Model,
                declaring_file: model.file.clone(),
                source_line: model.line,
            });
        };

        let mut decl = model.child(head)?;
        for segment in tail {
            decl = decl.child(segment)?;
        }

        Some(SymbolRef {
            name: decl.name.clone(),
            scoped_name: segments.join("."),
            kind: decl.kind,
            declaring_file: model.file.clone(),
            source_line: decl.line,
        })
    }

    /// Find the element called `name` declared in `file`, closest to `line`.
    ///
    /// `line` is 1-based. On equal distance the more deeply nested element
    /// wins.
    pub fn resolve_at(&self, file: &Path, line: u32, name: &str) -> Option<SymbolRef> {
        let target = canonical_path(&file.to_string_lossy())?;
        let mut best: Option<(u32, usize, SymbolRef)> = None;

        for model in &self.models {
            let Some(model_path) = model.file.as_deref().and_then(canonical_path) else {
                continue;
            };
            if model_path != target {
                continue;
            }

            let mut consider = |decl_name: &str, kind: DeclKind, decl_line: u32, scope: &[&str]| {
                if decl_name != name {
                    return;
                }
                let distance = if decl_line == 0 {
                    u32::MAX
                } else {
                    decl_line.abs_diff(line)
                };
                let depth = scope.len();
                let better = match &best {
                    None => true,
                    Some((d, dep, _)) => distance < *d || (distance == *d && depth > *dep),
                };
                if better {
                    best = Some((
                        distance,
                        depth,
                        SymbolRef {
                            name: decl_name.to_string(),
                            scoped_name: scope.join("."),
                            kind,
                            declaring_file: model.file.clone(),
                            source_line: decl_line,
                        },
                    ));
                }
            };

            consider(&model.name, DeclKind::Model, model.line, &[model.name.as_str()]);

            let mut stack: Vec<(&Declaration, Vec<&str>)> = model
                .children
                .iter()
                .map(|c| (c, vec![model.name.as_str(), c.name.as_str()]))
                .collect();
            while let Some((decl, scope)) = stack.pop() {
                consider(&decl.name, decl.kind, decl.line, &scope);
                for child in &decl.children {
                    let mut child_scope = scope.clone();
                    child_scope.push(&child.name);
                    stack.push((child, child_scope));
                }
            }
        }

        best.map(|(_, _, found)| found)
    }
}

/// Severity of a compiler message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub severity: Severity,
    #[serde(default)]
    pub file: Option<String>,
    /// 1-based, 0 when unknown
    #[serde(default)]
    pub line: u32,
    /// 1-based, 0 when unknown
    #[serde(default)]
    pub column: u32,
    pub text: String,
}

/// Result of compiling one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationOutcome {
    #[serde(default)]
    pub symbol_table: Option<SymbolTable>,
    #[serde(default)]
    pub diagnostics: Vec<Message>,
}

impl CompilationOutcome {
    /// Outcome of a compilation that could not run at all.
    pub fn failed(file: &Path, text: impl Into<String>) -> Self {
        Self {
            symbol_table: None,
            diagnostics: vec![Message {
                severity: Severity::Error,
                file: Some(file.to_string_lossy().into_owned()),
                line: 0,
                column: 0,
                text: text.into(),
            }],
        }
    }
}

/// Anything that can compile an INTERLIS file.
///
/// Implementations block; callers run them off the async executor.
pub trait Compiler: Send + Sync {
    fn compile(&self, path: &Path, settings: &ClientSettings) -> CompilationOutcome;
}

impl<F> Compiler for F
where
    F: Fn(&Path, &ClientSettings) -> CompilationOutcome + Send + Sync,
{
    fn compile(&self, path: &Path, settings: &ClientSettings) -> CompilationOutcome {
        self(path, settings)
    }
}

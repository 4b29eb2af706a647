//! Completion handler.
//!
//! Three sources, tried in order:
//! 1. model names from the repositories inside an open `IMPORTS` clause
//! 2. children of a dotted path in a type reference (`Model.Topic.`)
//! 3. model names for a bare word in a type reference

use std::collections::HashSet;

use tower_lsp::lsp_types::*;

use super::FeatureContext;
use crate::analysis::position::{range_between, to_offset};
use crate::analysis::{
    dotted_path_before, find_imports_context, word_before, DottedPath, ImportContext,
};
use crate::compiler::{DeclKind, Declaration, ModelDecl, SymbolTable};
use crate::discovery::ModelDiscovery;
use crate::error::FeatureResult;

/// Generate completions at a position.
pub fn get_completions(
    ctx: &FeatureContext<'_>,
    discovery: &dyn ModelDiscovery,
    uri: &Url,
    position: Position,
) -> FeatureResult<Vec<CompletionItem>> {
    let Some(text) = ctx.document_text(uri)? else {
        return Ok(vec![]);
    };
    let offset = to_offset(&text, position);

    if let Some(imports) = find_imports_context(&text, offset) {
        let items = complete_imports(&text, offset, &imports, discovery);
        if !items.is_empty() {
            return Ok(items);
        }
    }

    let outcome = ctx.compile(uri)?;
    let Some(table) = outcome.symbol_table.as_ref() else {
        tracing::debug!("No symbol table for {}, no completions", uri);
        return Ok(vec![]);
    };

    if let Some(path) = dotted_path_before(&text, offset) {
        let items = complete_dotted_path(&text, offset, &path, table);
        if !items.is_empty() {
            return Ok(items);
        }
    }

    if let Some(word) = word_before(&text, offset) {
        let range = range_between(&text, word.start, offset);
        return Ok(unique_matching(
            table
                .model_names()
                .into_iter()
                .map(|name| (name, CompletionItemKind::MODULE)),
            &word.prefix,
            range,
        ));
    }

    Ok(vec![])
}

/// Model names for an `IMPORTS` clause, minus the ones already listed.
pub fn complete_imports(
    text: &str,
    offset: usize,
    imports: &ImportContext,
    discovery: &dyn ModelDiscovery,
) -> Vec<CompletionItem> {
    let exclude: HashSet<String> = imports
        .already_listed
        .iter()
        .map(|name| name.to_uppercase())
        .collect();
    let range = range_between(text, imports.prefix_start, offset);

    discovery
        .search_models(&imports.prefix, &exclude)
        .into_iter()
        .map(|name| item(name, CompletionItemKind::MODULE, range))
        .collect()
}

/// What a dotted path qualifier resolved to.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Model(&'a ModelDecl),
    Topic(&'a Declaration),
    Viewable(&'a Declaration),
}

fn resolve_chain<'a>(table: &'a SymbolTable, qualifier: &[String]) -> Option<Scope<'a>> {
    let (first, rest) = qualifier.split_first()?;
    let mut scope = Scope::Model(table.model(table.resolve_model(first)?)?);

    for segment in rest {
        scope = match scope {
            Scope::Model(model) => {
                let child = model.child(segment)?;
                match child.kind {
                    DeclKind::Topic => Scope::Topic(child),
                    kind if kind.is_viewable() => Scope::Viewable(child),
                    _ => return None,
                }
            }
            Scope::Topic(topic) => {
                let child = topic.child(segment)?;
                if !child.kind.is_viewable() {
                    return None;
                }
                Scope::Viewable(child)
            }
            // An attribute or role keeps us on the viewable.
            Scope::Viewable(viewable) => {
                if !viewable.child(segment)?.kind.is_member() {
                    return None;
                }
                Scope::Viewable(viewable)
            }
        };
    }
    Some(scope)
}

fn complete_dotted_path(
    text: &str,
    offset: usize,
    path: &DottedPath,
    table: &SymbolTable,
) -> Vec<CompletionItem> {
    let Some(scope) = resolve_chain(table, path.qualifier()) else {
        tracing::debug!("Unresolved completion path {:?}", path.segments);
        return vec![];
    };

    let prefix = path.prefix();
    let range = range_between(text, offset - prefix.len(), offset);
    let children: Vec<(String, CompletionItemKind)> = match scope {
        Scope::Model(model) => named(&model.children, |_| true),
        Scope::Topic(topic) => named(&topic.children, |_| true),
        Scope::Viewable(viewable) => named(&viewable.children, |d| d.kind.is_member()),
    };
    unique_matching(children, prefix, range)
}

fn named(
    declarations: &[Declaration],
    keep: impl Fn(&Declaration) -> bool,
) -> Vec<(String, CompletionItemKind)> {
    declarations
        .iter()
        .filter(|d| keep(d))
        .map(|d| (d.name.clone(), d.kind.completion_kind()))
        .collect()
}

/// Candidates starting with `prefix` (case-insensitive), first spelling
/// wins among names equal up to case.
fn unique_matching(
    candidates: impl IntoIterator<Item = (String, CompletionItemKind)>,
    prefix: &str,
    range: Range,
) -> Vec<CompletionItem> {
    let prefix = prefix.to_lowercase();
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(name, _)| name.to_lowercase().starts_with(&prefix))
        .filter(|(name, _)| seen.insert(name.to_uppercase()))
        .map(|(name, kind)| item(name, kind, range))
        .collect()
}

fn item(label: String, kind: CompletionItemKind, range: Range) -> CompletionItem {
    CompletionItem {
        text_edit: Some(CompletionTextEdit::Edit(TextEdit {
            range,
            new_text: label.clone(),
        })),
        label,
        kind: Some(kind),
        ..Default::default()
    }
}

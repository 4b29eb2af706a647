//! Document symbols handler.

use std::collections::HashSet;

use tower_lsp::lsp_types::*;

use super::FeatureContext;
use crate::analysis::position::{line_span, line_start_offset, position_at};
use crate::analysis::tokens::find_standalone;
use crate::compiler::{DeclKind, Declaration, ModelId, SymbolTable};
use crate::error::FeatureResult;

/// Get document symbols (outline) for the models declared in a document.
pub fn get_document_symbols(
    ctx: &FeatureContext<'_>,
    uri: &Url,
) -> FeatureResult<Vec<DocumentSymbol>> {
    let Some(text) = ctx.document_text(uri)? else {
        return Ok(vec![]);
    };
    let outcome = ctx.compile(uri)?;
    let Some(table) = outcome.symbol_table.as_ref() else {
        return Ok(vec![]);
    };
    Ok(collect_symbols(table, &text))
}

/// One entry per model of the compiled file, its topics and viewables
/// nested below, followed by the models it imports.
///
/// A model imported by an earlier model of the same file is not listed again
/// at the top level.
pub fn collect_symbols(table: &SymbolTable, text: &str) -> Vec<DocumentSymbol> {
    let mut seen: HashSet<ModelId> = HashSet::new();
    let mut symbols = Vec::new();

    for (id, model) in table.models_from_last_file() {
        if !seen.insert(id) {
            continue;
        }

        let mut symbol = symbol(text, &model.name, model.line, Some("MODEL"), SymbolKind::MODULE);
        let mut children = container_symbols(text, &model.children);

        for &import in &model.imports {
            let Some(imported) = table.model(import) else {
                continue;
            };
            seen.insert(import);
            children.push(with_range(
                symbol_named(&imported.name, Some("IMPORT"), SymbolKind::MODULE),
                symbol.range,
            ));
        }

        symbol.children = Some(children);
        symbols.push(symbol);
    }
    symbols
}

fn container_symbols(text: &str, declarations: &[Declaration]) -> Vec<DocumentSymbol> {
    declarations
        .iter()
        .filter_map(|decl| {
            let (detail, kind) = match decl.kind {
                DeclKind::Topic => ("TOPIC", SymbolKind::NAMESPACE),
                DeclKind::Class => ("CLASS", SymbolKind::CLASS),
                DeclKind::Structure => ("STRUCTURE", SymbolKind::STRUCT),
                DeclKind::Association => ("ASSOCIATION", SymbolKind::INTERFACE),
                DeclKind::View => ("VIEW", SymbolKind::INTERFACE),
                DeclKind::Domain => ("DOMAIN", SymbolKind::TYPE_PARAMETER),
                _ => return None,
            };

            let mut symbol = symbol(text, &decl.name, decl.line, Some(detail), kind);
            symbol.children = match decl.kind {
                DeclKind::Topic => Some(container_symbols(text, &decl.children)),
                DeclKind::Domain => None,
                _ => Some(attribute_symbols(text, &decl.children)),
            };
            Some(symbol)
        })
        .collect()
}

fn attribute_symbols(text: &str, members: &[Declaration]) -> Vec<DocumentSymbol> {
    members
        .iter()
        .filter(|m| m.kind == DeclKind::Attribute)
        .map(|m| symbol(text, &m.name, m.line, None, SymbolKind::PROPERTY))
        .collect()
}

/// Symbol spanning the whole 1-based `line`, selecting the name on it.
#[allow(deprecated)]
fn symbol(
    text: &str,
    name: &str,
    line: u32,
    detail: Option<&str>,
    kind: SymbolKind,
) -> DocumentSymbol {
    let line = line.saturating_sub(1);
    let (start, end) = line_span(text, line);
    let next = line_start_offset(text, line + 1).max(end);

    let range = if text.is_empty() {
        Range::new(Position::new(line, 0), Position::new(line, 0))
    } else {
        Range::new(position_at(text, start), position_at(text, next))
    };
    let selection_range = match find_standalone(&text[start..end], name) {
        Some(i) => Range::new(
            position_at(text, start + i),
            position_at(text, start + i + name.len()),
        ),
        None => range,
    };

    DocumentSymbol {
        range,
        selection_range,
        ..symbol_named(name, detail, kind)
    }
}

#[allow(deprecated)]
fn symbol_named(name: &str, detail: Option<&str>, kind: SymbolKind) -> DocumentSymbol {
    DocumentSymbol {
        name: name.to_string(),
        detail: detail.map(str::to_string),
        kind,
        tags: None,
        deprecated: None,
        range: Range::default(),
        selection_range: Range::default(),
        children: None,
    }
}

fn with_range(mut symbol: DocumentSymbol, range: Range) -> DocumentSymbol {
    symbol.range = range;
    symbol.selection_range = range;
    symbol.children = Some(vec![]);
    symbol
}

//! Go to definition handler.

use tower_lsp::lsp_types::*;

use super::FeatureContext;
use crate::analysis::position::{line_span, position_at, to_offset};
use crate::analysis::tokens::{find_standalone, last_segment, token_span_at};
use crate::error::FeatureResult;
use crate::uri::{path_to_uri, to_filesystem_path};

/// Find the declaration of the name under the cursor.
pub fn goto_definition(
    ctx: &FeatureContext<'_>,
    uri: &Url,
    position: Position,
) -> FeatureResult<Option<GotoDefinitionResponse>> {
    let Some(text) = ctx.document_text(uri)? else {
        return Ok(None);
    };
    let offset = to_offset(&text, position);
    let Some((start, end)) = token_span_at(&text, offset) else {
        return Ok(None);
    };
    let token = text[start..end].trim_end_matches('.');
    let name = last_segment(token);
    if name.is_empty() {
        return Ok(None);
    }

    let outcome = ctx.compile(uri)?;
    let Some(table) = outcome.symbol_table.as_ref() else {
        return Ok(None);
    };

    let found = table.resolve(token).or_else(|| {
        let path = to_filesystem_path(uri.as_str())?;
        table.resolve_at(&path, position.line + 1, name)
    });
    let Some(found) = found else {
        tracing::debug!("No definition for {}", token);
        return Ok(None);
    };

    let Some(target) = found
        .declaring_file
        .as_deref()
        .and_then(to_filesystem_path)
        .and_then(|p| path_to_uri(&p))
    else {
        return Ok(None);
    };

    let line = found.source_line.saturating_sub(1);
    let character = match ctx.document_text(&target)? {
        Some(target_text) => name_column(&target_text, line, &found.name),
        None => Position::new(line, 0),
    };
    let range = Range::new(character, character);

    Ok(Some(GotoDefinitionResponse::Scalar(Location::new(target, range))))
}

/// Position of the first standalone `name` on `line`, or the line start.
fn name_column(text: &str, line: u32, name: &str) -> Position {
    let (start, end) = line_span(text, line);
    match find_standalone(&text[start..end], name) {
        Some(i) => position_at(text, start + i),
        None => Position::new(line, 0),
    }
}

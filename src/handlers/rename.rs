//! Rename handler.
//!
//! Renames a declaration together with its references in the document and
//! in every model file reachable through imports. References may be plain
//! (`Thema`) or qualified (`Model.Thema`, `Model.Topic.Thema`); the
//! qualifier is kept and only the last segment changes.

use std::collections::HashMap;
use std::sync::Arc;

use tower_lsp::lsp_types::*;

use super::FeatureContext;
use crate::analysis::position::{line_span, range_between, to_offset};
use crate::analysis::tokens::{
    identifier_runs, is_valid_identifier, is_word_char, last_segment, preceding_word,
    replace_last_segment, token_span_at,
};
use crate::compiler::SymbolTable;
use crate::error::{check_cancelled, FeatureResult};
use crate::uri::{canonical_path, canonical_uri_path, path_to_uri, to_filesystem_path};

/// Keywords that introduce a new declaration. A plain name right after one
/// of these is a declaration of its own, not a reference.
const DEFINITION_KEYWORDS: &[&str] = &[
    "CLASS",
    "STRUCTURE",
    "TABLE",
    "VIEW",
    "ASSOCIATION",
    "DOMAIN",
    "UNIT",
    "TOPIC",
    "MODEL",
    "ENUMERATION",
    "FUNCTION",
    "PROCEDURE",
];

/// Handle textDocument/rename.
pub fn rename(
    ctx: &FeatureContext<'_>,
    uri: &Url,
    position: Position,
    new_name: &str,
) -> FeatureResult<WorkspaceEdit> {
    let new_name = new_name.trim();
    if !is_valid_identifier(new_name) {
        tracing::debug!("Rejecting rename to invalid identifier {:?}", new_name);
        return Ok(empty_edit());
    }

    let Some(text) = ctx.document_text(uri)? else {
        return Ok(empty_edit());
    };
    let offset = to_offset(&text, position);
    let Some(primary_span) = token_span_at(&text, offset) else {
        return Ok(empty_edit());
    };

    let token = &text[primary_span.0..primary_span.1];
    let old_name = last_segment(token);
    if old_name.is_empty() || old_name == new_name {
        return Ok(empty_edit());
    }

    let outcome = ctx.compile(uri)?;
    let table = outcome.symbol_table.as_ref();
    // Only a qualified token names its declaration exactly; a plain name
    // resolved by line distance just widens the spellings.
    let exact = table
        .filter(|_| token.contains('.'))
        .and_then(|t| t.resolve(token));
    let resolved = exact.clone().or_else(|| {
        let t = table?;
        t.resolve(token).or_else(|| {
            let path = to_filesystem_path(uri.as_str())?;
            t.resolve_at(&path, position.line + 1, old_name)
        })
    });
    tracing::debug!(
        "Renaming {} ({:?}) to {}",
        token,
        resolved.as_ref().map(|r| &r.scoped_name),
        new_name
    );

    let spellings = collect_spellings(
        token,
        old_name,
        resolved.as_ref().map(|r| r.scoped_name.as_str()),
    );
    let primary_key = canonical_uri_path(uri);
    let declaring_key = exact
        .as_ref()
        .and_then(|r| r.declaring_file.as_deref())
        .and_then(canonical_path);
    let declaring_line = exact.as_ref().map(|r| r.source_line).unwrap_or(0);

    let mut changes = HashMap::new();
    for target in candidate_uris(uri, table) {
        check_cancelled(ctx.cancel)?;

        let target_key = canonical_uri_path(&target);
        let is_primary = target == *uri || (primary_key.is_some() && target_key == primary_key);
        let target_text = if is_primary {
            Arc::clone(&text)
        } else {
            match ctx.document_text(&target)? {
                Some(target_text) => target_text,
                None => continue,
            }
        };

        let mut anchors = Vec::new();
        if is_primary {
            anchors.push(primary_span);
        }
        if declaring_key.is_some() && target_key == declaring_key {
            anchors.extend(declaration_span(&target_text, declaring_line, old_name));
        }

        let edits = compute_edits(&target_text, old_name, new_name, &spellings, &anchors);

        if !edits.is_empty() {
            changes.insert(if is_primary { uri.clone() } else { target }, edits);
        }
    }

    Ok(WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    })
}

fn empty_edit() -> WorkspaceEdit {
    WorkspaceEdit {
        changes: Some(HashMap::new()),
        ..Default::default()
    }
}

/// Textual forms a reference to the renamed element can take.
///
/// For `Model.Topic.Thema` that is the name itself, each dotted suffix
/// (`Topic.Thema`, `Model.Topic.Thema`), and each single qualifier followed
/// by the name (`Model.Thema`).
pub fn collect_spellings(token: &str, old_name: &str, scoped_name: Option<&str>) -> Vec<String> {
    let mut spellings: Vec<String> = Vec::new();
    let mut add = |s: String| {
        if !s.is_empty() && !spellings.contains(&s) {
            spellings.push(s);
        }
    };

    add(token.to_string());
    add(old_name.to_string());

    if let Some(scoped) = scoped_name {
        let segments: Vec<&str> = scoped.split('.').collect();
        for i in 0..segments.len() {
            add(segments[i..].join("."));
        }
        if let Some((last, qualifiers)) = segments.split_last() {
            for qualifier in qualifiers {
                add(format!("{}.{}", qualifier, last));
            }
        }
    }
    spellings
}

/// The document itself, then the files of every model reachable from the
/// models it declares. Each file appears once.
fn candidate_uris(primary: &Url, table: Option<&SymbolTable>) -> Vec<Url> {
    let mut uris = vec![primary.clone()];
    let mut seen: Vec<_> = canonical_uri_path(primary).into_iter().collect();

    let Some(table) = table else {
        return uris;
    };
    for id in table.reachable_models() {
        let Some(file) = table.model(id).and_then(|m| m.file.as_deref()) else {
            continue;
        };
        let Some(uri) = to_filesystem_path(file).and_then(|p| path_to_uri(&p)) else {
            continue;
        };
        let Some(key) = canonical_uri_path(&uri) else {
            continue;
        };
        if !seen.contains(&key) {
            seen.push(key);
            uris.push(uri);
        }
    }
    uris
}

/// Span of the declaration of `name` on the 1-based `line`, if it is there.
fn declaration_span(text: &str, line: u32, name: &str) -> Option<(usize, usize)> {
    if line == 0 {
        return None;
    }
    let (start, line_end) = line_span(text, line - 1);

    identifier_runs(&text[start..line_end])
        .map(|(s, e)| (start + s, start + e))
        .find(|&(s, e)| {
            &text[s..e] == name
                && preceding_word(text, s)
                    .is_some_and(|w| DEFINITION_KEYWORDS.contains(&w.to_uppercase().as_str()))
        })
}

/// Edits renaming every matching reference in `text`.
///
/// `anchors` are spans known to be the renamed element itself: the token
/// under the cursor and, for a qualified token, its declaration. A name after a
/// declaration keyword is only renamed when it is an anchor, and a name
/// after `END` only when it closes an anchored declaration.
pub fn compute_edits(
    text: &str,
    old_name: &str,
    new_name: &str,
    spellings: &[String],
    anchors: &[(usize, usize)],
) -> Vec<TextEdit> {
    let end_tokens: Vec<usize> = anchors
        .iter()
        .filter_map(|&(start, _)| find_end_token(text, old_name, start))
        .collect();

    identifier_runs(text)
        .filter_map(|(start, end)| {
            let current = &text[start..end];
            if !spellings.iter().any(|s| s == current) || last_segment(current) != old_name {
                return None;
            }
            if !should_rename(text, current, (start, end), anchors, &end_tokens) {
                return None;
            }
            let replacement = replace_last_segment(current, new_name);
            if replacement == current {
                return None;
            }
            Some(TextEdit {
                range: range_between(text, start, end),
                new_text: replacement,
            })
        })
        .collect()
}

fn should_rename(
    text: &str,
    current: &str,
    span: (usize, usize),
    anchors: &[(usize, usize)],
    end_tokens: &[usize],
) -> bool {
    if current.contains('.') || anchors.contains(&span) {
        return true;
    }

    match preceding_word(text, span.0).map(str::to_uppercase) {
        Some(word) if DEFINITION_KEYWORDS.contains(&word.as_str()) => false,
        Some(word) if word == "END" => end_tokens.contains(&span.0),
        _ => true,
    }
}

/// Start of the name in the first `END <name>` after `from`.
fn find_end_token(text: &str, name: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(rel) = text.get(search..)?.find("END") {
        let end_start = search + rel;
        let end_stop = end_start + 3;
        search = end_stop;

        let standalone_before = text[..end_start]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let rest = &text[end_stop..];
        let name_start = end_stop + (rest.len() - rest.trim_start().len());
        if !standalone_before || name_start == end_stop {
            continue;
        }

        let candidate = &text[name_start..];
        let boundary_after = candidate
            .get(name.len()..)
            .and_then(|after| after.chars().next())
            .is_none_or(|c| !is_word_char(c));
        if candidate.starts_with(name) && boundary_after {
            return Some(name_start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextEdit {
        TextEdit {
            range: Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1)),
            new_text: text.to_string(),
        }
    }

    #[test]
    fn test_spellings_from_scoped_name() {
        let spellings = collect_spellings("Thema", "Thema", Some("M.T.Thema"));
        assert_eq!(
            spellings,
            vec!["Thema", "M.T.Thema", "T.Thema", "M.Thema"]
        );
    }

    #[test]
    fn test_rename_definition_end_and_qualified_reference() {
        let text = "STRUCTURE Thema =\nEND Thema;\n\nSTRUCTURE MyThema EXTENDS SO_ARP_SEin_Konfiguration_20250115.Thema =\nEND MyThema;\n";
        let spellings = collect_spellings(
            "Thema",
            "Thema",
            Some("SO_ARP_SEin_Konfiguration_20250115.Thema"),
        );
        let edits = compute_edits(text, "Thema", "ThemaFoo", &spellings, &[(10, 15)]);
        assert_eq!(
            edits,
            vec![
                edit((0, 10), (0, 15), "ThemaFoo"),
                edit((1, 4), (1, 9), "ThemaFoo"),
                edit((3, 26), (3, 66), "SO_ARP_SEin_Konfiguration_20250115.ThemaFoo"),
            ]
        );
    }

    #[test]
    fn test_same_name_declared_twice_only_renames_selected() {
        let text = "STRUCTURE Thema =\nEND Thema;\n\nSTRUCTURE Thema EXTENDS MyModel.Thema =\nEND Thema;\n";
        let spellings = collect_spellings("Thema", "Thema", Some("MyModel.Thema"));
        let edits = compute_edits(text, "Thema", "ThemaFoo", &spellings, &[(10, 15)]);
        assert_eq!(
            edits,
            vec![
                edit((0, 10), (0, 15), "ThemaFoo"),
                edit((1, 4), (1, 9), "ThemaFoo"),
                edit((3, 24), (3, 37), "MyModel.ThemaFoo"),
            ]
        );
    }

    #[test]
    fn test_plain_references_are_renamed() {
        let text = "CLASS A =\n  t : Thema;\nEND A;";
        let spellings = collect_spellings("Thema", "Thema", None);
        let edits = compute_edits(text, "Thema", "Topic2", &spellings, &[]);
        assert_eq!(edits, vec![edit((1, 6), (1, 11), "Topic2")]);
    }

    #[test]
    fn test_declaration_anchor_renames_definition_and_end() {
        let text = "  TOPIC T =\n    STRUCTURE Thema =\n    END Thema;\n  END T;";
        let span = declaration_span(text, 2, "Thema").unwrap();
        assert_eq!(&text[span.0..span.1], "Thema");
        assert!(declaration_span(text, 1, "Thema").is_none());

        let spellings = collect_spellings("M.T.Thema", "Thema", Some("M.T.Thema"));
        let edits = compute_edits(text, "Thema", "Neu", &spellings, &[span]);
        assert_eq!(
            edits,
            vec![edit((1, 14), (1, 19), "Neu"), edit((2, 8), (2, 13), "Neu")]
        );
        assert!(compute_edits(text, "Thema", "Neu", &spellings, &[]).is_empty());
    }

    #[test]
    fn test_end_must_be_a_standalone_keyword() {
        let text = "CLASS Thema =\n  APPEND Thema;\nEND Thema;";
        assert_eq!(find_end_token(text, "Thema", 6), Some(34));
        assert_eq!(find_end_token("END Themas;", "Thema", 0), None);
    }

    #[test]
    fn test_unrelated_longer_names_are_left_alone() {
        let text = "STRUCTURE Thema =\nEND Thema;\nx : Themas;\ny : Other.Thema2;";
        let spellings = collect_spellings("Thema", "Thema", Some("M.Thema"));
        let edits = compute_edits(text, "Thema", "Neu", &spellings, &[(10, 15)]);
        assert_eq!(edits.len(), 2);
    }
}

//! Completion context detection.
//!
//! Three places offer completions: the model list of an `IMPORTS` clause,
//! a dotted path in a type reference (`Model.Topic.`), and a bare word in a
//! type reference.

use std::sync::LazyLock;

use regex::Regex;

use super::position::{clamp_offset, line_start_before};
use super::tokens::{is_identifier_part, is_word_char, trailing_run};

/// How far back to look for an unterminated `IMPORTS` clause.
const IMPORTS_LOOKBACK: usize = 2000;

static IMPORTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bIMPORTS\b").expect("static IMPORTS pattern")
});

/// Keywords after which a name refers to a type.
const TYPE_REFERENCE_KEYWORDS: &[&str] = &[
    "OF", "FROM", "EXTENDS", "REF", "REFS", "REFERS", "REFERENCE", "BASE", "BASED", "OID", "AS",
];

/// Modifiers that may sit between a type-reference keyword and the name.
const TRANSPARENT_KEYWORDS: &[&str] = &[
    "MANDATORY",
    "OPTIONAL",
    "SET",
    "LIST",
    "BAG",
    "ARRAY",
    "ORDERED",
    "SORTED",
    "ANYCLASS",
    "ANYSTRUCTURE",
    "TO",
];

/// Cursor inside an unterminated `IMPORTS` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    /// Byte offset where the name being typed starts
    pub prefix_start: usize,
    /// Name typed so far, trimmed
    pub prefix: String,
    /// Names already listed before the current one
    pub already_listed: Vec<String>,
}

/// Dotted path in a type reference, e.g. `Model.Topic.Cl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath {
    /// Byte offset of the first segment
    pub start: usize,
    /// Segments split at dots; empty segments are kept
    pub segments: Vec<String>,
}

impl DottedPath {
    /// The segment being typed.
    pub fn prefix(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Segments before the one being typed.
    pub fn qualifier(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

/// Bare word in a type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPrefix {
    pub start: usize,
    pub prefix: String,
}

/// Detect an `IMPORTS` clause that is still open at `offset`.
pub fn find_imports_context(text: &str, offset: usize) -> Option<ImportContext> {
    let offset = clamp_offset(text, offset);
    let mut tail_start = offset.saturating_sub(IMPORTS_LOOKBACK);
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let tail = &text[tail_start..offset];

    let imports = IMPORTS_RE.find_iter(tail).last()?;
    if tail[imports.start()..].contains(';') {
        return None;
    }

    let segment = &tail[imports.end()..];
    let last_comma = segment.rfind(',');
    let mut name_start = last_comma.map(|i| i + 1).unwrap_or(0);
    name_start += leading_whitespace(&segment[name_start..]);
    if let Some(rest) = segment[name_start..].strip_prefix("UNQUALIFIED") {
        let gap = leading_whitespace(rest);
        if gap > 0 {
            name_start += "UNQUALIFIED".len() + gap;
        }
    }

    let already_listed = segment[..last_comma.unwrap_or(0)]
        .split(',')
        .map(|name| {
            let name = name.trim();
            name.strip_prefix("UNQUALIFIED")
                .filter(|rest| rest.starts_with(char::is_whitespace))
                .map(str::trim)
                .unwrap_or(name)
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let context = ImportContext {
        prefix_start: tail_start + imports.end() + name_start,
        prefix: segment[name_start..].trim().to_string(),
        already_listed,
    };
    tracing::debug!("IMPORTS context: {:?}", context);
    Some(context)
}

/// Whether a name starting at `token_start` is in a type-reference position.
///
/// Looks backwards past whitespace and modifiers: a `:` or one of the
/// reference keywords means yes; a statement separator or any other word
/// means no.
pub fn is_type_reference_context(text: &str, token_start: usize) -> bool {
    let mut idx = clamp_offset(text, token_start);

    loop {
        let before = text[..idx].trim_end();
        let Some(ch) = before.chars().next_back() else {
            return false;
        };

        if ch == ':' {
            return true;
        }
        if !ch.is_alphabetic() {
            return false;
        }

        let word = trailing_run(before, char::is_alphabetic);
        let upper = word.to_uppercase();
        if TYPE_REFERENCE_KEYWORDS.contains(&upper.as_str()) {
            return true;
        }
        if !TRANSPARENT_KEYWORDS.contains(&upper.as_str()) {
            return false;
        }
        idx = before.len() - word.len();
    }
}

/// Dotted path ending at `offset` on the current line, in a type reference.
pub fn dotted_path_before(text: &str, offset: usize) -> Option<DottedPath> {
    let offset = clamp_offset(text, offset);
    let line = &text[line_start_before(text, offset)..offset];
    let path = trailing_run(line, is_identifier_part);
    if !path.contains('.') {
        return None;
    }

    let start = offset - path.len();
    if !is_type_reference_context(text, start) {
        return None;
    }

    Some(DottedPath {
        start,
        segments: path.split('.').map(str::to_string).collect(),
    })
}

/// Word ending at `offset` on the current line, in a type reference.
pub fn word_before(text: &str, offset: usize) -> Option<WordPrefix> {
    let offset = clamp_offset(text, offset);
    let line = &text[line_start_before(text, offset)..offset];
    let word = trailing_run(line, is_word_char);
    if word.is_empty() {
        return None;
    }

    let start = offset - word.len();
    if !is_type_reference_context(text, start) {
        return None;
    }

    Some(WordPrefix {
        start,
        prefix: word.to_string(),
    })
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

//! Identifier scanning over raw document text.
//!
//! INTERLIS references are dotted paths (`Model.Topic.Class`), so a "token"
//! here is a maximal run of identifier characters and dots.

/// Characters that can appear in a (possibly qualified) name.
pub fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

/// Characters of a single unqualified name.
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Text after the last dot.
pub fn last_segment(token: &str) -> &str {
    match token.rfind('.') {
        Some(idx) => &token[idx + 1..],
        None => token,
    }
}

/// Replace the last dotted segment of `token`, keeping its qualifier.
pub fn replace_last_segment(token: &str, new_name: &str) -> String {
    match token.rfind('.') {
        Some(idx) => format!("{}{}", &token[..=idx], new_name),
        None => new_name.to_string(),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Byte span of the identifier-or-dot run touching `offset`, if any.
pub fn token_span_at(text: &str, offset: usize) -> Option<(usize, usize)> {
    let offset = super::position::clamp_offset(text, offset);

    let start = text[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_identifier_part(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);

    let end = text[offset..]
        .char_indices()
        .find(|(_, c)| !is_identifier_part(*c))
        .map(|(i, _)| offset + i)
        .unwrap_or(text.len());

    if start < end {
        Some((start, end))
    } else {
        None
    }
}

/// Iterate over all maximal identifier-or-dot runs as byte spans.
pub fn identifier_runs(text: &str) -> IdentifierRuns<'_> {
    IdentifierRuns { text, pos: 0 }
}

/// Iterator returned by [`identifier_runs`].
pub struct IdentifierRuns<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for IdentifierRuns<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.pos..];
        let (rel_start, _) = rest.char_indices().find(|(_, c)| is_identifier_part(*c))?;
        let start = self.pos + rel_start;
        let end = self.text[start..]
            .char_indices()
            .find(|(_, c)| !is_identifier_part(*c))
            .map(|(i, _)| start + i)
            .unwrap_or(self.text.len());
        self.pos = end;
        Some((start, end))
    }
}

/// The alphabetic word ending right before `offset`, skipping whitespace.
///
/// Used to look at the keyword that precedes a name (`CLASS Foo`,
/// `END Foo`).
pub fn preceding_word(text: &str, offset: usize) -> Option<&str> {
    let offset = super::position::clamp_offset(text, offset);
    let before = text[..offset].trim_end();
    let word_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic())
        .last()
        .map(|(i, _)| i)?;
    Some(&before[word_start..])
}

/// Trailing run of `pred` characters in `text`.
pub fn trailing_run(text: &str, pred: impl Fn(char) -> bool) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| pred(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// Offset of the first occurrence of `name` in `text` that is not part of a
/// longer word.
pub fn find_standalone(text: &str, name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    text.match_indices(name).map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back();
        let after = text[i + name.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

//! Conversion between LSP positions and byte offsets.
//!
//! Positions use UTF-16 columns as the protocol requires; offsets are byte
//! offsets into the Rust string. `\n`, `\r\n` and a lone `\r` each end a line,
//! and `\r\n` counts once. Every input is clamped into the text, nothing here
//! fails on malformed client positions.

use tower_lsp::lsp_types::{Position, Range};

/// Clamp `offset` into `[0, text.len()]` and back onto a char boundary.
pub fn clamp_offset(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Convert a position to a byte offset.
///
/// A line past the end maps to `text.len()`; a column past the end of its
/// line maps to the line end (before the line break).
pub fn to_offset(text: &str, position: Position) -> usize {
    if text.is_empty() {
        return 0;
    }

    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut index = 0;
    let mut line = 0u32;

    while index < len && line < position.line {
        match bytes[index] {
            b'\r' => {
                index += 1;
                if index < len && bytes[index] == b'\n' {
                    index += 1;
                }
                line += 1;
            }
            b'\n' => {
                index += 1;
                line += 1;
            }
            _ => index += 1,
        }
    }

    if line < position.line {
        return len;
    }

    let mut remaining = position.character as usize;
    for ch in text[index..].chars() {
        if remaining == 0 || ch == '\n' || ch == '\r' {
            break;
        }
        let width = ch.len_utf16();
        if width > remaining {
            // Column points into the middle of a surrogate pair.
            break;
        }
        remaining -= width;
        index += ch.len_utf8();
    }

    index
}

/// Convert a byte offset to a position.
pub fn position_at(text: &str, offset: usize) -> Position {
    let offset = clamp_offset(text, offset);
    let mut line = 0u32;
    let mut column = 0u32;

    let mut chars = text[..offset].chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                line += 1;
                column = 0;
            }
            '\n' => {
                line += 1;
                column = 0;
            }
            _ => column += ch.len_utf16() as u32,
        }
    }

    Position::new(line, column)
}

/// Byte offset of the first character of `line`, or `text.len()` when the
/// document has fewer lines.
pub fn line_start_offset(text: &str, line: u32) -> usize {
    if text.is_empty() || line == 0 {
        return 0;
    }

    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut current = 0u32;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'\r' => {
                if i + 1 < len && bytes[i + 1] == b'\n' {
                    i += 1;
                }
                current += 1;
                if current == line {
                    return (i + 1).min(len);
                }
            }
            b'\n' => {
                current += 1;
                if current == line {
                    return (i + 1).min(len);
                }
            }
            _ => {}
        }
        i += 1;
    }

    len
}

/// Byte span of `line` without its line break.
pub fn line_span(text: &str, line: u32) -> (usize, usize) {
    let start = line_start_offset(text, line);
    let len = text[start..].find(['\n', '\r']).unwrap_or(text.len() - start);
    (start, start + len)
}

/// Byte offset of the start of the line containing `offset`.
pub fn line_start_before(text: &str, offset: usize) -> usize {
    let offset = clamp_offset(text, offset);
    text[..offset]
        .rfind(['\n', '\r'])
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Build a range from two byte offsets.
pub fn range_between(text: &str, start: usize, end: usize) -> Range {
    Range::new(position_at(text, start), position_at(text, end))
}

//! Auto-closing of declarations on `=`.
//!
//! Typing the `=` that ends a `CLASS`, `STRUCTURE`, `TOPIC`, `VIEW TOPIC` or
//! `MODEL` header inserts the matching `END <name>` block. For a model the
//! header is also completed and a file banner is inserted above it.
//!
//! The generated text marks the intended caret position with
//! [`CARET_SENTINEL`]; [`strip_caret`] removes it before edits go to a
//! client that cannot place the cursor.

use chrono::{Local, NaiveDate};
use tower_lsp::lsp_types::*;

use crate::analysis::position::{line_start_before, range_between, to_offset};

pub const CARET_SENTINEL: &str = "__INTERLIS_AUTOCLOSE_CARET__";

/// How far before the `=` a header may start.
const LOOKBACK: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Class,
    Structure,
    Topic,
    View,
    Model,
    Extends,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "CLASS" => Some(Keyword::Class),
            "STRUCTURE" => Some(Keyword::Structure),
            "TOPIC" => Some(Keyword::Topic),
            "VIEW" => Some(Keyword::View),
            "MODEL" => Some(Keyword::Model),
            "EXTENDS" => Some(Keyword::Extends),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Keyword(Keyword),
    Ident,
    LParen,
    RParen,
    Comma,
    Dot,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
}

fn lex(src: &str) -> Vec<Token<'_>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < src.len() {
        let rest = &src[i..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch.is_whitespace() {
            i += ch.len_utf8();
            continue;
        }
        if rest.starts_with("!!") || rest.starts_with("//") {
            i += rest.find('\n').unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("/*") {
            i += rest[2..].find("*/").map(|e| e + 4).unwrap_or(rest.len());
            continue;
        }

        let start = i;
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '"' => {
                i += 1 + rest[1..].find('"').map(|e| e + 1).unwrap_or(rest.len() - 1);
                tokens.push(Token {
                    kind: TokenKind::Other,
                    text: &src[start..i],
                    start,
                    end: i,
                });
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .char_indices()
                    .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
                    .map(|(idx, _)| idx)
                    .unwrap_or(rest.len());
                i += len;
                let word = &src[start..i];
                tokens.push(Token {
                    kind: Keyword::from_word(word)
                        .map(TokenKind::Keyword)
                        .unwrap_or(TokenKind::Ident),
                    text: word,
                    start,
                    end: i,
                });
                continue;
            }
            _ => TokenKind::Other,
        };

        i += if kind == TokenKind::Other && ch.is_ascii_digit() {
            bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count()
        } else {
            ch.len_utf8()
        };
        tokens.push(Token {
            kind,
            text: &src[start..i],
            start,
            end: i,
        });
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Class,
    Structure,
    Topic,
    ViewTopic,
    Model,
}

/// A declaration header ending right before the `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    kind: HeaderKind,
    name: String,
    /// Offset of the first keyword, relative to the lexed text
    keyword_start: usize,
    /// Offset just past the declared name, relative to the lexed text
    name_end: usize,
}

/// Recursive-descent matcher over a token slice.
struct Matcher<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'a> Matcher<'_, 'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        let token = *self.peek()?;
        if token.kind != kind {
            return None;
        }
        self.pos += 1;
        Some(token)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn at_end(&self) -> bool {
        self.pos == self.tokens.len()
    }

    /// `( flag { , flag } )` with every flag in `allowed`.
    fn flags(&mut self, allowed: &[&str]) -> Option<()> {
        if !self.at(TokenKind::LParen) {
            return Some(());
        }
        self.pos += 1;
        loop {
            let flag = self.eat(TokenKind::Ident)?;
            if !allowed.contains(&flag.text) {
                return None;
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.eat(TokenKind::RParen).map(|_| ())
    }

    /// `EXTENDS Name { . Name }`
    fn extends(&mut self) -> Option<()> {
        if self.eat(TokenKind::Keyword(Keyword::Extends)).is_none() {
            return Some(());
        }
        self.eat(TokenKind::Ident)?;
        while self.eat(TokenKind::Dot).is_some() {
            self.eat(TokenKind::Ident)?;
        }
        Some(())
    }
}

fn match_at(tokens: &[Token<'_>], start: usize) -> Option<Header> {
    let mut m = Matcher { tokens, pos: start };
    let keyword = *m.peek()?;
    let keyword_start = keyword.start;

    let (kind, name) = match keyword.kind {
        TokenKind::Keyword(Keyword::View) => {
            m.pos += 1;
            m.eat(TokenKind::Keyword(Keyword::Topic))?;
            (HeaderKind::ViewTopic, m.eat(TokenKind::Ident)?)
        }
        TokenKind::Keyword(Keyword::Topic) => {
            m.pos += 1;
            let name = m.eat(TokenKind::Ident)?;
            m.flags(&["ABSTRACT", "FINAL"])?;
            m.extends()?;
            (HeaderKind::Topic, name)
        }
        TokenKind::Keyword(kw @ (Keyword::Class | Keyword::Structure)) => {
            m.pos += 1;
            let name = m.eat(TokenKind::Ident)?;
            m.flags(&["ABSTRACT", "EXTENDED", "FINAL"])?;
            m.extends()?;
            let kind = if kw == Keyword::Class {
                HeaderKind::Class
            } else {
                HeaderKind::Structure
            };
            (kind, name)
        }
        TokenKind::Keyword(Keyword::Model) => {
            m.pos += 1;
            (HeaderKind::Model, m.eat(TokenKind::Ident)?)
        }
        _ => return None,
    };

    if !m.at_end() {
        return None;
    }
    Some(Header {
        kind,
        name: name.text.to_string(),
        keyword_start,
        name_end: name.end,
    })
}

/// The innermost header that runs exactly to the end of `tokens`.
fn find_header(tokens: &[Token<'_>]) -> Option<Header> {
    for start in (0..tokens.len()).rev() {
        if !matches!(tokens[start].kind, TokenKind::Keyword(_)) {
            continue;
        }
        // `VIEW TOPIC` is matched from the VIEW.
        let follows_view = start > 0
            && tokens[start].kind == TokenKind::Keyword(Keyword::Topic)
            && tokens[start - 1].kind == TokenKind::Keyword(Keyword::View);
        if follows_view {
            continue;
        }
        if let Some(header) = match_at(tokens, start) {
            return Some(header);
        }
    }
    None
}

/// Handle textDocument/onTypeFormatting.
pub fn on_type_edits(text: &str, position: Position, ch: &str) -> Vec<TextEdit> {
    on_type_edits_dated(text, position, ch, Local::now().date_naive())
}

/// [`on_type_edits`] with a fixed date for the model banner.
pub fn on_type_edits_dated(
    text: &str,
    position: Position,
    ch: &str,
    today: NaiveDate,
) -> Vec<TextEdit> {
    if ch != "=" {
        return vec![];
    }

    let offset = to_offset(text, position);
    if offset == 0 || text.as_bytes()[offset - 1] != b'=' {
        return vec![];
    }
    let eq = offset - 1;

    let mut tail_start = eq.saturating_sub(LOOKBACK);
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let tokens = lex(&text[tail_start..eq]);
    let Some(header) = find_header(&tokens) else {
        return vec![];
    };
    tracing::debug!("Auto-closing {:?} {}", header.kind, header.name);

    let keyword_start = tail_start + header.keyword_start;
    let line_start = line_start_before(text, keyword_start);
    let indent: String = text[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();
    let name = &header.name;
    let at_cursor = Range::new(position, position);

    match header.kind {
        HeaderKind::ViewTopic => vec![TextEdit {
            range: at_cursor,
            new_text: format!(
                "\n{indent}DEPENDS ON {CARET_SENTINEL}\n{indent}\n{indent}END {name};"
            ),
        }],
        HeaderKind::Class | HeaderKind::Structure | HeaderKind::Topic => vec![TextEdit {
            range: at_cursor,
            new_text: format!("\n{indent}{CARET_SENTINEL}\n{indent}END {name};"),
        }],
        HeaderKind::Model => {
            let today = today.format("%Y-%m-%d").to_string();
            let banner_at = Position::new(position.line, 0);
            vec![
                TextEdit {
                    range: Range::new(banner_at, banner_at),
                    new_text: model_banner(&today),
                },
                TextEdit {
                    range: range_between(text, tail_start + header.name_end, offset),
                    new_text: format!(
                        " (de)\n{indent}  AT \"https://example.com\"\n{indent}  VERSION \"{today}\"\n{indent}  =\n{indent}{CARET_SENTINEL}\n{indent}END {name}."
                    ),
                },
            ]
        }
    }
}

fn model_banner(today: &str) -> String {
    format!(
        "/** !!------------------------------------------------------------------------------\n\
         \x20* !! Version    | wer | Änderung\n\
         \x20* !!------------------------------------------------------------------------------\n\
         \x20* !! {today} | abr  | Initalversion\n\
         \x20* !!==============================================================================\n\
         \x20*/\n\
         !!@ technicalContact=mailto:acme@example.com\n\
         !!@ furtherInformation=https://example.com/path/to/information\n\
         !!@ title=\"a title\"\n\
         !!@ shortDescription=\"a short description\"\n\
         !!@ tags=\"foo,bar,fubar\"\n"
    )
}

/// Remove caret markers from generated edits.
pub fn strip_caret(edits: Vec<TextEdit>) -> Vec<TextEdit> {
    edits
        .into_iter()
        .map(|mut edit| {
            edit.new_text = edit.new_text.replace(CARET_SENTINEL, "");
            edit
        })
        .collect()
}

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::error::Result;

/// Token categories of tag and output markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Comparison,
    String,
    Number,
    Id,
    DotDot,
    Pipe,
    Dot,
    Colon,
    Comma,
    OpenSquare,
    CloseSquare,
    OpenRound,
    CloseRound,
    Question,
    Dash,
    EndOfString,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Comparison => "comparison",
            Self::String => "string",
            Self::Number => "number",
            Self::Id => "id",
            Self::DotDot => "dotdot",
            Self::Pipe => "pipe",
            Self::Dot => "dot",
            Self::Colon => "colon",
            Self::Comma => "comma",
            Self::OpenSquare => "open_square",
            Self::CloseSquare => "close_square",
            Self::OpenRound => "open_round",
            Self::CloseRound => "close_round",
            Self::Question => "question",
            Self::Dash => "dash",
            Self::EndOfString => "end_of_string",
        }
    }

    fn special(c: char) -> Option<Self> {
        Some(match c {
            '|' => Self::Pipe,
            '.' => Self::Dot,
            ':' => Self::Colon,
            ',' => Self::Comma,
            '[' => Self::OpenSquare,
            ']' => Self::CloseSquare,
            '(' => Self::OpenRound,
            ')' => Self::CloseRound,
            '?' => Self::Question,
            '-' => Self::Dash,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl Token<'_> {
    /// `[:kind, "text"]`, used in "is not a valid expression" errors.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("[:{}, {:?}]", self.kind, self.text)
    }
}

static COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:==|!=|<>|<=?|>=?)").expect("valid regex"));
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\A(?:'[^']*'|"[^"]*")"#).expect("valid regex"));
static NUMBER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A-?\d+(?:\.\d+)?").expect("valid regex"));
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[a-zA-Z_][\w-]*\??").expect("valid regex"));

/// Split markup into expression tokens, ending with `EndOfString`.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &input[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        let rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let (kind, len) = if let Some(m) = COMPARISON.find(rest) {
            (TokenKind::Comparison, m.end())
        } else if is_contains_operator(rest) {
            (TokenKind::Comparison, "contains".len())
        } else if let Some(m) = STRING_LITERAL.find(rest) {
            (TokenKind::String, m.end())
        } else if let Some(m) = NUMBER_LITERAL.find(rest) {
            (TokenKind::Number, m.end())
        } else if let Some(m) = IDENTIFIER.find(rest) {
            (TokenKind::Id, m.end())
        } else if rest.starts_with("..") {
            (TokenKind::DotDot, 2)
        } else {
            let Some(c) = rest.chars().next() else {
                break;
            };
            match TokenKind::special(c) {
                Some(kind) => (kind, c.len_utf8()),
                None => return Err(Error::syntax(format!("Unexpected character {c}"))),
            }
        };

        tokens.push(Token {
            kind,
            text: &rest[..len],
        });
        pos += len;
    }

    tokens.push(Token {
        kind: TokenKind::EndOfString,
        text: "",
    });
    Ok(tokens)
}

/// `contains` only acts as an operator when whitespace follows it.
fn is_contains_operator(rest: &str) -> bool {
    rest.strip_prefix("contains")
        .and_then(|after| after.chars().next())
        .is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn filter_chain() {
        assert_eq!(
            kinds("product.title | upcase | truncate: 10, '...'"),
            vec![
                TokenKind::Id,
                TokenKind::Dot,
                TokenKind::Id,
                TokenKind::Pipe,
                TokenKind::Id,
                TokenKind::Pipe,
                TokenKind::Id,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::String,
                TokenKind::EndOfString,
            ]
        );
    }

    #[test]
    fn ranges_and_numbers() {
        let tokens = tokenize("(1..-5.5)").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["(", "1", "..", "-5.5", ")", ""]);
    }

    #[test]
    fn contains_needs_whitespace() {
        assert_eq!(
            kinds("a contains b"),
            vec![
                TokenKind::Id,
                TokenKind::Comparison,
                TokenKind::Id,
                TokenKind::EndOfString
            ]
        );
        assert_eq!(kinds("contains"), vec![TokenKind::Id, TokenKind::EndOfString]);
    }

    #[test]
    fn identifiers_with_dashes_and_question_marks() {
        let tokens = tokenize("a-b empty?").unwrap();
        assert_eq!(tokens[0].text, "a-b");
        assert_eq!(tokens[1].text, "empty?");
    }

    #[test]
    fn comparisons() {
        let tokens = tokenize("a <= b <> c").unwrap();
        assert_eq!(tokens[1].text, "<=");
        assert_eq!(tokens[3].text, "<>");
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("a & b").unwrap_err();
        assert_eq!(err.message(), "Unexpected character &");
    }

    #[test]
    fn empty_input() {
        assert_eq!(kinds("   "), vec![TokenKind::EndOfString]);
    }
}

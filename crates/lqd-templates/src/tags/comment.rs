use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Token;
use crate::tokenizer::Tokenizer;

static TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\{%-?\s*(\w+)").expect("valid regex"));
static LINE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*(\w+)").expect("valid regex"));
static INLINE_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*[^#\s]").expect("valid regex"));

/// `{% comment %}` blocks and `{% # %}` inline comments. Both render
/// nothing.
#[derive(Debug)]
pub(crate) struct Comment;

pub(crate) fn parse(
    _: &str,
    _: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    // Only nested comments and raw blocks are recognised inside a comment.
    let mut depth = 0usize;
    let mut in_raw = false;
    while let Some(token) = tokenizer.shift() {
        let caps = match &token {
            Token::Tag(raw) => TAG_NAME.captures(raw),
            Token::Line(line) => LINE_NAME.captures(line),
            Token::Text(_) | Token::Variable(_) => None,
        };
        let Some(name) = caps.map(|caps| caps[1].to_owned()) else {
            continue;
        };
        if in_raw {
            in_raw = name != "endraw";
            continue;
        }
        match name.as_str() {
            "raw" => in_raw = true,
            "comment" => depth += 1,
            "endcomment" if depth == 0 => {
                parse_context.trim_whitespace = token.raw().ends_with("-%}");
                return Ok(Box::new(Comment));
            }
            "endcomment" => depth -= 1,
            _ => {}
        }
    }
    Err(parse_context.syntax_error("tag_never_closed", &[("block_name", "comment")]))
}

pub(crate) fn parse_inline(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    if INLINE_CONTINUATION.is_match(markup) {
        return Err(parse_context.syntax_error("inline_comment_invalid", &[]));
    }
    Ok(Box::new(Comment))
}

impl Renderable for Comment {
    fn render_to_output_buffer(&self, _: &mut Context, _: &mut String) -> RenderResult {
        Ok(None)
    }

    fn is_blank(&self) -> bool {
        true
    }
}

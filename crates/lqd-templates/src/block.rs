use crate::block_body::BlockBody;
use crate::block_body::UnknownTag;
use crate::error::Error;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tokenizer::Tokenizer;

/// Deepest nesting of block tags, and of scopes during rendering.
pub const MAX_DEPTH: usize = 100;

/// Parse one section of a block called `block_name` into `body`.
///
/// Returns `None` once `end<block_name>` closes the block, or the
/// intermediate tag (such as `else`) that ended the section. End of input
/// before the closing tag is an error.
pub fn parse_body(
    block_name: &str,
    body: &mut BlockBody,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Option<UnknownTag>> {
    if parse_context.depth() >= MAX_DEPTH {
        return Err(Error::stack_level());
    }
    parse_context.increment_depth();
    let result = body.parse(tokenizer, parse_context);
    parse_context.decrement_depth();

    match result? {
        None => Err(parse_context.syntax_error("tag_never_closed", &[("block_name", block_name)])),
        Some(tag) if tag.name == format!("end{block_name}") => Ok(None),
        Some(tag) => Ok(Some(tag)),
    }
}

/// Parse a block that allows no intermediate tags.
pub fn parse_simple_block(
    block_name: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<BlockBody> {
    let mut body = BlockBody::new();
    if let Some(tag) = parse_body(block_name, &mut body, tokenizer, parse_context)? {
        return Err(unknown_tag(block_name, &tag, parse_context));
    }
    Ok(body)
}

/// Error for a tag that does not belong inside `block_name`.
#[must_use]
pub fn unknown_tag(block_name: &str, tag: &UnknownTag, parse_context: &ParseContext) -> Error {
    unknown_tag_error(&tag.name, block_name, &format!("end{block_name}"), parse_context)
}

pub(crate) fn unknown_tag_error(
    tag: &str,
    block_name: &str,
    block_delimiter: &str,
    parse_context: &ParseContext,
) -> Error {
    if tag == "else" {
        parse_context.syntax_error("unexpected_else", &[("block_name", block_name)])
    } else if tag.starts_with("end") {
        parse_context.syntax_error(
            "invalid_delimiter",
            &[
                ("tag", tag),
                ("block_name", block_name),
                ("block_delimiter", block_delimiter),
            ],
        )
    } else {
        parse_context.syntax_error("unknown_tag", &[("tag", tag)])
    }
}

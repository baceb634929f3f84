use crate::block::parse_body;
use crate::block::unknown_tag;
use crate::block_body::BlockBody;
use crate::condition::Condition;
use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;

/// `{% if %}` / `{% unless %}` with optional `elsif` and `else` branches.
#[derive(Debug)]
pub(crate) struct If {
    /// `None` marks the `else` branch.
    blocks: Vec<(Option<Condition>, BlockBody)>,
    negate_first: bool,
    blank: bool,
    line_number: Option<usize>,
}

pub(crate) fn parse_if(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    parse_branches("if", markup, false, tokenizer, parse_context)
}

pub(crate) fn parse_unless(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    parse_branches("unless", markup, true, tokenizer, parse_context)
}

fn parse_branches(
    block_name: &str,
    markup: &str,
    negate_first: bool,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let line_number = parse_context.line_number();
    let mut blocks = vec![(Some(parse_condition(markup, parse_context)?), BlockBody::new())];

    loop {
        let Some((_, body)) = blocks.last_mut() else {
            break;
        };
        let Some(tag) = parse_body(block_name, body, tokenizer, parse_context)? else {
            break;
        };
        let else_seen = blocks.last().is_some_and(|(condition, _)| condition.is_none());
        match tag.name.as_str() {
            "elsif" if !else_seen => {
                let condition = parse_condition(&tag.markup, parse_context)?;
                blocks.push((Some(condition), BlockBody::new()));
            }
            "else" if !else_seen => blocks.push((None, BlockBody::new())),
            _ => return Err(unknown_tag(block_name, &tag, parse_context)),
        }
    }

    let blank = blocks.iter().all(|(_, body)| body.is_blank());
    if blank {
        for (_, body) in &mut blocks {
            body.remove_blank_strings();
        }
    }
    Ok(Box::new(If {
        blocks,
        negate_first,
        blank,
        line_number,
    }))
}

fn parse_condition(markup: &str, parse_context: &mut ParseContext) -> Result<Condition> {
    parse_context.parse_with_selected_parser(
        markup,
        |_| Condition::parse_strict(markup),
        |parse_context| {
            Condition::parse_lax(markup).ok_or_else(|| parse_context.syntax_error("if", &[]))
        },
    )
}

impl Renderable for If {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        for (index, (condition, body)) in self.blocks.iter().enumerate() {
            let matched = match condition {
                None => true,
                Some(condition) => {
                    let truthy = condition.evaluate(context)?;
                    if index == 0 && self.negate_first {
                        !truthy
                    } else {
                        truthy
                    }
                }
            };
            if matched {
                return body.render_to_output_buffer(context, output);
            }
        }
        Ok(None)
    }

    fn is_blank(&self) -> bool {
        self.blank
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

use std::sync::LazyLock;

use regex::Regex;

use crate::block::parse_body;
use crate::block::unknown_tag;
use crate::block_body::BlockBody;
use crate::condition::Condition;
use crate::condition::Operator;
use crate::context::Context;
use crate::error::Result;
use crate::expression::Expression;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;
use crate::variable::QUOTED_FRAGMENT;

static SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({QUOTED_FRAGMENT})")).expect("valid regex"));
static WHEN_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)({QUOTED_FRAGMENT})(?:(?:\s+or\s+|\s*,\s*)({QUOTED_FRAGMENT}.*))?"
    ))
    .expect("valid regex")
});

#[derive(Debug)]
enum Branch {
    When(Vec<Condition>),
    Else,
}

/// `{% case x %}{% when a, b %}...{% else %}...{% endcase %}`.
///
/// Every matching `when` renders, in order. `else` renders when nothing
/// before it matched.
#[derive(Debug)]
pub(crate) struct Case {
    blocks: Vec<(Branch, BlockBody)>,
    blank: bool,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let Some(caps) = SYNTAX.captures(markup) else {
        return Err(parse_context.syntax_error("case", &[]));
    };
    let left = Expression::parse(&caps[1]);
    let line_number = parse_context.line_number();

    let mut blocks: Vec<(Branch, BlockBody)> = Vec::new();
    // Anything before the first `when` is parsed and dropped.
    let mut body = BlockBody::new();
    loop {
        let Some(tag) = parse_body("case", &mut body, tokenizer, parse_context)? else {
            break;
        };
        let branch = match tag.name.as_str() {
            "when" => Branch::When(when_conditions(&left, &tag.markup, parse_context)?),
            "else" => {
                if !tag.markup.trim().is_empty() {
                    return Err(parse_context.syntax_error("case_invalid_else", &[]));
                }
                Branch::Else
            }
            _ => return Err(unknown_tag("case", &tag, parse_context)),
        };
        let previous = std::mem::take(&mut body);
        if let Some(last) = blocks.last_mut() {
            last.1 = previous;
        }
        blocks.push((branch, BlockBody::new()));
    }
    if let Some(last) = blocks.last_mut() {
        last.1 = body;
    }

    let blank = blocks.iter().all(|(_, body)| body.is_blank());
    if blank {
        for (_, body) in &mut blocks {
            body.remove_blank_strings();
        }
    }
    Ok(Box::new(Case {
        blocks,
        blank,
        line_number,
    }))
}

fn when_conditions(
    left: &Expression,
    markup: &str,
    parse_context: &ParseContext,
) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    let mut rest = Some(markup.to_owned());
    while let Some(markup) = rest.take() {
        let Some(caps) = WHEN_SYNTAX.captures(&markup) else {
            return Err(parse_context.syntax_error("case_invalid_when", &[]));
        };
        conditions.push(Condition::comparison(
            left.clone(),
            Operator::Equal,
            Expression::parse(&caps[1]),
        ));
        rest = caps.get(2).map(|m| m.as_str().to_owned());
    }
    Ok(conditions)
}

impl Renderable for Case {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let mut execute_else = true;
        for (branch, body) in &self.blocks {
            match branch {
                Branch::Else => {
                    if execute_else {
                        if let Some(signal) = body.render_to_output_buffer(context, output)? {
                            return Ok(Some(signal));
                        }
                    }
                }
                Branch::When(conditions) => {
                    for condition in conditions {
                        if condition.evaluate(context)? {
                            execute_else = false;
                            if let Some(signal) = body.render_to_output_buffer(context, output)? {
                                return Ok(Some(signal));
                            }
                        }
                    }
                }
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

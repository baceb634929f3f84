use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;

/// `{% increment name %}` and `{% decrement name %}`. Counters live in the
/// first environment, apart from variables set by `assign`.
#[derive(Debug)]
pub(crate) struct Counter {
    variable: String,
    delta: i64,
    line_number: Option<usize>,
}

pub(crate) fn parse_increment(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    Ok(Box::new(Counter::new(markup, 1, parse_context)))
}

pub(crate) fn parse_decrement(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    Ok(Box::new(Counter::new(markup, -1, parse_context)))
}

impl Counter {
    fn new(markup: &str, delta: i64, parse_context: &ParseContext) -> Self {
        Self {
            variable: markup.trim().to_owned(),
            delta,
            line_number: parse_context.line_number(),
        }
    }
}

impl Renderable for Counter {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let (before, after) = context.bump_counter(&self.variable, self.delta);
        // increment shows the value before the change, decrement after it
        let shown = if self.delta > 0 { before } else { after };
        output.push_str(&shown.to_s());
        Ok(None)
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

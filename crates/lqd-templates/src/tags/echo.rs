use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;
use crate::variable::Variable;

/// `{% echo expression | filters %}`, the tag form of `{{ }}`.
#[derive(Debug)]
pub(crate) struct Echo {
    variable: Variable,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    Ok(Box::new(Echo {
        variable: Variable::parse(markup, parse_context)?,
    }))
}

impl Renderable for Echo {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        self.variable.render_to_output_buffer(context, output)
    }

    fn line_number(&self) -> Option<usize> {
        self.variable.line_number()
    }
}

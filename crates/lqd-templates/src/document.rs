use crate::block_body::BlockBody;
use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::ControlSignal;
use crate::tokenizer::Tokenizer;

/// Root of a parsed template.
#[derive(Debug, Default)]
pub struct Document {
    body: BlockBody,
}

impl Document {
    /// Parse the whole token stream. Any tag left unhandled at the top level
    /// is an error.
    pub fn parse(tokenizer: &mut Tokenizer, parse_context: &mut ParseContext) -> Result<Self> {
        let mut body = BlockBody::new();
        let result = match body.parse(tokenizer, parse_context) {
            Ok(None) => Ok(Self { body }),
            Ok(Some(tag)) => Err(match tag.name.as_str() {
                "else" | "end" => {
                    parse_context.syntax_error("unexpected_outer_tag", &[("tag", &tag.name)])
                }
                name => parse_context.syntax_error("unknown_tag", &[("tag", name)]),
            }),
            Err(err) => Err(err),
        };
        result.map_err(|err| err.with_line_number(parse_context.line_number()))
    }

    #[must_use]
    pub fn body(&self) -> &BlockBody {
        &self.body
    }

    pub fn render_to_output_buffer(
        &self,
        context: &mut Context,
        output: &mut String,
    ) -> Result<Option<ControlSignal>> {
        self.body.render_to_output_buffer(context, output)
    }
}

use std::sync::LazyLock;

use regex::Regex;

use crate::block::parse_simple_block;
use crate::block_body::BlockBody;
use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;
use crate::value::Value;

static SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\(?[\w\-\.\[\]]\)?)+").expect("valid regex"));

/// `{% capture name %}...{% endcapture %}`. Renders the body into a
/// variable instead of the output.
#[derive(Debug)]
pub(crate) struct Capture {
    to: String,
    body: BlockBody,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let Some(to) = SYNTAX.find(markup) else {
        return Err(parse_context.syntax_error("capture", &[]));
    };
    let line_number = parse_context.line_number();
    let body = parse_simple_block("capture", tokenizer, parse_context)?;
    Ok(Box::new(Capture {
        to: to.as_str().to_owned(),
        body,
        line_number,
    }))
}

impl Renderable for Capture {
    fn render_to_output_buffer(&self, context: &mut Context, _: &mut String) -> RenderResult {
        let mut captured = String::new();
        let signal =
            context.with_capture(|context| self.body.render_to_output_buffer(context, &mut captured))?;
        context.assign(self.to.clone(), Value::String(captured));
        Ok(signal)
    }

    fn is_blank(&self) -> bool {
        true
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

use crate::block::parse_simple_block;
use crate::block_body::BlockBody;
use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;

/// `{% ifchanged %}...{% endifchanged %}`. Outputs its body only when it
/// differs from the last time any `ifchanged` rendered.
#[derive(Debug)]
pub(crate) struct IfChanged {
    body: BlockBody,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    _: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let line_number = parse_context.line_number();
    let body = parse_simple_block("ifchanged", tokenizer, parse_context)?;
    Ok(Box::new(IfChanged { body, line_number }))
}

impl Renderable for IfChanged {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let mut rendered = String::new();
        let signal = self.body.render_to_output_buffer(context, &mut rendered)?;
        let registers = context.registers_mut();
        if registers.ifchanged.as_deref() != Some(rendered.as_str()) {
            output.push_str(&rendered);
            registers.ifchanged = Some(rendered);
        }
        Ok(signal)
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::render;

    #[test]
    fn only_changes_are_written() {
        assert_eq!(
            render(
                "{% for x in xs %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}",
                json!({"xs": [1, 1, 2, 2, 1]})
            ),
            "121"
        );
    }
}

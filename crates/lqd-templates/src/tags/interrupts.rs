use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::ControlSignal;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;

/// `{% break %}` and `{% continue %}`.
#[derive(Debug)]
pub(crate) struct Interrupt {
    signal: ControlSignal,
    line_number: Option<usize>,
}

pub(crate) fn parse_break(
    _: &str,
    _: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    Ok(Box::new(Interrupt {
        signal: ControlSignal::Break,
        line_number: parse_context.line_number(),
    }))
}

pub(crate) fn parse_continue(
    _: &str,
    _: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    Ok(Box::new(Interrupt {
        signal: ControlSignal::Continue,
        line_number: parse_context.line_number(),
    }))
}

impl Renderable for Interrupt {
    fn render_to_output_buffer(&self, _: &mut Context, _: &mut String) -> RenderResult {
        Ok(Some(self.signal))
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::render;
    use crate::tags::testing::render_plain;

    #[test]
    fn break_leaves_the_loop() {
        assert_eq!(
            render_plain("{% for i in (1..5) %}{% if i == 3 %}{% break %}{% endif %}{{ i }}{% endfor %}"),
            "12"
        );
    }

    #[test]
    fn continue_skips_the_rest_of_the_body() {
        assert_eq!(
            render_plain("{% for i in (1..4) %}{% if i == 2 %}{% continue %}{% endif %}{{ i }}{% endfor %}"),
            "134"
        );
    }

    #[test]
    fn break_only_leaves_the_inner_loop() {
        assert_eq!(
            render(
                "{% for a in xs %}{% for b in xs %}{% if b > a %}{% break %}{% endif %}{{ a }}{{ b }} {% endfor %}{% endfor %}",
                json!({"xs": [1, 2]})
            ),
            "11 21 22 "
        );
    }

    #[test]
    fn break_outside_a_loop_stops_the_template() {
        assert_eq!(render_plain("a{% break %}b"), "a");
    }
}

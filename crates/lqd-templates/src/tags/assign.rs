use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::resource_limits::assign_score_of;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;
use crate::variable::Variable;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)((?:\(?[\w\-\.\[\]]\)?)+)\s*=\s*(.*)\s*").expect("valid regex")
});

/// `{% assign name = value | filters %}`. Sets a variable in the outermost
/// scope.
#[derive(Debug)]
pub(crate) struct Assign {
    to: String,
    from: Variable,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let Some(caps) = SYNTAX.captures(markup) else {
        return Err(parse_context.syntax_error("assign", &[]));
    };
    Ok(Box::new(Assign {
        to: caps[1].to_owned(),
        from: Variable::parse(&caps[2], parse_context)?,
        line_number: parse_context.line_number(),
    }))
}

impl Renderable for Assign {
    fn render_to_output_buffer(&self, context: &mut Context, _: &mut String) -> RenderResult {
        let value = self.from.render_value(context)?;
        let score = assign_score_of(&value);
        context.assign(self.to.clone(), value);
        context.resource_limits_mut().increment_assign_score(score)?;
        Ok(None)
    }

    fn is_blank(&self) -> bool {
        true
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::parse_error;
    use crate::tags::testing::render;
    use crate::tags::testing::render_plain;

    #[test]
    fn assigns_with_filters() {
        assert_eq!(
            render(
                "{% assign name = user.first | upcase %}Hi {{ name }}",
                json!({"user": {"first": "ann"}})
            ),
            "Hi ANN"
        );
    }

    #[test]
    fn assign_survives_blocks() {
        assert_eq!(
            render_plain("{% for i in (1..3) %}{% assign last = i %}{% endfor %}{{ last }}"),
            "3"
        );
    }

    #[test]
    fn hyphenated_and_indexed_names() {
        assert_eq!(render_plain("{% assign a-b = 'x' %}{{ a-b }}"), "x");
    }

    #[test]
    fn missing_equals() {
        assert_eq!(
            parse_error("{% assign nothing %}"),
            "Liquid syntax error (line 1): Syntax Error in 'assign' - Valid syntax: assign [var] = [source]"
        );
    }
}

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::context::Scope;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::expression::Expression;
use crate::parse_context::ParseContext;
use crate::parse_context::ParseOptions;
use crate::partial_cache::load_partial;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tags::attributes;
use crate::tags::evaluate_attributes;
use crate::tokenizer::Tokenizer;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"((?:{QUOTED_FRAGMENT})+)(\s+(?:with|for)\s+((?:{QUOTED_FRAGMENT})+))?(\s+(?:as)\s+([\w-]+))?"
    ))
    .expect("valid regex")
});

/// `{% include 'name' with value as alias, key: value %}`. Renders a
/// partial sharing the caller's variables.
#[derive(Debug)]
pub(crate) struct Include {
    template_name: Expression,
    variable_name: Option<Expression>,
    alias: Option<String>,
    attributes: Vec<(String, Expression)>,
    environment: Arc<Environment>,
    options: ParseOptions,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let Some(caps) = SYNTAX.captures(markup) else {
        return Err(parse_context.syntax_error("include", &[]));
    };
    Ok(Box::new(Include {
        template_name: Expression::parse(&caps[1]),
        variable_name: caps.get(3).map(|m| Expression::parse(m.as_str())),
        alias: caps.get(5).map(|m| m.as_str().to_owned()),
        attributes: attributes(markup),
        environment: parse_context.environment().clone(),
        options: parse_context.options().clone(),
        line_number: parse_context.line_number(),
    }))
}

impl Renderable for Include {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let template_name = context.evaluate(&self.template_name)?;
        if !template_name.is_truthy() {
            return Err(Error::argument(
                context
                    .environment()
                    .locale()
                    .translate("errors.argument.include", &[]),
            ));
        }
        let template_name = template_name.to_s();
        let partial = load_partial(context, &template_name, &self.environment, &self.options)?;

        let context_variable_name = self.alias.clone().unwrap_or_else(|| {
            template_name
                .rsplit('/')
                .next()
                .unwrap_or(&template_name)
                .to_owned()
        });
        let variable = match &self.variable_name {
            Some(expression) => context.evaluate(expression)?,
            None => context.find_variable_with(&template_name, false)?,
        };

        let saved_name = context.set_template_name(partial.name().map(str::to_owned));
        let saved_partial = context.set_partial(true);

        let result = context.stack(Scope::default(), |context| {
            for (key, value) in evaluate_attributes(&self.attributes, context)? {
                context.set(key, value);
            }
            if let Value::Array(items) = variable {
                for item in items {
                    context.set(context_variable_name.clone(), item);
                    if let Some(signal) = partial.root().render_to_output_buffer(context, output)? {
                        return Ok(Some(signal));
                    }
                }
                Ok(None)
            } else {
                context.set(context_variable_name, variable);
                partial.root().render_to_output_buffer(context, output)
            }
        });

        context.set_template_name(saved_name);
        context.set_partial(saved_partial);
        result
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    fn tag_name(&self) -> Option<&str> {
        Some("include")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::render_with_partials;

    #[test]
    fn partial_sees_outer_variables() {
        assert_eq!(
            render_with_partials(
                "{% include 'greeting' %}",
                &[("greeting", "Hello {{ name }}")],
                json!({"name": "Ann"})
            ),
            "Hello Ann"
        );
    }

    #[test]
    fn assigns_leak_out() {
        assert_eq!(
            render_with_partials(
                "{% include 'setter' %}{{ value }}",
                &[("setter", "{% assign value = 'set' %}")],
                json!({})
            ),
            "set"
        );
    }

    #[test]
    fn with_and_alias() {
        assert_eq!(
            render_with_partials(
                "{% include 'product' with item %}|{% include 'product' with item as p %}",
                &[("product", "{{ product.title }}{{ p.title }}")],
                json!({"item": {"title": "Hat"}})
            ),
            "Hat|Hat"
        );
    }

    #[test]
    fn for_array_renders_each_item() {
        assert_eq!(
            render_with_partials(
                "{% include 'item' for items %}",
                &[("item", "[{{ item }}]")],
                json!({"items": [1, 2]})
            ),
            "[1][2]"
        );
    }

    #[test]
    fn variable_named_after_last_path_segment() {
        assert_eq!(
            render_with_partials(
                "{% include 'shop/card', color: 'red' %}",
                &[("shop/card", "{{ card }}-{{ color }}")],
                json!({"shop/card": "c"})
            ),
            "c-red"
        );
    }

    #[test]
    fn dynamic_name() {
        assert_eq!(
            render_with_partials(
                "{% include which %}",
                &[("b", "B")],
                json!({"which": "b"})
            ),
            "B"
        );
    }

    #[test]
    fn missing_partial_is_recovered() {
        assert_eq!(
            render_with_partials("a{% include 'nope' %}b", &[], json!({})),
            "aLiquid error (line 1): No such template 'nope'b"
        );
    }

    #[test]
    fn nil_name() {
        assert_eq!(
            render_with_partials("{% include nothing %}", &[], json!({})),
            "Liquid error (line 1): Argument error in tag 'include' - Illegal template name"
        );
    }

    #[test]
    fn errors_inside_partial_name_the_partial() {
        assert_eq!(
            render_with_partials(
                "{% include 'bad' %}",
                &[("bad", "x\n{{ 1 | divided_by: 0 }}")],
                json!({})
            ),
            "x\nLiquid error (bad line 2): divided by 0"
        );
    }
}

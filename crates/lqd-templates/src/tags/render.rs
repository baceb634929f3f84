use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::drop::ForloopDrop;
use crate::environment::Environment;
use crate::error::Result;
use crate::expression::Expression;
use crate::parse_context::ParseContext;
use crate::parse_context::ParseOptions;
use crate::partial_cache::load_partial;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tags::attributes;
use crate::tags::evaluate_attributes;
use crate::template::Template;
use crate::tokenizer::Tokenizer;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;
use crate::variable::QUOTED_STRING;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"((?:{QUOTED_STRING})+)(\s+(with|for)\s+((?:{QUOTED_FRAGMENT})+))?(\s+(?:as)\s+([\w-]+))?"
    ))
    .expect("valid regex")
});

/// `{% render 'name' with value as alias, key: value %}` or
/// `{% render 'name' for items as item %}`.
///
/// The partial runs in an isolated scope: it sees only what is passed to
/// it, and nothing it assigns leaks out. `include` is disabled inside.
#[derive(Debug)]
pub(crate) struct Render {
    template_name: String,
    variable_name: Option<Expression>,
    is_for_loop: bool,
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
    let caps = SYNTAX.captures(markup);
    let template_name = caps.as_ref().and_then(|caps| {
        match Expression::parse(&caps[1]) {
            Expression::Literal(Value::String(name)) => Some(name),
            _ => None,
        }
    });
    let (Some(caps), Some(template_name)) = (caps, template_name) else {
        return Err(parse_context.syntax_error("render", &[]));
    };

    Ok(Box::new(Render {
        template_name,
        variable_name: caps.get(4).map(|m| Expression::parse(m.as_str())),
        is_for_loop: caps.get(3).is_some_and(|m| m.as_str() == "for"),
        alias: caps.get(6).map(|m| m.as_str().to_owned()),
        attributes: attributes(markup),
        environment: parse_context.environment().clone(),
        options: parse_context.options().clone(),
        line_number: parse_context.line_number(),
    }))
}

impl Render {
    fn render_partial(
        &self,
        context: &mut Context,
        output: &mut String,
        partial: &Template,
        variable: Option<Value>,
        forloop: Option<&Arc<ForloopDrop>>,
    ) -> Result<()> {
        let attributes = evaluate_attributes(&self.attributes, context)?;
        let variable_name = self.alias.as_deref().unwrap_or(&self.template_name);
        context.with_isolated_scope(|context| {
            context.set_template_name(Some(self.template_name.clone()));
            context.set_partial(true);
            if let Some(forloop) = forloop {
                context.set("forloop", Value::Drop(forloop.clone()));
            }
            for (key, value) in attributes {
                context.set(key, value);
            }
            if let Some(variable) = variable.filter(|value| !value.is_nil()) {
                context.set(variable_name, variable);
            }
            partial.root().render_to_output_buffer(context, output)?;
            Ok(())
        })?;
        if let Some(forloop) = forloop {
            forloop.increment();
        }
        Ok(())
    }
}

impl Renderable for Render {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        context.with_disabled_tags(&["include"], |context| {
            let partial = load_partial(context, &self.template_name, &self.environment, &self.options)?;
            let variable = match &self.variable_name {
                Some(expression) => Some(context.evaluate(expression)?),
                None => None,
            };

            match variable {
                Some(collection) if self.is_for_loop && collection.is_iterable() => {
                    let items: Vec<Value> = collection.items().collect();
                    let forloop = Arc::new(ForloopDrop::new(
                        self.template_name.clone(),
                        items.len(),
                        None,
                    ));
                    for item in items {
                        self.render_partial(context, output, &partial, Some(item), Some(&forloop))?;
                    }
                }
                variable => self.render_partial(context, output, &partial, variable, None)?,
            }
            Ok(None)
        })
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    fn tag_name(&self) -> Option<&str> {
        Some("render")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::parse_error;
    use crate::tags::testing::render_with_partials;

    #[test]
    fn partial_scope_is_isolated() {
        assert_eq!(
            render_with_partials(
                "{% assign secret = 's' %}{% render 'peek' %}{{ inner }}",
                &[("peek", "[{{ secret }}]{% assign inner = 'i' %}")],
                json!({})
            ),
            "[]"
        );
    }

    #[test]
    fn passes_arguments() {
        assert_eq!(
            render_with_partials(
                "{% render 'card', title: product.title, price: 3 %}",
                &[("card", "{{ title }}:{{ price }}")],
                json!({"product": {"title": "Hat"}})
            ),
            "Hat:3"
        );
    }

    #[test]
    fn with_and_alias() {
        assert_eq!(
            render_with_partials(
                "{% render 'product' with item %}|{% render 'product' with item as p %}",
                &[("product", "{{ product.title }}{{ p.title }}")],
                json!({"item": {"title": "Hat"}})
            ),
            "Hat|Hat"
        );
    }

    #[test]
    fn for_loop_over_collection() {
        assert_eq!(
            render_with_partials(
                "{% render 'row' for rows as row %}",
                &[("row", "{{ forloop.index }}:{{ row }}{% unless forloop.last %},{% endunless %}")],
                json!({"rows": ["a", "b", "c"]})
            ),
            "1:a,2:b,3:c"
        );
    }

    #[test]
    fn include_is_disabled_inside_render() {
        assert_eq!(
            render_with_partials(
                "{% render 'outer' %}",
                &[("outer", "{% include 'inner' %}"), ("inner", "x")],
                json!({})
            ),
            "Liquid error (outer line 1): include usage is not allowed in this context"
        );
    }

    #[test]
    fn nested_render_is_allowed() {
        assert_eq!(
            render_with_partials(
                "{% render 'outer' %}",
                &[("outer", "<{% render 'inner' %}>"), ("inner", "x")],
                json!({})
            ),
            "<x>"
        );
    }

    #[test]
    fn counters_are_shared_across_partials() {
        assert_eq!(
            render_with_partials(
                "{% render 'count' %}{% render 'count' %}",
                &[("count", "{% cycle 'a', 'b' %}")],
                json!({})
            ),
            "ab"
        );
    }

    #[test]
    fn name_must_be_a_string_literal() {
        assert_eq!(
            parse_error("{% render name %}"),
            "Liquid syntax error (line 1): Syntax error in tag 'render' - Template name must be a quoted string"
        );
    }
}

//! The standard tag library.

mod assign;
mod capture;
mod case;
mod comment;
mod counters;
mod cycle;
mod echo;
mod for_loop;
mod if_tag;
mod ifchanged;
mod include;
mod interrupts;
mod raw;
mod render;
mod tablerow;

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::expression::Expression;
use crate::tag::TagRegistry;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

/// `key: value` pairs trailing the markup of `for`, `tablerow`, `include`
/// and `render`.
static TAG_ATTRIBUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(\w[\w-]*)\s*:\s*({QUOTED_FRAGMENT})")).expect("valid regex")
});

/// Registry with every standard tag.
#[must_use]
pub fn builtins() -> TagRegistry {
    let mut tags = TagRegistry::new();
    tags.register("assign", assign::parse);
    tags.register("break", interrupts::parse_break);
    tags.register("capture", capture::parse);
    tags.register("case", case::parse);
    tags.register("comment", comment::parse);
    tags.register("#", comment::parse_inline);
    tags.register("continue", interrupts::parse_continue);
    tags.register("cycle", cycle::parse);
    tags.register("decrement", counters::parse_decrement);
    tags.register("echo", echo::parse);
    tags.register("for", for_loop::parse);
    tags.register("if", if_tag::parse_if);
    tags.register("ifchanged", ifchanged::parse);
    tags.register("include", include::parse);
    tags.register("increment", counters::parse_increment);
    tags.register("raw", raw::parse);
    tags.register("render", render::parse);
    tags.register("tablerow", tablerow::parse);
    tags.register("unless", if_tag::parse_unless);
    tags
}

fn attributes(markup: &str) -> Vec<(String, Expression)> {
    TAG_ATTRIBUTES
        .captures_iter(markup)
        .map(|caps| (caps[1].to_owned(), Expression::parse(&caps[2])))
        .collect()
}

fn evaluate_attributes(
    attributes: &[(String, Expression)],
    context: &mut Context,
) -> Result<Vec<(String, Value)>> {
    attributes
        .iter()
        .map(|(key, expression)| Ok((key.clone(), context.evaluate(expression)?)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_standard_tag_is_registered() {
        insta::assert_snapshot!(
            builtins().names().join(" "),
            @"# assign break capture case comment continue cycle decrement echo for if ifchanged include increment raw render tablerow unless"
        );
    }

    #[test]
    fn attribute_scan() {
        let attrs = attributes("product limit: 2, offset:x.y cols : 'a'");
        let keys: Vec<&str> = attrs.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["limit", "offset", "cols"]);
        assert_eq!(attrs[2].1, Expression::Literal(Value::from("a")));
    }
}

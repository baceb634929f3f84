use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::expression::Expression;
use crate::parse_context::ParseContext;
use crate::quotes::split_unquoted;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

static NAMED_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)\A({QUOTED_FRAGMENT})\s*:\s*(.*)")).expect("valid regex")
});
static SIMPLE_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\A(?:{QUOTED_FRAGMENT})+")).expect("valid regex"));
static VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\s*({QUOTED_FRAGMENT})\s*")).expect("valid regex"));

#[derive(Debug)]
enum Group {
    Named(Expression),
    /// Unnamed cycles are grouped by their values' markup.
    Anonymous(String),
}

/// `{% cycle 'a', 'b' %}` or `{% cycle group: 'a', 'b' %}`. Each render
/// emits the next value of its group.
#[derive(Debug)]
pub(crate) struct Cycle {
    group: Group,
    values: Vec<Expression>,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    _: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let markup = markup.trim_start();
    let (group, values) = if let Some(caps) = NAMED_SYNTAX.captures(markup) {
        let (_, values) = variables_from(&caps[2]);
        (Group::Named(Expression::parse(&caps[1])), values)
    } else if SIMPLE_SYNTAX.is_match(markup) {
        let (markups, values) = variables_from(markup);
        (Group::Anonymous(markups.join(",")), values)
    } else {
        return Err(parse_context.syntax_error("cycle", &[]));
    };
    Ok(Box::new(Cycle {
        group,
        values,
        line_number: parse_context.line_number(),
    }))
}

fn variables_from(markup: &str) -> (Vec<String>, Vec<Expression>) {
    split_unquoted(markup, ',')
        .into_iter()
        .filter_map(|part| VALUE.captures(part))
        .map(|caps| (caps[1].to_owned(), Expression::parse(&caps[1])))
        .unzip()
}

impl Renderable for Cycle {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let key = match &self.group {
            Group::Named(name) => context.evaluate(name)?.to_s(),
            Group::Anonymous(markup) => markup.clone(),
        };
        let iteration = context.registers().cycle.get(&key).copied().unwrap_or(0);

        if let Some(expression) = self.values.get(iteration) {
            match context.evaluate(expression)? {
                Value::Array(items) => output.push_str(&Value::join(&items, "")),
                value => output.push_str(&value.to_s()),
            }
        }

        let next = if iteration + 1 >= self.values.len() {
            0
        } else {
            iteration + 1
        };
        context.registers_mut().cycle.insert(key, next);
        Ok(None)
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

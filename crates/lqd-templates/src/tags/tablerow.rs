use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::block::parse_simple_block;
use crate::block_body::BlockBody;
use crate::context::Context;
use crate::context::Scope;
use crate::drop::TablerowloopDrop;
use crate::error::Error;
use crate::error::Result;
use crate::expression::Expression;
use crate::parse_context::ParseContext;
use crate::tag::ControlSignal;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tags::attributes;
use crate::tokenizer::Tokenizer;
use crate::utils::leading_integer;
use crate::utils::slice_collection;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(\w+)\s+in\s+((?:{QUOTED_FRAGMENT})+)")).expect("valid regex")
});

/// `{% tablerow item in collection cols: n limit: n offset: n %}`. Renders
/// HTML table rows and cells around the body.
#[derive(Debug)]
pub(crate) struct TableRow {
    variable_name: String,
    collection_name: Expression,
    attributes: Vec<(String, Expression)>,
    body: BlockBody,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let Some(caps) = SYNTAX.captures(markup) else {
        return Err(parse_context.syntax_error("table_row", &[]));
    };
    let line_number = parse_context.line_number();
    let variable_name = caps[1].to_owned();
    let collection_name = Expression::parse(&caps[2]);
    let body = parse_simple_block("tablerow", tokenizer, parse_context)?;
    Ok(Box::new(TableRow {
        variable_name,
        collection_name,
        attributes: attributes(markup),
        body,
        line_number,
    }))
}

impl TableRow {
    fn attribute(&self, context: &mut Context, name: &str) -> Result<Option<i64>> {
        let Some((_, expression)) = self.attributes.iter().find(|(key, _)| key == name) else {
            return Ok(None);
        };
        to_integer(&context.evaluate(expression)?).map(Some)
    }
}

/// Attribute conversion for table rows: nil counts as zero and strings use
/// their leading digits.
fn to_integer(value: &Value) -> Result<i64> {
    match value {
        Value::Nil => Ok(0),
        Value::Integer(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) => Ok(f.trunc() as i64),
        Value::String(s) => Ok(leading_integer(s)),
        _ => Err(Error::argument("invalid integer")),
    }
}

impl Renderable for TableRow {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let collection = context.evaluate(&self.collection_name)?;
        if !collection.is_truthy() {
            return Ok(None);
        }

        let from = self.attribute(context, "offset")?.unwrap_or(0);
        let to = self
            .attribute(context, "limit")?
            .map(|limit| limit.saturating_add(from));
        let cols = self.attribute(context, "cols")?.unwrap_or(0);
        let segment = slice_collection(&collection, from, to);
        let length = segment.len();

        output.push_str("<tr class=\"row1\">\n");
        let tablerowloop = Arc::new(TablerowloopDrop::new(length, cols));
        context.stack(Scope::default(), |context| {
            context.set("tablerowloop", Value::Drop(tablerowloop.clone()));
            for item in segment {
                context.set(self.variable_name.clone(), item);
                output.push_str(&format!("<td class=\"col{}\">", tablerowloop.col()));
                let signal = self.body.render_to_output_buffer(context, output)?;
                output.push_str("</td>");

                if tablerowloop.col_last() && !tablerowloop.is_last() {
                    output.push_str(&format!("</tr>\n<tr class=\"row{}\">", tablerowloop.row() + 1));
                }
                tablerowloop.increment();
                if signal == Some(ControlSignal::Break) {
                    break;
                }
            }
            Ok(())
        })?;
        output.push_str("</tr>\n");
        Ok(None)
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
    fn rows_wrap_at_cols() {
        assert_eq!(
            render_plain("{% tablerow n in (1..5) cols: 2 %}{{ n }}{% endtablerow %}"),
            concat!(
                "<tr class=\"row1\">\n",
                "<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n",
                "<tr class=\"row2\"><td class=\"col1\">3</td><td class=\"col2\">4</td></tr>\n",
                "<tr class=\"row3\"><td class=\"col1\">5</td></tr>\n",
            )
        );
    }

    #[test]
    fn single_row_without_cols() {
        assert_eq!(
            render("{% tablerow x in xs %}{{ x }}{% endtablerow %}", json!({"xs": ["a", "b"]})),
            "<tr class=\"row1\">\n<td class=\"col1\">a</td><td class=\"col2\">b</td></tr>\n"
        );
    }

    #[test]
    fn tablerowloop_properties() {
        assert_eq!(
            render_plain(
                "{% tablerow n in (1..3) cols: 3 %}{{ tablerowloop.index }}{{ tablerowloop.col_first }}{% endtablerow %}"
            ),
            "<tr class=\"row1\">\n<td class=\"col1\">1true</td><td class=\"col2\">2false</td><td class=\"col3\">3false</td></tr>\n"
        );
    }

    #[test]
    fn limit_and_offset() {
        assert_eq!(
            render_plain("{% tablerow n in (1..9) limit: 2 offset: 3 %}{{ n }}{% endtablerow %}"),
            "<tr class=\"row1\">\n<td class=\"col1\">4</td><td class=\"col2\">5</td></tr>\n"
        );
    }

    #[test]
    fn nil_collection_renders_nothing() {
        assert_eq!(render_plain("{% tablerow x in missing %}{{ x }}{% endtablerow %}"), "");
    }

    #[test]
    fn empty_collection_renders_an_empty_row() {
        assert_eq!(
            render("{% tablerow x in xs %}{{ x }}{% endtablerow %}", json!({"xs": []})),
            "<tr class=\"row1\">\n</tr>\n"
        );
    }

    #[test]
    fn invalid_cols_is_a_render_error() {
        assert_eq!(
            render(
                "{% tablerow x in xs cols: c %}{{ x }}{% endtablerow %}",
                json!({"xs": [1], "c": [1]})
            ),
            "Liquid error (line 1): invalid integer"
        );
    }

    #[test]
    fn invalid_syntax() {
        assert!(parse_error("{% tablerow x %}{% endtablerow %}").contains("table_row loop"));
    }
}

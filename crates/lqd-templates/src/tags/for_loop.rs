use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::block::parse_body;
use crate::block::unknown_tag;
use crate::block_body::BlockBody;
use crate::context::Context;
use crate::context::Scope;
use crate::drop::ForloopDrop;
use crate::error::Result;
use crate::expression::Expression;
use crate::lexer::TokenKind;
use crate::parse_context::ParseContext;
use crate::parser::Parser;
use crate::tag::ControlSignal;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tags::attributes;
use crate::tokenizer::Tokenizer;
use crate::utils::slice_collection;
use crate::utils::to_integer;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\A([\w-]+)\s+in\s+((?:{QUOTED_FRAGMENT})+)\s*(reversed)?"
    ))
    .expect("valid regex")
});

/// Where a loop starts in its collection.
#[derive(Debug, Clone, PartialEq)]
enum Offset {
    Expression(Expression),
    /// `offset: continue` resumes where the previous loop of the same name
    /// stopped.
    Continue,
}

#[derive(Debug)]
struct Header {
    variable_name: String,
    collection_name: Expression,
    name: String,
    reversed: bool,
    limit: Option<Expression>,
    offset: Option<Offset>,
}

/// `{% for item in collection limit: n offset: m reversed %}` with an
/// optional `{% else %}` for empty collections.
#[derive(Debug)]
pub(crate) struct For {
    header: Header,
    for_block: BlockBody,
    else_block: Option<BlockBody>,
    line_number: Option<usize>,
}

pub(crate) fn parse(
    _: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    let line_number = parse_context.line_number();
    let header = parse_context.parse_with_selected_parser(
        markup,
        |parse_context| strict_parse(markup, parse_context),
        |parse_context| lax_parse(markup).ok_or_else(|| parse_context.syntax_error("for", &[])),
    )?;

    let mut for_block = BlockBody::new();
    let mut else_block = None;
    if let Some(tag) = parse_body("for", &mut for_block, tokenizer, parse_context)? {
        if tag.name != "else" {
            return Err(unknown_tag("for", &tag, parse_context));
        }
        let mut body = BlockBody::new();
        if let Some(tag) = parse_body("for", &mut body, tokenizer, parse_context)? {
            return Err(unknown_tag("for", &tag, parse_context));
        }
        else_block = Some(body);
    }

    if for_block.is_blank() && else_block.as_ref().is_none_or(BlockBody::is_blank) {
        for_block.remove_blank_strings();
        if let Some(body) = else_block.as_mut() {
            body.remove_blank_strings();
        }
    }

    Ok(Box::new(For {
        header,
        for_block,
        else_block,
        line_number,
    }))
}

fn strict_parse(markup: &str, parse_context: &ParseContext) -> Result<Header> {
    let mut parser = Parser::new(markup)?;
    let variable_name = parser.consume(TokenKind::Id)?.to_owned();
    if !parser.id("in") {
        return Err(parse_context.syntax_error("for_invalid_in", &[]));
    }
    let (collection_name, collection_markup) = parser.expression_with_markup()?;
    let reversed = parser.id("reversed");

    let mut limit = None;
    let mut offset = None;
    while parser.look(TokenKind::Comma, 0) || parser.look(TokenKind::Id, 0) {
        parser.consume_if(TokenKind::Comma);
        let attribute = if parser.id("limit") {
            "limit"
        } else if parser.id("offset") {
            "offset"
        } else {
            return Err(parse_context.syntax_error("for_invalid_attribute", &[]));
        };
        parser.consume(TokenKind::Colon)?;
        let (expression, markup) = parser.expression_with_markup()?;
        if attribute == "limit" {
            limit = Some(expression);
        } else if markup == "continue" {
            offset = Some(Offset::Continue);
        } else {
            offset = Some(Offset::Expression(expression));
        }
    }
    parser.finish()?;

    Ok(Header {
        name: format!("{variable_name}-{collection_markup}"),
        variable_name,
        collection_name,
        reversed,
        limit,
        offset,
    })
}

fn lax_parse(markup: &str) -> Option<Header> {
    let caps = SYNTAX.captures(markup)?;
    let variable_name = caps[1].to_owned();
    let collection_markup = &caps[2];

    let mut limit = None;
    let mut offset = None;
    for (key, expression) in attributes(markup) {
        match key.as_str() {
            "limit" => limit = Some(expression),
            "offset" if expression == Expression::parse("continue") => {
                offset = Some(Offset::Continue);
            }
            "offset" => offset = Some(Offset::Expression(expression)),
            _ => {}
        }
    }

    Some(Header {
        name: format!("{variable_name}-{collection_markup}"),
        variable_name,
        collection_name: Expression::parse(collection_markup),
        reversed: caps.get(3).is_some(),
        limit,
        offset,
    })
}

impl For {
    fn collection_segment(&self, context: &mut Context) -> Result<Vec<Value>> {
        let header = &self.header;
        let from = match &header.offset {
            Some(Offset::Continue) => context
                .registers()
                .for_offsets
                .get(&header.name)
                .map_or(0, |offset| i64::try_from(*offset).unwrap_or(i64::MAX)),
            Some(Offset::Expression(expression)) => integer_or_zero(&context.evaluate(expression)?)?,
            None => 0,
        };
        let collection = context.evaluate(&header.collection_name)?;
        let to = match &header.limit {
            Some(limit) => match context.evaluate(limit)? {
                Value::Nil => None,
                value => Some(to_integer(&value)?.saturating_add(from)),
            },
            None => None,
        };

        let mut segment = slice_collection(&collection, from, to);
        if header.reversed {
            segment.reverse();
        }
        let stopped_at = usize::try_from(from).unwrap_or(0) + segment.len();
        context
            .registers_mut()
            .for_offsets
            .insert(header.name.clone(), stopped_at);
        Ok(segment)
    }

    fn render_segment(
        &self,
        context: &mut Context,
        output: &mut String,
        segment: Vec<Value>,
    ) -> RenderResult {
        let parentloop = context.registers().for_stack.last().cloned();
        let forloop = Arc::new(ForloopDrop::new(
            self.header.name.clone(),
            segment.len(),
            parentloop,
        ));
        context.registers_mut().for_stack.push(forloop.clone());

        let result = context.stack(Scope::default(), |context| {
            context.set("forloop", Value::Drop(forloop.clone()));
            for item in segment {
                context.set(self.header.variable_name.clone(), item);
                let signal = self.for_block.render_to_output_buffer(context, output)?;
                forloop.increment();
                if signal == Some(ControlSignal::Break) {
                    break;
                }
            }
            Ok(())
        });

        context.registers_mut().for_stack.pop();
        result.map(|()| None)
    }
}

fn integer_or_zero(value: &Value) -> Result<i64> {
    if value.is_nil() {
        Ok(0)
    } else {
        to_integer(value)
    }
}

impl Renderable for For {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        let segment = self.collection_segment(context)?;
        if segment.is_empty() {
            return match &self.else_block {
                Some(body) => body.render_to_output_buffer(context, output),
                None => Ok(None),
            };
        }
        self.render_segment(context, output, segment)
    }

    fn is_blank(&self) -> bool {
        self.for_block.is_blank() && self.else_block.as_ref().is_none_or(BlockBody::is_blank)
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tags::testing::parse_error;
    use crate::tags::testing::parse_strict;
    use crate::tags::testing::render;
    use crate::tags::testing::render_plain;

    mod iteration {
        use super::*;

        #[test]
        fn arrays_and_ranges() {
            assert_eq!(
                render("{% for x in xs %}{{ x }},{% endfor %}", json!({"xs": [1, 2, 3]})),
                "1,2,3,"
            );
            assert_eq!(render_plain("{% for i in (1..4) %}{{ i }}{% endfor %}"), "1234");
        }

        #[test]
        fn dynamic_range() {
            assert_eq!(
                render("{% for i in (1..n) %}{{ i }}{% endfor %}", json!({"n": 3})),
                "123"
            );
        }

        #[test]
        fn objects_iterate_as_pairs() {
            assert_eq!(
                render(
                    "{% for pair in h %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
                    json!({"h": {"a": 1, "b": 2}})
                ),
                "a=1;b=2;"
            );
        }

        #[test]
        fn else_for_empty_collections() {
            assert_eq!(
                render("{% for x in xs %}{{ x }}{% else %}none{% endfor %}", json!({"xs": []})),
                "none"
            );
            assert_eq!(
                render_plain("{% for x in missing %}{{ x }}{% else %}none{% endfor %}"),
                "none"
            );
        }

        #[test]
        fn loop_variable_does_not_leak() {
            assert_eq!(
                render("{% for x in xs %}{% endfor %}[{{ x }}]", json!({"xs": [1]})),
                "[]"
            );
        }

        #[test]
        fn string_collection_is_one_item() {
            assert_eq!(
                render("{% for x in s %}<{{ x }}>{% endfor %}", json!({"s": "abc"})),
                "<abc>"
            );
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn limit_and_offset() {
            assert_eq!(
                render(
                    "{% for x in xs limit: 2 offset: 1 %}{{ x }}{% endfor %}",
                    json!({"xs": [1, 2, 3, 4, 5]})
                ),
                "23"
            );
        }

        #[test]
        fn reversed() {
            assert_eq!(render_plain("{% for i in (1..3) reversed %}{{ i }}{% endfor %}"), "321");
        }

        #[test]
        fn offset_continue() {
            assert_eq!(
                render(
                    "{% for x in xs limit: 2 %}{{ x }}{% endfor %}|{% for x in xs offset: continue %}{{ x }}{% endfor %}",
                    json!({"xs": [1, 2, 3, 4, 5]})
                ),
                "12|345"
            );
        }

        #[test]
        fn string_limit() {
            assert_eq!(
                render(
                    "{% for x in xs limit: n %}{{ x }}{% endfor %}",
                    json!({"xs": [1, 2, 3], "n": "2"})
                ),
                "12"
            );
        }

        #[test]
        fn strict_attributes_with_commas() {
            let template =
                parse_strict("{% for x in (1..9) limit: 3, offset: 2 %}{{ x }}{% endfor %}")
                    .unwrap();
            assert_eq!(template.render(crate::value::Object::new()).unwrap(), "345");
        }

        #[test]
        fn strict_unknown_attribute() {
            let err = parse_strict("{% for x in xs cols: 3 %}{% endfor %}").unwrap_err();
            assert_eq!(
                err.message(),
                "Invalid attribute in for loop. Valid attributes are limit and offset"
            );
        }

        #[test]
        fn strict_requires_in() {
            let err = parse_strict("{% for x xs %}{% endfor %}").unwrap_err();
            assert_eq!(err.message(), "For loops require an 'in' clause");
        }
    }

    mod forloop {
        use super::*;

        #[test]
        fn loop_properties() {
            assert_eq!(
                render(
                    "{% for x in xs %}{{ forloop.index }}/{{ forloop.rindex0 }}/{{ forloop.first }}/{{ forloop.last }} {% endfor %}",
                    json!({"xs": ["a", "b"]})
                ),
                "1/1/true/false 2/0/false/true "
            );
        }

        #[test]
        fn parentloop() {
            assert_eq!(
                render_plain(
                    "{% for i in (1..2) %}{% for j in (1..2) %}{{ forloop.parentloop.index }}{{ j }} {% endfor %}{% endfor %}"
                ),
                "11 12 21 22 "
            );
        }

        #[test]
        fn length_and_name() {
            assert_eq!(
                render_plain("{% for i in (1..3) %}{{ forloop.length }}{{ forloop.name }}{% endfor %}"),
                "3i-(1..3)3i-(1..3)3i-(1..3)"
            );
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn invalid_syntax() {
            assert_eq!(
                parse_error("{% for %}{% endfor %}"),
                "Liquid syntax error (line 1): Syntax Error in 'for loop' - Valid syntax: for [item] in [collection]"
            );
        }

        #[test]
        fn second_else_is_unknown() {
            assert_eq!(
                parse_error("{% for x in xs %}{% else %}{% else %}{% endfor %}"),
                "Liquid syntax error (line 1): for tag does not expect 'else' tag"
            );
        }

        #[test]
        fn blank_loop_drops_whitespace() {
            assert_eq!(
                render_plain("{% for i in (1..3) %}\n  {% assign x = i %}\n{% endfor %}{{ x }}"),
                "3"
            );
        }
    }
}

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::expression::Expression;
use crate::lexer::TokenKind;
use crate::parse_context::ParseContext;
use crate::parser::Argument;
use crate::parser::Parser;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::value::Object;
use crate::value::Value;

pub(crate) const QUOTED_STRING: &str = r#""[^"]*"|'[^']*'"#;
pub(crate) const QUOTED_FRAGMENT: &str =
    r#""[^"]*"|'[^']*'|(?:[^\s,\|'"]|"[^"]*"|'[^']*')+"#;

static MARKUP_WITH_QUOTED_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)({QUOTED_FRAGMENT})(.*)")).expect("valid regex")
});
static FILTER_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\|\s*(.*)").expect("valid regex"));
static FILTER_PARSER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:\s+|{QUOTED_FRAGMENT}|,)+")).expect("valid regex")
});
static FILTER_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?::|,)\s*((?:\w+\s*:\s*)?(?:{QUOTED_FRAGMENT}))")).expect("valid regex")
});
static JUST_TAG_ATTRIBUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\A(\w[\w-]*)\s*:\s*({QUOTED_FRAGMENT})\z")).expect("valid regex")
});
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// One `| name: args` step of a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub keyword_args: Vec<(String, Expression)>,
}

impl FilterCall {
    fn new(name: &str, arguments: Vec<Argument>) -> Self {
        let mut args = Vec::new();
        let mut keyword_args = Vec::new();
        for argument in arguments {
            match argument {
                Argument::Positional(expression) => args.push(expression),
                Argument::Keyword(key, expression) => keyword_args.push((key, expression)),
            }
        }
        Self {
            name: name.to_owned(),
            args,
            keyword_args,
        }
    }
}

/// `{{ expression | filter: arg, key: value }}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: Expression,
    filters: Vec<FilterCall>,
    line_number: Option<usize>,
}

impl Variable {
    /// Parse variable markup: the text between `{{` and `}}`, or the
    /// right-hand side of `assign` and `echo`.
    pub fn parse(markup: &str, parse_context: &mut ParseContext) -> Result<Self> {
        let line_number = parse_context.line_number();
        let (name, filters) = parse_context.parse_with_selected_parser(
            &format!("{{{{{markup}}}}}"),
            |_| strict_parse(markup),
            |_| Ok(lax_parse(markup)),
        )?;
        Ok(Self {
            name,
            filters,
            line_number,
        })
    }

    #[must_use]
    pub fn name(&self) -> &Expression {
        &self.name
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterCall] {
        &self.filters
    }

    /// Evaluate the expression and run it through the filter chain and the
    /// context's global filter.
    pub fn render_value(&self, context: &mut Context) -> Result<Value> {
        let mut value = context.evaluate(&self.name)?;
        for filter in &self.filters {
            let positional = filter
                .args
                .iter()
                .map(|arg| context.evaluate(arg))
                .collect::<Result<Vec<_>>>()?;
            let mut keyword = Object::new();
            for (key, arg) in &filter.keyword_args {
                keyword.insert(key.clone(), context.evaluate(arg)?);
            }
            value = context.invoke_filter(&filter.name, value, &positional, &keyword)?;
        }
        Ok(context.apply_global_filter(value))
    }
}

impl Renderable for Variable {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult {
        self.render_value(context)?.write_output(output);
        Ok(None)
    }

    fn line_number(&self) -> Option<usize> {
        self.line_number
    }
}

fn strict_parse(markup: &str) -> Result<(Expression, Vec<FilterCall>)> {
    let mut parser = Parser::new(markup)?;
    if parser.look(TokenKind::EndOfString, 0) {
        return Ok((Expression::Literal(Value::Nil), Vec::new()));
    }

    let name = parser.expression()?;
    let mut filters = Vec::new();
    while parser.consume_if(TokenKind::Pipe).is_some() {
        let filter_name = parser.consume(TokenKind::Id)?;
        let mut arguments = Vec::new();
        if parser.consume_if(TokenKind::Colon).is_some() {
            arguments.push(parser.argument()?);
            while parser.consume_if(TokenKind::Comma).is_some() {
                arguments.push(parser.argument()?);
            }
        }
        filters.push(FilterCall::new(filter_name, arguments));
    }
    parser.finish()?;
    Ok((name, filters))
}

fn lax_parse(markup: &str) -> (Expression, Vec<FilterCall>) {
    let Some(caps) = MARKUP_WITH_QUOTED_FRAGMENT.captures(markup) else {
        return (Expression::Literal(Value::Nil), Vec::new());
    };
    let name = Expression::parse(&caps[1]);
    let mut filters = Vec::new();

    if let Some(filter_caps) = FILTER_MARKUP.captures(&caps[2]) {
        for chunk in FILTER_PARSER.find_iter(&filter_caps[1]) {
            let chunk = chunk.as_str();
            let Some(filter_name) = WORD.find(chunk) else {
                continue;
            };
            let arguments = FILTER_ARGS
                .captures_iter(chunk)
                .map(|arg| lax_argument(&arg[1]))
                .collect();
            filters.push(FilterCall::new(filter_name.as_str(), arguments));
        }
    }
    (name, filters)
}

fn lax_argument(markup: &str) -> Argument {
    match JUST_TAG_ATTRIBUTES.captures(markup) {
        Some(caps) => Argument::Keyword(caps[1].to_owned(), Expression::parse(&caps[2])),
        None => Argument::Positional(Expression::parse(markup)),
    }
}

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::expression::Expression;
use crate::lexer::TokenKind;
use crate::parser::Parser;
use crate::utils::to_number;
use crate::value::Value;
use crate::variable::QUOTED_FRAGMENT;

static LAX_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"({QUOTED_FRAGMENT})\s*([=!<>a-z_]+)?\s*({QUOTED_FRAGMENT})?"
    ))
    .expect("valid regex")
});
static FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{QUOTED_FRAGMENT}|\S+")).expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Contains,
    /// Accepted by the lax parser, rejected when evaluated.
    Unknown(String),
}

impl Operator {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "==" => Self::Equal,
            "!=" | "<>" => Self::NotEqual,
            "<" => Self::Less,
            ">" => Self::Greater,
            "<=" => Self::LessOrEqual,
            ">=" => Self::GreaterOrEqual,
            "contains" => Self::Contains,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
            Self::Contains => "contains",
            Self::Unknown(op) => op,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    And,
    Or,
}

/// `left op right`, optionally chained to further conditions. Chains
/// associate to the right: `a or b and c` is `a or (b and c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    left: Expression,
    comparison: Option<(Operator, Expression)>,
    child: Option<(Relation, Box<Condition>)>,
}

impl Condition {
    #[must_use]
    pub fn new(left: Expression) -> Self {
        Self {
            left,
            comparison: None,
            child: None,
        }
    }

    #[must_use]
    pub fn comparison(left: Expression, operator: Operator, right: Expression) -> Self {
        Self {
            left,
            comparison: Some((operator, right)),
            child: None,
        }
    }

    fn chain(mut links: Vec<Condition>, relations: Vec<Relation>) -> Self {
        let mut condition = links.pop().unwrap_or_else(|| Self::new(Expression::Literal(Value::Nil)));
        while let (Some(mut previous), Some(relation)) = (links.pop(), relations.get(links.len())) {
            previous.child = Some((*relation, Box::new(condition)));
            condition = previous;
        }
        condition
    }

    pub fn evaluate(&self, context: &mut Context) -> Result<bool> {
        let mut condition = self;
        loop {
            let result = condition.interpret(context)?;
            match &condition.child {
                Some((Relation::Or, _)) if result => return Ok(true),
                Some((Relation::And, _)) if !result => return Ok(false),
                Some((_, child)) => condition = &**child,
                None => return Ok(result),
            }
        }
    }

    fn interpret(&self, context: &mut Context) -> Result<bool> {
        let Some((operator, right)) = &self.comparison else {
            return Ok(context.evaluate(&self.left)?.is_truthy());
        };

        if let Expression::Empty | Expression::Blank = right {
            let left = context.evaluate(&self.left)?;
            return Ok(apply_equality(operator, method_literal(right, &left)));
        }
        if let Expression::Empty | Expression::Blank = &self.left {
            let right_value = context.evaluate(right)?;
            return Ok(apply_equality(operator, method_literal(&self.left, &right_value)));
        }

        let left = context.evaluate(&self.left)?;
        let right = context.evaluate(right)?;
        compare(operator, &left, &right)
    }

    /// Strict parse of a full condition, ending at the end of the markup.
    pub fn parse_strict(markup: &str) -> Result<Self> {
        let mut parser = Parser::new(markup)?;
        let condition = Self::parse_chain(&mut parser)?;
        parser.finish()?;
        Ok(condition)
    }

    pub(crate) fn parse_chain(parser: &mut Parser<'_>) -> Result<Self> {
        let mut links = vec![Self::parse_comparison(parser)?];
        let mut relations = Vec::new();
        loop {
            let relation = if parser.id("and") {
                Relation::And
            } else if parser.id("or") {
                Relation::Or
            } else {
                break;
            };
            relations.push(relation);
            links.push(Self::parse_comparison(parser)?);
        }
        Ok(Self::chain(links, relations))
    }

    fn parse_comparison(parser: &mut Parser<'_>) -> Result<Self> {
        let left = parser.expression()?;
        match parser.consume_if(TokenKind::Comparison) {
            Some(op) => Ok(Self::comparison(left, Operator::parse(op), parser.expression()?)),
            None => Ok(Self::new(left)),
        }
    }

    /// Lax parse. Words `and` and `or` outside quotes split the chain; each
    /// link is matched loosely. `None` means a link could not be matched.
    #[must_use]
    pub fn parse_lax(markup: &str) -> Option<Self> {
        let mut links = Vec::new();
        let mut relations = Vec::new();
        let mut current = String::new();
        for word in FRAGMENT.find_iter(markup) {
            let relation = match word.as_str() {
                "and" => Relation::And,
                "or" => Relation::Or,
                _ => {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(word.as_str());
                    continue;
                }
            };
            links.push(Self::parse_lax_link(&current)?);
            relations.push(relation);
            current.clear();
        }
        links.push(Self::parse_lax_link(&current)?);
        Some(Self::chain(links, relations))
    }

    pub(crate) fn parse_lax_link(markup: &str) -> Option<Self> {
        let caps = LAX_CONDITION.captures(markup)?;
        let left = Expression::parse(&caps[1]);
        Some(match (caps.get(2), caps.get(3)) {
            (Some(op), right) => Self::comparison(
                left,
                Operator::parse(op.as_str()),
                Expression::parse(right.map_or("", |m| m.as_str())),
            ),
            (None, _) => Self::new(left),
        })
    }
}

fn method_literal(literal: &Expression, value: &Value) -> Option<bool> {
    match literal {
        Expression::Empty => value.is_empty(),
        _ => Some(value.is_blank()),
    }
}

fn apply_equality(operator: &Operator, result: Option<bool>) -> bool {
    match operator {
        Operator::Equal => result.unwrap_or(false),
        Operator::NotEqual => !result.unwrap_or(false),
        _ => false,
    }
}

fn compare(operator: &Operator, left: &Value, right: &Value) -> Result<bool> {
    let ordering = |expected: fn(Ordering) -> bool| -> Result<bool> {
        if left.is_number() && right.is_number() {
            return Ok(expected(to_number(left).compare(to_number(right))));
        }
        match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(expected(a.cmp(b))),
            (_, Value::String(_)) if left.is_number() => Err(Error::argument(format!(
                "comparison of {} with String failed",
                left.type_name()
            ))),
            (Value::String(_), _) if right.is_number() => Err(Error::argument(format!(
                "comparison of String with {} failed",
                right.to_s()
            ))),
            _ => Ok(false),
        }
    };

    match operator {
        Operator::Equal => Ok(left == right),
        Operator::NotEqual => Ok(left != right),
        Operator::Less => ordering(Ordering::is_lt),
        Operator::Greater => ordering(Ordering::is_gt),
        Operator::LessOrEqual => ordering(Ordering::is_le),
        Operator::GreaterOrEqual => ordering(Ordering::is_ge),
        Operator::Contains => Ok(contains(left, right)),
        Operator::Unknown(op) => Err(Error::argument(format!("Unknown operator {op}"))),
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    if !left.is_truthy() || !right.is_truthy() {
        return false;
    }
    match left {
        Value::String(haystack) => haystack.contains(&right.to_s()),
        Value::Array(items) => items.contains(right),
        Value::Object(map) => right.as_str().is_some_and(|key| map.contains_key(key)),
        Value::Range(start, end) => match right {
            Value::Integer(n) => (*start..=*end).contains(n),
            _ => false,
        },
        Value::Drop(drop) => drop.items().is_some_and(|items| items.contains(right)),
        _ => false,
    }
}

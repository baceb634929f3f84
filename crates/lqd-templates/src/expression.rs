use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::drop::invoke_drop;
use crate::error::Error;
use crate::error::Result;
use crate::utils::leading_integer;
use crate::utils::to_integer;
use crate::value::Value;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\A-?\d+\z").expect("valid regex"));
static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A-?\d[\d.]+\z").expect("valid regex"));
static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\(\s*(\S+)\s*\.\.\s*(\S+)\s*\)\z").expect("valid regex")
});

const COMMAND_METHODS: &[&str] = &["size", "first", "last"];

/// A parsed operand: a literal, a variable lookup or a range.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// The `empty` keyword, only meaningful on one side of `==`.
    Empty,
    /// The `blank` keyword.
    Blank,
    Lookup(VariableLookup),
    Range(Box<RangeLookup>),
}

impl Expression {
    /// Lenient parse of a single operand. Never fails; anything that is
    /// not a literal becomes a variable lookup.
    #[must_use]
    pub fn parse(markup: &str) -> Expression {
        let markup = markup.trim();

        if markup.len() >= 2
            && ((markup.starts_with('"') && markup.ends_with('"'))
                || (markup.starts_with('\'') && markup.ends_with('\'')))
        {
            return Self::Literal(Value::String(markup[1..markup.len() - 1].to_owned()));
        }

        if let Some(literal) = Self::keyword(markup) {
            return literal;
        }

        if INTEGER.is_match(markup) {
            return Self::Literal(
                markup
                    .parse::<i64>()
                    .map_or_else(|_| Value::Float(leading_float(markup)), Value::Integer),
            );
        }

        if let Some(caps) = RANGE.captures(markup) {
            return RangeLookup::build(Self::parse(&caps[1]), Self::parse(&caps[2]));
        }

        if FLOAT.is_match(markup) {
            return Self::Literal(Value::Float(leading_float(markup)));
        }

        Self::Lookup(VariableLookup::parse(markup))
    }

    pub(crate) fn keyword(markup: &str) -> Option<Expression> {
        Some(match markup {
            "" | "nil" | "null" => Self::Literal(Value::Nil),
            "true" => Self::Literal(Value::Bool(true)),
            "false" => Self::Literal(Value::Bool(false)),
            "empty" => Self::Empty,
            "blank" => Self::Blank,
            _ => return None,
        })
    }

    pub fn evaluate(&self, context: &mut Context) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Empty | Self::Blank => Ok(Value::String(String::new())),
            Self::Lookup(lookup) => lookup.evaluate(context),
            Self::Range(range) => range.evaluate(context),
        }
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }
}

fn leading_float(markup: &str) -> f64 {
    let digits_end = markup
        .char_indices()
        .skip_while(|(idx, c)| *idx == 0 && *c == '-')
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(markup.len(), |(idx, _)| idx);
    let mut end = digits_end;
    if markup[digits_end..].starts_with('.') {
        let frac = markup[digits_end + 1..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(markup.len(), |idx| digits_end + 1 + idx);
        if frac > digits_end + 1 {
            end = frac;
        }
    }
    markup[..end].parse().unwrap_or(0.0)
}

/// The root of a variable lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupName {
    Ident(String),
    /// `[expr]` at the start of a lookup, resolved at render time.
    Dynamic(Box<Expression>),
}

/// One step after the root of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `.key`; `size`, `first` and `last` fall back to commands.
    Property(String),
    /// `[expr]`; never treated as a command.
    Index(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableLookup {
    name: LookupName,
    lookups: Vec<Lookup>,
}

impl VariableLookup {
    #[must_use]
    pub fn new(name: LookupName, lookups: Vec<Lookup>) -> Self {
        Self { name, lookups }
    }

    /// Split `a.b["c"][0]` into its segments.
    #[must_use]
    pub fn parse(markup: &str) -> Self {
        let mut segments = scan_segments(markup).into_iter();
        let name = match segments.next() {
            Some(first) if first.starts_with('[') => {
                LookupName::Dynamic(Box::new(Expression::parse(&first[1..first.len() - 1])))
            }
            Some(first) => LookupName::Ident(first.to_owned()),
            None => LookupName::Ident(String::new()),
        };
        let lookups = segments
            .map(|segment| {
                if segment.starts_with('[') {
                    Lookup::Index(Expression::parse(&segment[1..segment.len() - 1]))
                } else {
                    Lookup::Property(segment.to_owned())
                }
            })
            .collect();
        Self { name, lookups }
    }

    #[must_use]
    pub fn name(&self) -> &LookupName {
        &self.name
    }

    #[must_use]
    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    pub fn evaluate(&self, context: &mut Context) -> Result<Value> {
        let name = match &self.name {
            LookupName::Ident(name) => name.clone(),
            LookupName::Dynamic(expr) => expr.evaluate(context)?.to_s(),
        };
        let mut object = context.find_variable(&name)?;

        for lookup in &self.lookups {
            let (key, command) = match lookup {
                Lookup::Property(key) => (
                    Value::String(key.clone()),
                    COMMAND_METHODS.contains(&key.as_str()),
                ),
                Lookup::Index(expr) => (expr.evaluate(context)?, false),
            };

            match lookup_key(&object, &key, command, context)? {
                Some(value) => object = value,
                None if context.strict_variables() => {
                    return Err(Error::undefined_variable(&key.to_s()));
                }
                None => return Ok(Value::Nil),
            }
        }

        Ok(object)
    }
}

/// Resolve one lookup step. `None` means the key is absent.
fn lookup_key(object: &Value, key: &Value, command: bool, context: &Context) -> Result<Option<Value>> {
    match (object, key) {
        (Value::Object(map), Value::String(k)) if map.contains_key(k) => {
            return Ok(map.get(k).cloned());
        }
        (Value::Object(_), Value::Integer(_)) => return Ok(Some(Value::Nil)),
        (Value::Array(items), Value::Integer(index)) => {
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let index = if *index < 0 { len + index } else { *index };
            return Ok(Some(
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default(),
            ));
        }
        (Value::Drop(drop), key) => return invoke_drop(drop.as_ref(), &key.to_s(), context).map(Some),
        _ => {}
    }

    if !command {
        return Ok(None);
    }
    let Value::String(key) = key else {
        return Ok(None);
    };

    Ok(match key.as_str() {
        "size" => object.size().map(Value::from),
        "first" => match object {
            Value::String(s) => Some(Value::String(s.chars().next().map(String::from).unwrap_or_default())),
            other => other.first(),
        },
        "last" => match object {
            Value::String(s) => Some(Value::String(s.chars().last().map(String::from).unwrap_or_default())),
            other => other.last(),
        },
        _ => None,
    })
}

/// Scan lookup segments: `[...]` groups with nesting, or `[\w-]+\??` runs.
fn scan_segments(markup: &str) -> Vec<&str> {
    let bytes = markup.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c == b'[' {
            let mut depth = 0;
            let mut end = None;
            for (offset, b) in bytes[pos..].iter().enumerate() {
                match b {
                    b'[' => depth += 1,
                    b']' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(pos + offset + 1);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match end {
                Some(end) => {
                    segments.push(&markup[pos..end]);
                    pos = end;
                }
                None => pos += 1,
            }
        } else if is_segment_byte(c) || !c.is_ascii() {
            let start = pos;
            while pos < bytes.len() && (is_segment_byte(bytes[pos]) || !bytes[pos].is_ascii()) {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos] == b'?' {
                pos += 1;
            }
            segments.push(&markup[start..pos]);
        } else {
            pos += 1;
        }
    }
    segments
}

fn is_segment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// A range whose bounds are only known at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLookup {
    start: Expression,
    end: Expression,
}

impl RangeLookup {
    /// Literal bounds fold into a constant range.
    #[must_use]
    pub fn build(start: Expression, end: Expression) -> Expression {
        match (&start, &end) {
            (Expression::Literal(a), Expression::Literal(b)) => {
                Expression::Literal(Value::Range(literal_to_i(a), literal_to_i(b)))
            }
            _ => Expression::Range(Box::new(Self { start, end })),
        }
    }

    pub fn evaluate(&self, context: &mut Context) -> Result<Value> {
        let start = bound_to_integer(&self.start.evaluate(context)?)?;
        let end = bound_to_integer(&self.end.evaluate(context)?)?;
        Ok(Value::Range(start, end))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn literal_to_i(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Float(f) if f.is_finite() => f.trunc() as i64,
        Value::String(s) => leading_integer(s),
        _ => 0,
    }
}

fn bound_to_integer(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Nil => Ok(0),
        Value::String(s) => Ok(leading_integer(s)),
        other => to_integer(other),
    }
}

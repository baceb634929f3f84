use std::cmp::Ordering;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::drop::DropObject;

/// String-keyed map that keeps insertion order.
pub type Object = IndexMap<String, Value>;

/// A dynamically typed template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// Inclusive integer range, as produced by `(a..b)`.
    Range(i64, i64),
    Drop(Arc<dyn DropObject>),
}

impl Value {
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Only `nil` and `false` are falsy. Empty strings, zero and empty
    /// collections are truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// `Some` for values that know whether they are empty.
    #[must_use]
    pub fn is_empty(&self) -> Option<bool> {
        match self {
            Self::String(s) => Some(s.is_empty()),
            Self::Array(items) => Some(items.is_empty()),
            Self::Object(map) => Some(map.is_empty()),
            _ => None,
        }
    }

    /// Nil, false, whitespace-only strings and empty collections are blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Nil | Self::Bool(false) => true,
            Self::String(s) => s.trim().is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(true) => "TrueClass",
            Self::Bool(false) => "FalseClass",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
            Self::Object(_) => "Hash",
            Self::Range(..) => "Range",
            Self::Drop(_) => "Drop",
        }
    }

    /// The string form of the value. Collections use their inspect form.
    #[must_use]
    pub fn to_s(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => self.inspect(),
            Self::Range(start, end) => format!("{start}..{end}"),
            Self::Drop(drop) => drop.to_liquid_string(),
        }
    }

    #[must_use]
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        self.write_inspect(&mut out);
        out
    }

    fn write_inspect(&self, out: &mut String) {
        match self {
            Self::Nil => out.push_str("nil"),
            Self::String(s) => {
                out.push('"');
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        _ => out.push(ch),
                    }
                }
                out.push('"');
            }
            Self::Array(items) => {
                out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    item.write_inspect(out);
                }
                out.push(']');
            }
            Self::Object(map) => {
                out.push('{');
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    Self::String(key.clone()).write_inspect(out);
                    out.push_str("=>");
                    value.write_inspect(out);
                }
                out.push('}');
            }
            other => out.push_str(&other.to_s()),
        }
    }

    /// Append the value as `{{ }}` output renders it: nil writes nothing and
    /// arrays are joined without a separator, recursively.
    pub fn write_output(&self, out: &mut String) {
        match self {
            Self::Nil => {}
            Self::Array(items) => {
                for item in items {
                    item.write_output(out);
                }
            }
            other => out.push_str(&other.to_s()),
        }
    }

    /// Join items with `glue`, flattening nested arrays.
    #[must_use]
    pub fn join(items: &[Value], glue: &str) -> String {
        let mut out = String::new();
        let mut first = true;
        join_into(items, glue, &mut out, &mut first);
        out
    }

    /// Number of elements for collections, characters for strings.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Array(items) => Some(items.len()),
            Self::Object(map) => Some(map.len()),
            Self::Range(start, end) => Some(range_len(*start, *end)),
            // Integers report their width in bytes.
            Self::Integer(_) => Some(8),
            _ => None,
        }
    }

    #[must_use]
    pub fn first(&self) -> Option<Value> {
        match self {
            Self::Array(items) => Some(items.first().cloned().unwrap_or_default()),
            Self::Range(start, end) => Some(if start <= end {
                Self::Integer(*start)
            } else {
                Self::Nil
            }),
            Self::Object(map) => Some(
                map.first()
                    .map(|(k, v)| Self::Array(vec![Self::String(k.clone()), v.clone()]))
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<Value> {
        match self {
            Self::Array(items) => Some(items.last().cloned().unwrap_or_default()),
            Self::Range(start, end) => Some(if start <= end {
                Self::Integer(*end)
            } else {
                Self::Nil
            }),
            _ => None,
        }
    }

    /// Iterate the value the way loops do. Strings yield themselves once,
    /// objects yield `[key, value]` pairs, scalars yield nothing.
    #[must_use]
    pub fn items(&self) -> Items<'_> {
        match self {
            Self::Array(items) => Items::Slice(items.iter()),
            Self::Range(start, end) => Items::Range(*start..=*end),
            Self::Object(map) => Items::Pairs(map.iter()),
            Self::String(s) if !s.is_empty() => Items::Owned(vec![self.clone()].into_iter()),
            Self::Drop(drop) => Items::Owned(drop.items().unwrap_or_default().into_iter()),
            _ => Items::Owned(Vec::new().into_iter()),
        }
    }

    /// Whether `items` yields anything meaningful for this value.
    #[must_use]
    pub fn is_iterable(&self) -> bool {
        match self {
            Self::Array(_) | Self::Range(..) | Self::Object(_) => true,
            Self::Drop(drop) => drop.items().is_some(),
            _ => false,
        }
    }

    /// Ordering between comparable values: numbers with numbers, strings with
    /// strings, arrays element-wise.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Equality that also requires matching types, so `1` and `1.0` differ.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other) && self == other
    }
}

fn join_into(items: &[Value], glue: &str, out: &mut String, first: &mut bool) {
    for item in items {
        if let Value::Array(nested) = item {
            join_into(nested, glue, out, first);
            continue;
        }
        if !*first {
            out.push_str(glue);
        }
        *first = false;
        out.push_str(&item.to_s());
    }
}

pub(crate) fn range_len(start: i64, end: i64) -> usize {
    if start > end {
        0
    } else {
        usize::try_from(end.abs_diff(start)).map_or(usize::MAX, |len| len.saturating_add(1))
    }
}

/// Float formatting with a trailing `.0` for whole numbers and exponent
/// notation for very large or very small magnitudes.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }

    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let decpt = exponent + 1;

    let mut out = String::new();
    if value.is_sign_negative() {
        out.push('-');
    }
    let ndigits = i32::try_from(digits.len()).unwrap_or(i32::MAX);
    if decpt > 0 && decpt <= 16 {
        let point = usize::try_from(decpt).unwrap_or(0);
        if digits.len() <= point {
            out.push_str(&digits);
            for _ in ndigits..decpt {
                out.push('0');
            }
            out.push_str(".0");
        } else {
            out.push_str(&digits[..point]);
            out.push('.');
            out.push_str(&digits[point..]);
        }
    } else if decpt > -4 && decpt <= 0 {
        out.push_str("0.");
        for _ in decpt..0 {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        out.push_str(&digits[..1]);
        out.push('.');
        if digits.len() > 1 {
            out.push_str(&digits[1..]);
        } else {
            out.push('0');
        }
        let exp = decpt - 1;
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(out, "e{sign}{:02}", exp.abs());
    }
    out
}

/// Cloning iterator over a value's items.
pub enum Items<'a> {
    Slice(std::slice::Iter<'a, Value>),
    Range(RangeInclusive<i64>),
    Pairs(indexmap::map::Iter<'a, String, Value>),
    Owned(std::vec::IntoIter<Value>),
}

impl Iterator for Items<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Slice(iter) => iter.next().cloned(),
            Self::Range(range) => range.next().map(Value::Integer),
            Self::Pairs(iter) => iter
                .next()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()])),
            Self::Owned(iter) => iter.next(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Range(a1, a2), Self::Range(b1, b2)) => a1 == b1 && a2 == b2,
            (Self::Drop(a), Self::Drop(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::Local;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

static DECIMAL_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A-?\d+\.\d+\z").expect("valid regex"));

/// Strict integer conversion used for loop bounds and range ends.
pub fn to_integer(value: &Value) -> Result<i64> {
    if let Value::Integer(i) = value {
        return Ok(*i);
    }
    let text = value.to_s();
    let cleaned = text.trim().replace('_', "");
    cleaned
        .parse::<i64>()
        .map_err(|_| Error::argument("invalid integer"))
}

/// Leading-integer parse: optional sign and digits after leading
/// whitespace, anything else ignored. Empty or non-numeric input is `0`.
#[must_use]
pub fn leading_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let mut chars = trimmed.char_indices().peekable();
    let mut end = 0;
    if let Some(&(_, c)) = chars.peek() {
        if c == '-' || c == '+' {
            chars.next();
            end = 1;
        }
    }
    let sign_len = end;
    for (idx, c) in chars {
        if c.is_ascii_digit() {
            end = idx + 1;
        } else if c != '_' {
            break;
        }
    }
    if end == sign_len {
        return 0;
    }
    trimmed[..end].replace('_', "").parse().unwrap_or(0)
}

/// Numeric value used by the math filters. Decimals keep the arithmetic
/// exact for inputs like `0.1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Decimal(Decimal),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Integer(i) => Value::Integer(i),
            Self::Decimal(d) => Value::Float(d.to_f64().unwrap_or(f64::NAN)),
            Self::Float(f) => Value::Float(f),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Integer(i) => i as f64,
            Self::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Self::Float(f) => f,
        }
    }

    fn as_decimal(self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(i)),
            Self::Decimal(d) => Some(d),
            Self::Float(f) => Decimal::from_f64(f),
        }
    }

    fn ensure_finite(self) -> Result<Self> {
        match self {
            Self::Float(f) if !f.is_finite() => Err(Error::float_domain(crate::value::format_float(f))),
            other => Ok(other),
        }
    }

    fn combine(
        self,
        other: Number,
        int_op: impl Fn(i64, i64) -> Option<i64>,
        dec_op: impl Fn(Decimal, Decimal) -> Option<Decimal>,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Number {
        if let (Self::Integer(a), Self::Integer(b)) = (self, other) {
            if let Some(result) = int_op(a, b) {
                return Self::Integer(result);
            }
        }
        if !matches!(self, Self::Float(_)) && !matches!(other, Self::Float(_)) {
            if let (Some(a), Some(b)) = (self.as_decimal(), other.as_decimal()) {
                if let Some(result) = dec_op(a, b) {
                    return Self::Decimal(result);
                }
            }
        }
        Self::Float(float_op(self.as_f64(), other.as_f64()))
    }

    #[must_use]
    pub fn add(self, other: Number) -> Number {
        self.combine(other, i64::checked_add, Decimal::checked_add, |a, b| a + b)
    }

    #[must_use]
    pub fn sub(self, other: Number) -> Number {
        self.combine(other, i64::checked_sub, Decimal::checked_sub, |a, b| a - b)
    }

    #[must_use]
    pub fn mul(self, other: Number) -> Number {
        self.combine(other, i64::checked_mul, Decimal::checked_mul, |a, b| a * b)
    }

    /// Division. Integer operands use floor division.
    pub fn div(self, other: Number) -> Result<Number> {
        if other.is_zero() {
            return Err(Error::zero_division());
        }
        Ok(self.combine(other, floor_div, Decimal::checked_div, |a, b| a / b))
    }

    /// Modulo with the sign of the divisor.
    pub fn rem(self, other: Number) -> Result<Number> {
        if other.is_zero() {
            return Err(Error::zero_division());
        }
        Ok(self.combine(
            other,
            |a, b| {
                if b == -1 {
                    return Some(0);
                }
                let r = a.checked_rem(b)?;
                if r != 0 && (r < 0) != (b < 0) {
                    r.checked_add(b)
                } else {
                    Some(r)
                }
            },
            |a, b| {
                let r = a.checked_rem(b)?;
                if !r.is_zero() && r.is_sign_negative() != b.is_sign_negative() {
                    r.checked_add(b)
                } else {
                    Some(r)
                }
            },
            |a, b| {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r + b
                } else {
                    r
                }
            },
        ))
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Integer(i) => i == 0,
            Self::Decimal(d) => d.is_zero(),
            Self::Float(f) => f == 0.0,
        }
    }

    #[must_use]
    pub fn abs(self) -> Number {
        match self {
            Self::Integer(i) => i.checked_abs().map_or(Self::Float(self.as_f64().abs()), Self::Integer),
            Self::Decimal(d) => Self::Decimal(d.abs()),
            Self::Float(f) => Self::Float(f.abs()),
        }
    }

    pub fn ceil(self) -> Result<i64> {
        match self.ensure_finite()? {
            Self::Integer(i) => Ok(i),
            Self::Decimal(d) => d.ceil().to_i64().ok_or_else(|| Error::float_domain(d.to_string())),
            Self::Float(f) => float_to_i64(f.ceil()),
        }
    }

    pub fn floor(self) -> Result<i64> {
        match self.ensure_finite()? {
            Self::Integer(i) => Ok(i),
            Self::Decimal(d) => d.floor().to_i64().ok_or_else(|| Error::float_domain(d.to_string())),
            Self::Float(f) => float_to_i64(f.floor()),
        }
    }

    /// Round half away from zero to `digits` decimal places. Negative digits
    /// round to tens, hundreds and so on.
    pub fn round(self, digits: i64) -> Result<Number> {
        let number = self.ensure_finite()?;
        if digits < 0 {
            let factor = 10_i64.checked_pow(u32::try_from(-digits).unwrap_or(u32::MAX));
            return Ok(match (number, factor) {
                (_, None) => Self::Integer(0),
                (Self::Integer(i), Some(f)) => {
                    round_int(i, f).map_or_else(|| round_wide(i, f), Self::Integer)
                }
                #[allow(clippy::cast_precision_loss)]
                (other, Some(f)) => {
                    let factor = f as f64;
                    Self::Integer(float_to_i64((other.as_f64() / factor).round() * factor)?)
                }
            });
        }
        let dp = u32::try_from(digits).unwrap_or(u32::MAX);
        Ok(match number {
            Self::Integer(i) => Self::Integer(i),
            Self::Decimal(d) => {
                Self::Decimal(d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
            }
            Self::Float(f) => {
                let factor = 10_f64.powi(i32::try_from(dp).unwrap_or(i32::MAX));
                Self::Float((f * factor).round() / factor)
            }
        })
    }

    #[must_use]
    pub fn compare(self, other: Number) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(&b),
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) if !matches!(a, Self::Float(_)) && !matches!(b, Self::Float(_)) => x.cmp(&y),
                _ => a
                    .as_f64()
                    .partial_cmp(&b.as_f64())
                    .unwrap_or(std::cmp::Ordering::Equal),
            },
        }
    }
}

fn round_int(value: i64, factor: i64) -> Option<i64> {
    let remainder = value % factor;
    let base = value - remainder;
    if remainder.unsigned_abs() * 2 >= factor.unsigned_abs() {
        base.checked_add(factor * value.signum())
    } else {
        Some(base)
    }
}

/// Rounding whose result no longer fits an integer.
#[allow(clippy::cast_precision_loss)]
fn round_wide(value: i64, factor: i64) -> Number {
    let factor_d = Decimal::from(factor);
    Decimal::from(value)
        .checked_div(factor_d)
        .map(|q| q.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|q| q.checked_mul(factor_d))
        .map_or_else(
            || Number::Float((value as f64 / factor as f64).round() * factor as f64),
            Number::Decimal,
        )
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_i64(value: f64) -> Result<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(value as i64)
    } else {
        Err(Error::float_domain(crate::value::format_float(value)))
    }
}

/// Numeric coercion for filter input. Non-numeric values count as `0`.
#[must_use]
pub fn to_number(value: &Value) -> Number {
    match value {
        Value::Integer(i) => Number::Integer(*i),
        Value::Float(f) => Decimal::from_str(&f.to_string())
            .map_or(Number::Float(*f), Number::Decimal),
        Value::String(s) => {
            let trimmed = s.trim();
            if DECIMAL_STRING.is_match(trimmed) {
                Decimal::from_str(trimmed).map_or_else(
                    |_| Number::Float(trimmed.parse().unwrap_or(0.0)),
                    Number::Decimal,
                )
            } else {
                Number::Integer(leading_integer(trimmed))
            }
        }
        _ => Number::Integer(0),
    }
}

/// Byte range of the `offset`, `length` slice over a sequence of `len`
/// items. Negative offsets count from the end.
#[must_use]
pub fn slice_bounds(len: usize, offset: i64, length: i64) -> Option<(usize, usize)> {
    if length < 0 {
        return None;
    }
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if offset < 0 { len_i + offset } else { offset };
    if start < 0 || start > len_i {
        return None;
    }
    let end = start.saturating_add(length).min(len_i);
    Some((
        usize::try_from(start).unwrap_or(0),
        usize::try_from(end).unwrap_or(0),
    ))
}

/// Items of a collection between `from` and `to` (exclusive). A missing
/// `to` means the end of the collection.
#[must_use]
pub fn slice_collection(collection: &Value, from: i64, to: Option<i64>) -> Vec<Value> {
    let mut segment = Vec::new();
    for (index, item) in collection.items().enumerate() {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        if to.is_some_and(|to| to <= index) {
            break;
        }
        if from <= index {
            segment.push(item);
        }
    }
    segment
}

/// Whitespace split that keeps at most `limit` pieces; the last piece
/// holds the remainder.
#[must_use]
pub fn split_whitespace_limit(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if pieces.len() + 1 == limit {
            pieces.push(rest);
            return pieces;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                pieces.push(&rest[..end]);
                rest = rest[end..].trim_start();
                if rest.is_empty() && pieces.len() + 1 == limit {
                    pieces.push(rest);
                }
            }
            None => {
                pieces.push(rest);
                rest = "";
            }
        }
    }
    pieces
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Interpret a value as a point in time. Integers and numeric strings are
/// Unix timestamps, `now` and `today` are the current time, other strings are
/// parsed with a set of common formats in the local zone.
#[must_use]
pub fn to_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Integer(secs) => timestamp(*secs),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) if f.is_finite() => timestamp(f.trunc() as i64),
        Value::String(s) => parse_date(s.trim()),
        _ => None,
    }
}

fn timestamp(secs: i64) -> Option<DateTime<FixedOffset>> {
    Local.timestamp_opt(secs, 0).single().map(|dt| dt.fixed_offset())
}

fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    if text.is_empty() {
        return None;
    }
    let lower = text.to_ascii_lowercase();
    if lower == "now" || lower == "today" {
        return Some(Local::now().fixed_offset());
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return timestamp(text.parse().ok()?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Local.from_local_datetime(&naive).earliest().map(|dt| dt.fixed_offset());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Local.from_local_datetime(&naive).earliest().map(|dt| dt.fixed_offset());
        }
    }
    None
}

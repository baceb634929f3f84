use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::general_purpose::STANDARD;
use base64::engine::general_purpose::URL_SAFE;
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use regex::Regex;

use crate::context::Context;
use crate::drop::invoke_drop;
use crate::error::Error;
use crate::error::Result;
use crate::strainer::FilterArgs;
use crate::strainer::FilterSet;
use crate::utils::slice_bounds;
use crate::utils::split_whitespace_limit;
use crate::utils::to_date;
use crate::utils::to_integer;
use crate::utils::to_number;
use crate::utils::Number;
use crate::value::Value;

static STRIP_HTML_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script.*?</script>|<!--.*?-->|<style.*?</style>").expect("valid regex")
});
static STRIP_HTML_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("valid regex"));
static NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").expect("valid regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:[a-zA-Z]+|#\d+);").expect("valid regex"));

/// Characters `url_encode` leaves alone. Spaces become `+` afterwards.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The filters every environment starts with.
#[must_use]
pub fn standard_filters() -> FilterSet {
    FilterSet::new("standard")
        // strings
        .filter("size", 0..=0, size)
        .filter("downcase", 0..=0, |input, _| Ok(Value::from(input.to_s().to_lowercase())))
        .filter("upcase", 0..=0, |input, _| Ok(Value::from(input.to_s().to_uppercase())))
        .filter("capitalize", 0..=0, capitalize)
        .filter("escape", 0..=0, escape)
        .filter("h", 0..=0, escape)
        .filter("escape_once", 0..=0, escape_once)
        .filter("url_encode", 0..=0, url_encode)
        .filter("url_decode", 0..=0, url_decode)
        .filter("base64_encode", 0..=0, |input, _| {
            Ok(Value::from(STANDARD.encode(input.to_s())))
        })
        .filter("base64_decode", 0..=0, |input, _| {
            decode_base64(&STANDARD, &input, "base64_decode")
        })
        .filter("base64_url_safe_encode", 0..=0, |input, _| {
            Ok(Value::from(URL_SAFE.encode(input.to_s())))
        })
        .filter("base64_url_safe_decode", 0..=0, |input, _| {
            decode_base64(&URL_SAFE_LENIENT, &input, "base64_url_safe_decode")
        })
        .filter("slice", 1..=2, slice)
        .filter("truncate", 0..=2, truncate)
        .filter("truncatewords", 0..=2, truncatewords)
        .filter("split", 1..=1, split)
        .filter("strip", 0..=0, |input, _| Ok(Value::from(input.to_s().trim())))
        .filter("lstrip", 0..=0, |input, _| Ok(Value::from(input.to_s().trim_start())))
        .filter("rstrip", 0..=0, |input, _| Ok(Value::from(input.to_s().trim_end())))
        .filter("strip_html", 0..=0, strip_html)
        .filter("strip_newlines", 0..=0, |input, _| {
            Ok(Value::from(NEWLINE.replace_all(&input.to_s(), "").into_owned()))
        })
        .filter("newline_to_br", 0..=0, |input, _| {
            Ok(Value::from(NEWLINE.replace_all(&input.to_s(), "<br />\n").into_owned()))
        })
        .filter("replace", 1..=2, |input, args| {
            Ok(Value::from(input.to_s().replace(&args.value(0).to_s(), &args.value(1).to_s())))
        })
        .filter("replace_first", 1..=2, |input, args| {
            Ok(Value::from(input.to_s().replacen(
                &args.value(0).to_s(),
                &args.value(1).to_s(),
                1,
            )))
        })
        .filter("replace_last", 2..=2, |input, args| {
            Ok(replace_last(&input.to_s(), &args.value(0).to_s(), &args.value(1).to_s()))
        })
        .filter("remove", 1..=1, |input, args| {
            Ok(Value::from(input.to_s().replace(&args.value(0).to_s(), "")))
        })
        .filter("remove_first", 1..=1, |input, args| {
            Ok(Value::from(input.to_s().replacen(&args.value(0).to_s(), "", 1)))
        })
        .filter("remove_last", 1..=1, |input, args| {
            Ok(replace_last(&input.to_s(), &args.value(0).to_s(), ""))
        })
        .filter("append", 1..=1, |input, args| {
            Ok(Value::from(input.to_s() + &args.value(0).to_s()))
        })
        .filter("prepend", 1..=1, |input, args| {
            Ok(Value::from(args.value(0).to_s() + &input.to_s()))
        })
        // arrays
        .filter("join", 0..=1, |input, args| {
            let glue = args.get(0).map_or_else(|| String::from(" "), Value::to_s);
            Ok(Value::from(Value::join(&input_items(&input), &glue)))
        })
        .filter("sort", 0..=1, sort)
        .filter("sort_natural", 0..=1, sort_natural)
        .filter("where", 1..=2, filter_where)
        .filter("uniq", 0..=1, uniq)
        .filter("reverse", 0..=0, |input, _| {
            let mut items = input_items(&input);
            items.reverse();
            Ok(Value::Array(items))
        })
        .filter("map", 1..=1, map)
        .filter("compact", 0..=1, compact)
        .filter("concat", 1..=1, concat)
        .filter("first", 0..=0, |input, _| Ok(input.first().unwrap_or_default()))
        .filter("last", 0..=0, |input, _| Ok(input.last().unwrap_or_default()))
        // dates
        .filter("date", 1..=1, date)
        // math
        .filter("abs", 0..=0, |input, _| Ok(to_number(&input).abs().into_value()))
        .filter("plus", 1..=1, |input, args| {
            Ok(to_number(&input).add(to_number(&args.value(0))).into_value())
        })
        .filter("minus", 1..=1, |input, args| {
            Ok(to_number(&input).sub(to_number(&args.value(0))).into_value())
        })
        .filter("times", 1..=1, |input, args| {
            Ok(to_number(&input).mul(to_number(&args.value(0))).into_value())
        })
        .filter("divided_by", 1..=1, |input, args| {
            Ok(to_number(&input).div(to_number(&args.value(0)))?.into_value())
        })
        .filter("modulo", 1..=1, |input, args| {
            Ok(to_number(&input).rem(to_number(&args.value(0)))?.into_value())
        })
        .filter("round", 0..=1, round)
        .filter("ceil", 0..=0, |input, _| Ok(Value::Integer(to_number(&input).ceil()?)))
        .filter("floor", 0..=0, |input, _| Ok(Value::Integer(to_number(&input).floor()?)))
        .filter("at_least", 1..=1, |input, args| {
            let (value, bound) = (to_number(&input), to_number(&args.value(0)));
            Ok(if bound.compare(value).is_gt() { bound } else { value }.into_value())
        })
        .filter("at_most", 1..=1, |input, args| {
            let (value, bound) = (to_number(&input), to_number(&args.value(0)));
            Ok(if bound.compare(value).is_lt() { bound } else { value }.into_value())
        })
        .filter("default", 0..=2, default)
}

fn size(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    Ok(Value::from(input.size().unwrap_or(0)))
}

fn capitalize(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    let text = input.to_s();
    let mut chars = text.chars();
    Ok(Value::from(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }))
}

fn push_escaped(ch: char, out: &mut String) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(ch),
    }
}

fn escape(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let text = input.to_s();
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        push_escaped(ch, &mut out);
    }
    Ok(Value::from(out))
}

/// Escape, leaving existing entities such as `&amp;` and `&#39;` intact.
fn escape_once(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    let text = input.to_s();
    let mut out = String::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        if ch == '&' && ENTITY.is_match(&text[idx + 1..]) {
            out.push('&');
        } else {
            push_escaped(ch, &mut out);
        }
    }
    Ok(Value::from(out))
}

fn url_encode(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let encoded = percent_encoding::utf8_percent_encode(&input.to_s(), URL_ENCODE_SET).to_string();
    Ok(Value::from(encoded.replace(' ', "+")))
}

fn url_decode(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let text = input.to_s().replace('+', " ");
    percent_encoding::percent_decode_str(&text)
        .decode_utf8()
        .map(|decoded| Value::from(decoded.into_owned()))
        .map_err(|_| Error::argument("invalid byte sequence in UTF-8"))
}

fn decode_base64(engine: &GeneralPurpose, input: &Value, filter: &str) -> Result<Value> {
    let bytes = engine
        .decode(input.to_s())
        .map_err(|_| Error::argument(format!("invalid base64 provided to {filter}")))?;
    Ok(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
}

fn slice(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let offset = to_integer(&args.value(0))?;
    let length = args.get(1).map_or(Ok(1), to_integer)?;
    if let Value::Array(items) = &input {
        let slice = slice_bounds(items.len(), offset, length)
            .map(|(start, end)| items[start..end].to_vec())
            .unwrap_or_default();
        return Ok(Value::Array(slice));
    }
    let chars: Vec<char> = input.to_s().chars().collect();
    let slice = slice_bounds(chars.len(), offset, length)
        .map(|(start, end)| chars[start..end].iter().collect::<String>())
        .unwrap_or_default();
    Ok(Value::from(slice))
}

fn truncate(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let text = input.to_s();
    let length = args.get(0).map_or(Ok(50), to_integer)?;
    let ellipsis = args.get(1).map_or_else(|| String::from("..."), Value::to_s);

    let char_count = text.chars().count();
    if i64::try_from(char_count).unwrap_or(i64::MAX) <= length {
        return Ok(Value::from(text));
    }
    let ellipsis_len = i64::try_from(ellipsis.chars().count()).unwrap_or(i64::MAX);
    let keep = usize::try_from(length.saturating_sub(ellipsis_len).max(0)).unwrap_or(0);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&ellipsis);
    Ok(Value::from(out))
}

fn truncatewords(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let text = input.to_s();
    let words = usize::try_from(args.get(0).map_or(Ok(15), to_integer)?.max(1)).unwrap_or(usize::MAX);
    let ellipsis = args.get(1).map_or_else(|| String::from("..."), Value::to_s);

    let wordlist = split_whitespace_limit(&text, words.saturating_add(1));
    if wordlist.len() <= words {
        return Ok(Value::from(text));
    }
    let mut out = wordlist[..wordlist.len() - 1].join(" ");
    out.push_str(&ellipsis);
    Ok(Value::from(out))
}

/// A single space splits on runs of whitespace, an empty pattern splits
/// into characters. Trailing empty pieces are dropped.
fn split(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let text = input.to_s();
    let pattern = args.value(0).to_s();
    let pieces: Vec<Value> = if pattern == " " {
        text.split_whitespace().map(Value::from).collect()
    } else if pattern.is_empty() {
        text.chars().map(|ch| Value::from(ch.to_string())).collect()
    } else {
        let mut parts: Vec<&str> = text.split(pattern.as_str()).collect();
        while parts.last().is_some_and(|part| part.is_empty()) {
            parts.pop();
        }
        parts.into_iter().map(Value::from).collect()
    };
    Ok(Value::Array(pieces))
}

fn strip_html(input: Value, _: &FilterArgs<'_>) -> Result<Value> {
    let text = input.to_s();
    let without_blocks = STRIP_HTML_BLOCKS.replace_all(&text, "");
    Ok(Value::from(STRIP_HTML_TAGS.replace_all(&without_blocks, "").into_owned()))
}

fn replace_last(text: &str, needle: &str, replacement: &str) -> Value {
    match text.rfind(needle) {
        Some(start) => Value::from(format!(
            "{}{replacement}{}",
            &text[..start],
            &text[start + needle.len()..]
        )),
        None => Value::from(text),
    }
}

/// Items for the array filters: arrays are flattened, an object counts as a
/// single item, nil is empty.
fn input_items(input: &Value) -> Vec<Value> {
    fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::Array(nested) => flatten_into(nested, out),
                other => out.push(other.clone()),
            }
        }
    }

    match input {
        Value::Nil => Vec::new(),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            flatten_into(items, &mut out);
            out
        }
        Value::Range(..) => input.items().collect(),
        Value::Drop(drop) => drop.items().unwrap_or_else(|| vec![input.clone()]),
        other => vec![other.clone()],
    }
}

fn property_error(property: &Value) -> Error {
    Error::argument(format!("cannot select the property '{}'", property.to_s()))
}

/// `item[property]`. `None` when the item cannot be indexed at all.
fn property(item: &Value, property: &Value, context: &Context) -> Result<Option<Value>> {
    let key = property.to_s();
    match item {
        Value::Object(map) => Ok(Some(map.get(&key).cloned().unwrap_or_default())),
        Value::Drop(drop) => invoke_drop(drop.as_ref(), &key, context).map(Some),
        Value::String(text) => Ok(Some(if text.contains(&key) {
            Value::from(key)
        } else {
            Value::Nil
        })),
        Value::Array(_) | Value::Integer(_) | Value::Range(..) => Err(property_error(property)),
        _ => Ok(None),
    }
}

/// Pair each item with `item[property]`. `None` when an item cannot be
/// indexed.
fn keyed_items(items: Vec<Value>, key: &Value, context: &Context) -> Result<Option<Vec<(Value, Value)>>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        match property(&item, key, context)? {
            Some(value) => keyed.push((value, item)),
            None => return Ok(None),
        }
    }
    Ok(Some(keyed))
}

fn nil_safe_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Some(Ordering::Equal),
        (Value::Nil, _) => Some(Ordering::Greater),
        (_, Value::Nil) => Some(Ordering::Less),
        _ => a.compare(b),
    }
}

#[allow(clippy::unnecessary_wraps)]
fn nil_safe_casecmp(a: &Value, b: &Value) -> Option<Ordering> {
    Some(match (a, b) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Nil, _) => Ordering::Greater,
        (_, Value::Nil) => Ordering::Less,
        _ => a
            .to_s()
            .to_ascii_lowercase()
            .cmp(&b.to_s().to_ascii_lowercase()),
    })
}

fn sort_keyed(
    mut keyed: Vec<(Value, Value)>,
    compare: fn(&Value, &Value) -> Option<Ordering>,
) -> Result<Value> {
    if let Some(anchor) = keyed.iter().map(|(key, _)| key).find(|key| !key.is_nil()) {
        if keyed.iter().any(|(key, _)| compare(key, anchor).is_none()) {
            return Err(Error::argument("cannot sort values of incompatible types"));
        }
    }
    keyed.sort_by(|(a, _), (b, _)| compare(a, b).unwrap_or(Ordering::Equal));
    Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
}

fn sort_with(
    input: &Value,
    args: &FilterArgs<'_>,
    compare: fn(&Value, &Value) -> Option<Ordering>,
) -> Result<Value> {
    let items = input_items(input);
    if items.is_empty() {
        return Ok(Value::Array(items));
    }
    match args.get(0).filter(|key| !key.is_nil()) {
        None => sort_keyed(items.into_iter().map(|item| (item.clone(), item)).collect(), compare),
        Some(key) => match keyed_items(items, key, args.context)? {
            Some(keyed) => sort_keyed(keyed, compare),
            None => Ok(Value::Nil),
        },
    }
}

fn sort(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    sort_with(&input, args, nil_safe_compare)
}

fn sort_natural(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    sort_with(&input, args, nil_safe_casecmp)
}

/// Items whose `property` is truthy, or equal to the target when one is
/// given.
fn filter_where(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let items = input_items(&input);
    if items.is_empty() {
        return Ok(Value::Array(items));
    }
    let target = args.get(1).filter(|value| !value.is_nil());
    let Some(keyed) = keyed_items(items, &args.value(0), args.context)? else {
        return Ok(Value::Nil);
    };
    Ok(Value::Array(
        keyed
            .into_iter()
            .filter(|(value, _)| target.map_or_else(|| value.is_truthy(), |target| value == target))
            .map(|(_, item)| item)
            .collect(),
    ))
}

fn uniq(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let items = input_items(&input);
    let keyed = match args.get(0).filter(|key| !key.is_nil()) {
        None => items.into_iter().map(|item| (item.clone(), item)).collect(),
        Some(_) if items.is_empty() => Vec::new(),
        Some(key) => match keyed_items(items, key, args.context)? {
            Some(keyed) => keyed,
            None => return Ok(Value::Nil),
        },
    };
    let mut seen: Vec<Value> = Vec::new();
    let mut unique = Vec::new();
    for (key, item) in keyed {
        if !seen.iter().any(|other| other.strict_eq(&key)) {
            seen.push(key);
            unique.push(item);
        }
    }
    Ok(Value::Array(unique))
}

fn map(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let key = args.value(0);
    let mut mapped = Vec::new();
    for item in input_items(&input) {
        if key.as_str() == Some("to_liquid") {
            mapped.push(item);
        } else {
            mapped.push(property(&item, &key, args.context)?.unwrap_or_default());
        }
    }
    Ok(Value::Array(mapped))
}

fn compact(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let items = input_items(&input);
    let Some(key) = args.get(0).filter(|key| !key.is_nil()) else {
        return Ok(Value::Array(items.into_iter().filter(|item| !item.is_nil()).collect()));
    };
    if items.is_empty() {
        return Ok(Value::Array(items));
    }
    let Some(keyed) = keyed_items(items, key, args.context)? else {
        return Ok(Value::Nil);
    };
    Ok(Value::Array(
        keyed
            .into_iter()
            .filter(|(value, _)| !value.is_nil())
            .map(|(_, item)| item)
            .collect(),
    ))
}

fn concat(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let Some(Value::Array(extra)) = args.get(0) else {
        return Err(Error::argument("concat filter requires an array argument"));
    };
    let mut items = input_items(&input);
    items.extend(extra.iter().cloned());
    Ok(Value::Array(items))
}

/// strftime formatting. Input that is not a date, or an empty format,
/// passes through unchanged.
fn date(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let format = args.value(0).to_s();
    if format.is_empty() {
        return Ok(input);
    }
    let Some(date) = to_date(&input) else {
        return Ok(input);
    };
    let mut out = String::new();
    match write!(out, "{}", date.format(&format)) {
        Ok(()) => Ok(Value::from(out)),
        Err(_) => Ok(input),
    }
}

/// Round to `n` places. Without a precision, or with `0`, the result is an
/// integer.
fn round(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let digits = match args.get(0).map_or(Number::Integer(0), to_number) {
        Number::Integer(digits) => digits,
        other => other.floor()?,
    };
    let rounded = to_number(&input).round(digits)?;
    if matches!(args.get(0), None | Some(Value::Integer(0))) {
        return Ok(Value::Integer(match rounded {
            Number::Integer(value) => value,
            other => other.floor()?,
        }));
    }
    Ok(rounded.into_value())
}

/// `default` applies to nil, false and empty values. With
/// `allow_false: true` a false input is kept.
fn default(input: Value, args: &FilterArgs<'_>) -> Result<Value> {
    let allow_false = args.keyword("allow_false").is_some_and(Value::is_truthy);
    let missing = if allow_false {
        input.is_nil()
    } else {
        !input.is_truthy()
    };
    if missing || input.is_empty() == Some(true) {
        return Ok(args.get(0).cloned().unwrap_or_else(|| Value::from("")));
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::template::Template;
    use crate::value::Object;
    use crate::value::Value;

    fn render(source: &str, data: serde_json::Value) -> String {
        let bindings: Object = Value::from(data).into_object().unwrap_or_default();
        Template::parse(source).unwrap().render(bindings).unwrap()
    }

    fn render_plain(source: &str) -> String {
        render(source, json!({}))
    }

    mod strings {
        use super::*;

        #[test]
        fn case_changes() {
            assert_eq!(render_plain("{{ 'Hello' | downcase }}"), "hello");
            assert_eq!(render_plain("{{ 'Hello' | upcase }}"), "HELLO");
            assert_eq!(render_plain("{{ 'hELLO wORLD' | capitalize }}"), "Hello world");
        }

        #[test]
        fn html_escaping() {
            insta::assert_snapshot!(
                render_plain("{{ '<p>a & \"b\"</p>' | escape }}"),
                @"&lt;p&gt;a &amp; &quot;b&quot;&lt;/p&gt;"
            );
            assert_eq!(
                render_plain("{{ '&lt;b&gt; & <i>' | escape_once }}"),
                "&lt;b&gt; &amp; &lt;i&gt;"
            );
            assert_eq!(render_plain("{{ \"it's\" | h }}"), "it&#39;s");
        }

        #[test]
        fn url_encoding() {
            assert_eq!(render_plain("{{ 'john@liquid.com' | url_encode }}"), "john%40liquid.com");
            assert_eq!(render_plain("{{ 'a b~c' | url_encode }}"), "a+b~c");
            assert_eq!(
                render_plain("{{ '%27Stop%21%27+said+Fred' | url_decode }}"),
                "'Stop!' said Fred"
            );
        }

        #[test]
        fn base64_round_trip() {
            assert_eq!(
                render_plain("{{ 'one two three' | base64_encode }}"),
                "b25lIHR3byB0aHJlZQ=="
            );
            assert_eq!(
                render_plain("{{ 'b25lIHR3byB0aHJlZQ==' | base64_decode }}"),
                "one two three"
            );
            assert_eq!(
                render_plain("{{ 'b25lIHR3byB0aHJlZQ' | base64_url_safe_decode }}"),
                "one two three"
            );
            assert_eq!(
                render_plain("{{ '@@' | base64_decode }}"),
                "Liquid error (line 1): invalid base64 provided to base64_decode"
            );
        }

        #[test]
        fn slicing() {
            assert_eq!(render_plain("{{ 'Liquid' | slice: 0 }}"), "L");
            assert_eq!(render_plain("{{ 'Liquid' | slice: 2, 5 }}"), "quid");
            assert_eq!(render_plain("{{ 'Liquid' | slice: -3, 2 }}"), "ui");
            assert_eq!(render_plain("{{ 'Liquid' | slice: 10 }}"), "");
            assert_eq!(
                render("{{ list | slice: 1, 2 | join: ',' }}", json!({"list": [1, 2, 3, 4]})),
                "2,3"
            );
        }

        #[test]
        fn truncation() {
            let title = "Ground control to Major Tom.";
            let data = json!({ "title": title });
            assert_eq!(render("{{ title | truncate: 20 }}", data.clone()), "Ground control to...");
            assert_eq!(
                render("{{ title | truncate: 25, ', and so on' }}", data.clone()),
                "Ground control, and so on"
            );
            assert_eq!(render("{{ title | truncate: 100 }}", data.clone()), title);
            assert_eq!(render("{{ title | truncatewords: 3 }}", data.clone()), "Ground control to...");
            assert_eq!(render("{{ title | truncatewords: 3, '' }}", data.clone()), "Ground control to");
            assert_eq!(render("{{ title | truncatewords: 0 }}", data), "Ground...");
            assert_eq!(render_plain("{{ 'abcdef' | truncate: -9223372036854775808 }}"), "...");
            assert_eq!(render_plain("{{ 'abcdef' | truncate: -1, 'xy' }}"), "xy");
        }

        #[test]
        fn splitting() {
            assert_eq!(render_plain("{{ 'a,b,,c,,' | split: ',' | join: '-' }}"), "a-b--c");
            assert_eq!(render_plain("{{ '  a  b ' | split: ' ' | join: '-' }}"), "a-b");
            assert_eq!(render_plain("{{ 'abc' | split: '' | join: '-' }}"), "a-b-c");
        }

        #[test]
        fn stripping() {
            assert_eq!(render_plain("[{{ '  x  ' | strip }}]"), "[x]");
            assert_eq!(render_plain("[{{ '  x  ' | lstrip }}]"), "[x  ]");
            assert_eq!(render_plain("[{{ '  x  ' | rstrip }}]"), "[  x]");
            assert_eq!(
                render_plain("{{ 'Have <em>you</em> read <script>x</script>Ulysses?' | strip_html }}"),
                "Have you read Ulysses?"
            );
            assert_eq!(
                render("{{ text | strip_newlines }}", json!({"text": "a\r\nb\nc"})),
                "abc"
            );
            assert_eq!(
                render("{{ text | newline_to_br }}", json!({"text": "a\nb"})),
                "a<br />\nb"
            );
        }

        #[test]
        fn replacing() {
            assert_eq!(render_plain("{{ 'my my' | replace: 'my', 'your' }}"), "your your");
            assert_eq!(render_plain("{{ 'my my' | replace_first: 'my', 'your' }}"), "your my");
            assert_eq!(render_plain("{{ 'my my' | replace_last: 'my', 'your' }}"), "my your");
            assert_eq!(render_plain("{{ 'abcabc' | remove: 'b' }}"), "acac");
            assert_eq!(render_plain("{{ 'abcabc' | remove_first: 'b' }}"), "acabc");
            assert_eq!(render_plain("{{ 'abcabc' | remove_last: 'b' }}"), "abcac");
            assert_eq!(render_plain("{{ 'b' | append: 'c' | prepend: 'a' }}"), "abc");
        }

        #[test]
        fn sizes() {
            assert_eq!(render_plain("{{ 'héllo' | size }}"), "5");
            assert_eq!(render("{{ list | size }}", json!({"list": [1, 2]})), "2");
            assert_eq!(render_plain("{{ nil | size }}"), "0");
        }
    }

    mod arrays {
        use super::*;

        #[test]
        fn join_flattens() {
            assert_eq!(render("{{ list | join }}", json!({"list": [1, [2, 3]]})), "1 2 3");
            assert_eq!(render("{{ list | join: ', ' }}", json!({"list": ["a", "b"]})), "a, b");
        }

        #[test]
        fn sorting() {
            let data = json!({
                "nums": [3, 1, 2],
                "words": ["b", "A", "c"],
                "gaps": [2, null, 1],
                "mixed": [1, "a"],
                "people": [{"name": "zed", "age": 3}, {"name": "amy", "age": 1}],
            });
            assert_eq!(render("{{ nums | sort | join: ',' }}", data.clone()), "1,2,3");
            assert_eq!(render("{{ words | sort | join: ',' }}", data.clone()), "A,b,c");
            assert_eq!(render("{{ words | sort_natural | join: ',' }}", data.clone()), "A,b,c");
            assert_eq!(render("{{ gaps | sort | join: ',' }}", data.clone()), "1,2,");
            assert_eq!(
                render("{{ people | sort: 'age' | map: 'name' | join: ',' }}", data.clone()),
                "amy,zed"
            );
            assert_eq!(
                render("{{ mixed | sort }}", data),
                "Liquid error (line 1): cannot sort values of incompatible types"
            );
        }

        #[test]
        fn where_selects() {
            let data = json!({"products": [
                {"name": "a", "available": true, "kind": "x"},
                {"name": "b", "available": false, "kind": "y"},
                {"name": "c", "available": true, "kind": "y"},
            ]});
            assert_eq!(
                render("{{ products | where: 'available' | map: 'name' | join: ',' }}", data.clone()),
                "a,c"
            );
            assert_eq!(
                render("{{ products | where: 'kind', 'y' | map: 'name' | join: ',' }}", data),
                "b,c"
            );
        }

        #[test]
        fn uniq_reverse_compact() {
            let data = json!({"list": [1, 1, 2, null, 2], "objs": [{"k": 1}, {"k": 1}, {"k": 2}]});
            assert_eq!(render("{{ list | uniq | join: ',' }}", data.clone()), "1,2,");
            assert_eq!(render("{{ objs | uniq: 'k' | size }}", data.clone()), "2");
            assert_eq!(render("{{ list | compact | join: ',' }}", data.clone()), "1,1,2,2");
            assert_eq!(render("{{ list | reverse | join: ',' }}", data), "2,,2,1,1");
        }

        #[test]
        fn map_errors_on_scalars() {
            assert_eq!(
                render("{{ list | map: 'x' }}", json!({"list": [1, 2]})),
                "Liquid error (line 1): cannot select the property 'x'"
            );
        }

        #[test]
        fn concat_first_last() {
            let data = json!({"a": [1, 2], "b": [3]});
            assert_eq!(render("{{ a | concat: b | join: ',' }}", data.clone()), "1,2,3");
            assert_eq!(render("{{ a | first }}-{{ a | last }}", data.clone()), "1-2");
            assert_eq!(
                render("{{ a | concat: 3 }}", data),
                "Liquid error (line 1): concat filter requires an array argument"
            );
        }
    }

    mod math {
        use super::*;

        #[test]
        fn arithmetic() {
            assert_eq!(render_plain("{{ 4 | plus: 2 }}"), "6");
            assert_eq!(render_plain("{{ 4.5 | plus: 2 }}"), "6.5");
            assert_eq!(render_plain("{{ 0.1 | plus: 0.2 }}"), "0.3");
            assert_eq!(render_plain("{{ 4 | minus: 6 }}"), "-2");
            assert_eq!(render_plain("{{ '3' | times: 2 }}"), "6");
            assert_eq!(render_plain("{{ 10 | divided_by: 3 }}"), "3");
            assert_eq!(render_plain("{{ -7 | divided_by: 2 }}"), "-4");
            assert_eq!(render_plain("{{ -7 | modulo: 3 }}"), "2");
            assert_eq!(render_plain("{{ -3 | abs }}"), "3");
        }

        #[test]
        fn zero_division() {
            assert_eq!(
                render_plain("{{ 1 | modulo: 0 }}"),
                "Liquid error (line 1): divided by 0"
            );
        }

        #[test]
        fn integer_extremes() {
            assert_eq!(render_plain("{{ -9223372036854775808 | modulo: -1 }}"), "0");
            assert_eq!(render_plain("{{ 7 | modulo: -1 }}"), "0");
            assert_eq!(
                render_plain("{{ 9223372036854775807 | round: -1 }}"),
                "9.223372036854776e+18"
            );
            assert_eq!(render_plain("{{ 1250 | round: -2 }}"), "1300");
        }

        #[test]
        fn rounding() {
            assert_eq!(render_plain("{{ 1.5 | ceil }}"), "2");
            assert_eq!(render_plain("{{ 1.5 | floor }}"), "1");
            assert_eq!(render_plain("{{ 4.5612 | round: 2 }}"), "4.56");
            assert_eq!(render_plain("{{ 2.5 | round }}"), "3");
            assert_eq!(render_plain("{{ 4 | at_least: 5 }}"), "5");
            assert_eq!(render_plain("{{ 4 | at_most: 3 }}"), "3");
            assert_eq!(render_plain("{{ 4 | at_most: 5 }}"), "4");
        }
    }

    mod misc {
        use super::*;

        #[test]
        fn defaults() {
            let data = json!({"empty": [], "flag": false});
            assert_eq!(render_plain("{{ nil | default: 'x' }}"), "x");
            assert_eq!(render_plain("{{ '' | default: 'x' }}"), "x");
            assert_eq!(render("{{ empty | default: 'x' }}", data.clone()), "x");
            assert_eq!(render("{{ flag | default: 'x' }}", data.clone()), "x");
            assert_eq!(render("{{ flag | default: 'x', allow_false: true }}", data), "false");
            assert_eq!(render_plain("{{ 'y' | default: 'x' }}"), "y");
        }

        #[test]
        fn dates() {
            assert_eq!(
                render_plain("{{ '2024-03-05 10:20:00' | date: '%Y/%m/%d %H:%M' }}"),
                "2024/03/05 10:20"
            );
            assert_eq!(render_plain("{{ 'soon' | date: '%Y' }}"), "soon");
            assert_eq!(render_plain("{{ '2024-03-05' | date: '' }}"), "2024-03-05");
        }

        #[test]
        fn wrong_argument_count() {
            assert_eq!(
                render_plain("{{ 'a' | upcase: 1 }}"),
                "Liquid error (line 1): wrong number of arguments (given 2, expected 1)"
            );
        }
    }
}

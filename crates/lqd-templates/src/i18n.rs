use std::sync::LazyLock;

use toml::Table;
use toml::Value as TomlValue;

const EN: &str = include_str!("locales/en.toml");

static DEFAULT_LOCALE: LazyLock<I18n> = LazyLock::new(|| I18n::from_toml(EN).unwrap_or_default());

/// A message catalog for user facing errors.
///
/// Keys are dotted paths into a nested TOML table, for example
/// `errors.syntax.unknown_tag`. Values may contain `%{name}` placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct I18n {
    catalog: Table,
}

impl I18n {
    /// Parse a catalog from TOML source.
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        let catalog = source.parse::<Table>()?;
        Ok(Self { catalog })
    }

    /// The built-in English catalog.
    #[must_use]
    pub fn english() -> Self {
        DEFAULT_LOCALE.clone()
    }

    /// Look up `key` and substitute `vars`. Missing keys produce a
    /// marker naming the key instead of failing, and unknown
    /// placeholders are left as written.
    #[must_use]
    pub fn translate(&self, key: &str, vars: &[(&str, &str)]) -> String {
        let Some(template) = self.lookup(key) else {
            tracing::warn!(key, "missing translation");
            return format!("Translation for {key} does not exist");
        };
        interpolate(template, vars)
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.catalog.get(first)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        match current {
            TomlValue::String(s) => Some(s),
            _ => None,
        }
    }
}

fn interpolate(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.iter().find(|(var, _)| *var == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_catalog_loads() {
        let locale = I18n::english();
        assert_eq!(
            locale.translate("errors.syntax.unknown_tag", &[("tag", "foo")]),
            "Unknown tag 'foo'"
        );
    }

    #[test]
    fn multiple_placeholders() {
        let locale = I18n::english();
        assert_eq!(
            locale.translate(
                "errors.syntax.invalid_delimiter",
                &[
                    ("tag", "endfor"),
                    ("block_name", "if"),
                    ("block_delimiter", "endif")
                ]
            ),
            "'endfor' is not a valid delimiter for if tags. use endif"
        );
    }

    #[test]
    fn missing_key() {
        let locale = I18n::english();
        assert_eq!(
            locale.translate("errors.syntax.nope", &[]),
            "Translation for errors.syntax.nope does not exist"
        );
    }

    #[test]
    fn custom_catalog() {
        let locale = I18n::from_toml("[greeting]\nhello = \"Hallo %{name}, %{other}\"").unwrap();
        assert_eq!(
            locale.translate("greeting.hello", &[("name", "Welt")]),
            "Hallo Welt, %{other}"
        );
    }
}

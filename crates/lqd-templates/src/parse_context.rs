use std::sync::Arc;

use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::i18n::I18n;

/// How strictly tag and variable markup is parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorMode {
    /// Accept malformed markup and make the best of it.
    #[default]
    Lax,
    /// Parse strictly, but record failures as warnings and fall back to lax.
    Warn,
    /// Reject malformed markup.
    Strict,
}

/// Options for [`crate::Template::parse_with`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Overrides the environment's error mode.
    pub error_mode: Option<ErrorMode>,
    /// Track line numbers for error messages.
    pub line_numbers: bool,
    /// Overrides the environment's locale.
    pub locale: Option<Arc<I18n>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: None,
            line_numbers: true,
            locale: None,
        }
    }
}

/// State threaded through a single parse.
#[derive(Debug)]
pub struct ParseContext {
    environment: Arc<Environment>,
    options: ParseOptions,
    error_mode: ErrorMode,
    locale: Arc<I18n>,
    line_number: Option<usize>,
    warnings: Vec<Error>,
    depth: usize,
    pub(crate) trim_whitespace: bool,
    partial: bool,
}

impl ParseContext {
    #[must_use]
    pub fn new(environment: Arc<Environment>, options: &ParseOptions) -> Self {
        let error_mode = options.error_mode.unwrap_or(environment.error_mode());
        let locale = options
            .locale
            .clone()
            .unwrap_or_else(|| environment.locale().clone());
        Self {
            environment,
            options: options.clone(),
            error_mode,
            locale,
            line_number: options.line_numbers.then_some(1),
            warnings: Vec::new(),
            depth: 0,
            trim_whitespace: false,
            partial: false,
        }
    }

    #[must_use]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    #[must_use]
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    #[must_use]
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    #[must_use]
    pub fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    pub(crate) fn set_line_number(&mut self, line_number: Option<usize>) {
        self.line_number = line_number;
    }

    #[must_use]
    pub fn locale(&self) -> &I18n {
        &self.locale
    }

    #[must_use]
    pub fn translate(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.locale.translate(key, vars)
    }

    /// A syntax error with the message at `errors.syntax.<key>`.
    #[must_use]
    pub fn syntax_error(&self, key: &str, vars: &[(&str, &str)]) -> Error {
        Error::syntax(self.translate(&format!("errors.syntax.{key}"), vars))
    }

    /// Parse with `strict` or `lax` depending on the error mode.
    ///
    /// Strict failures carry the current line and `markup_context`. In warn
    /// mode they are recorded and the lax parser is used instead.
    pub fn parse_with_selected_parser<T>(
        &mut self,
        markup_context: &str,
        strict: impl FnOnce(&mut Self) -> Result<T>,
        lax: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        match self.error_mode {
            ErrorMode::Lax => lax(self),
            ErrorMode::Strict => strict(self).map_err(|err| self.with_error_context(err, markup_context)),
            ErrorMode::Warn => match strict(self) {
                Ok(parsed) => Ok(parsed),
                Err(err) if err.kind() == crate::error::ErrorKind::Syntax => {
                    let warning = self.with_error_context(err, markup_context);
                    tracing::debug!(%warning, "falling back to lax parsing");
                    self.warnings.push(warning);
                    lax(self)
                }
                Err(err) => Err(err),
            },
        }
    }

    fn with_error_context(&self, err: Error, markup_context: &str) -> Error {
        let err = err.with_line_number(self.line_number);
        if err.markup_context().is_some() {
            return err;
        }
        err.with_markup_context(format!("in \"{}\"", markup_context.trim()))
    }

    #[must_use]
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.warnings)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn increment_depth(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    pub(crate) fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_context(error_mode: ErrorMode) -> ParseContext {
        ParseContext::new(
            Environment::global(),
            &ParseOptions {
                error_mode: Some(error_mode),
                ..ParseOptions::default()
            },
        )
    }

    fn strict_fails(_: &mut ParseContext) -> Result<&'static str> {
        Err(Error::syntax("Unexpected character &"))
    }

    fn lax_succeeds(_: &mut ParseContext) -> Result<&'static str> {
        Ok("lax")
    }

    #[test]
    fn lax_mode_skips_strict_parser() {
        let mut ctx = parse_context(ErrorMode::Lax);
        let parsed = ctx
            .parse_with_selected_parser("x & y", strict_fails, lax_succeeds)
            .unwrap();
        assert_eq!(parsed, "lax");
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn strict_mode_attaches_context() {
        let mut ctx = parse_context(ErrorMode::Strict);
        let err = ctx
            .parse_with_selected_parser(" x & y ", strict_fails, lax_succeeds)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Liquid syntax error (line 1): Unexpected character & in \"x & y\""
        );
    }

    #[test]
    fn warn_mode_records_and_falls_back() {
        let mut ctx = parse_context(ErrorMode::Warn);
        let parsed = ctx
            .parse_with_selected_parser("x & y", strict_fails, lax_succeeds)
            .unwrap();
        assert_eq!(parsed, "lax");
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.warnings()[0].line_number(), Some(1));
    }

    #[test]
    fn syntax_errors_are_translated() {
        let ctx = parse_context(ErrorMode::Lax);
        let err = ctx.syntax_error("unknown_tag", &[("tag", "foo")]);
        assert_eq!(err.message(), "Unknown tag 'foo'");
    }

    #[test]
    fn line_numbers_can_be_disabled() {
        let ctx = ParseContext::new(
            Environment::global(),
            &ParseOptions {
                line_numbers: false,
                ..ParseOptions::default()
            },
        );
        assert_eq!(ctx.line_number(), None);
    }
}

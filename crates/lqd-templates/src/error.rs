use thiserror::Error;

/// Classification of engine errors.
///
/// The kind decides how an error is treated while rendering: lookup misses are
/// recorded silently, fatal kinds always abort, everything else is recorded
/// and rendered inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Argument,
    UndefinedVariable,
    UndefinedDropMethod,
    UndefinedFilter,
    StackLevel,
    Memory,
    ZeroDivision,
    FloatDomain,
    Context,
    FileSystem,
    Disabled,
    Internal,
}

impl ErrorKind {
    /// Errors that abort a render no matter which exception renderer is set.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Memory | Self::StackLevel)
    }

    /// Strict-mode lookup failures. They are recorded but never written to
    /// the output.
    #[must_use]
    pub fn is_undefined(self) -> bool {
        matches!(
            self,
            Self::UndefinedVariable | Self::UndefinedDropMethod | Self::UndefinedFilter
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{}{message}{}",
    message_prefix(.kind, .line_number, .template_name),
    markup_suffix(.markup_context)
)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    line_number: Option<usize>,
    template_name: Option<String>,
    markup_context: Option<String>,
}

#[allow(clippy::ref_option)]
fn message_prefix(
    kind: &ErrorKind,
    line_number: &Option<usize>,
    template_name: &Option<String>,
) -> String {
    let mut prefix = String::from(if *kind == ErrorKind::Syntax {
        "Liquid syntax error"
    } else {
        "Liquid error"
    });
    if let Some(line) = line_number {
        match template_name {
            Some(name) => prefix.push_str(&format!(" ({name} line {line})")),
            None => prefix.push_str(&format!(" (line {line})")),
        }
    }
    prefix.push_str(": ");
    prefix
}

#[allow(clippy::ref_option)]
fn markup_suffix(markup_context: &Option<String>) -> String {
    markup_context
        .as_ref()
        .map(|context| format!(" {context}"))
        .unwrap_or_default()
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line_number: None,
            template_name: None,
            markup_context: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, message)
    }

    #[must_use]
    pub fn undefined_variable(key: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("undefined variable {key}"),
        )
    }

    #[must_use]
    pub fn undefined_drop_method(method: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedDropMethod,
            format!("undefined method {method}"),
        )
    }

    #[must_use]
    pub fn undefined_filter(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedFilter, format!("undefined filter {name}"))
    }

    #[must_use]
    pub fn stack_level() -> Self {
        Self::new(ErrorKind::StackLevel, "Nesting too deep")
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::new(ErrorKind::Memory, "Memory limits exceeded")
    }

    #[must_use]
    pub fn zero_division() -> Self {
        Self::new(ErrorKind::ZeroDivision, "divided by 0")
    }

    pub fn float_domain(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FloatDomain, message)
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Context, message)
    }

    pub fn file_system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileSystem, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    #[must_use]
    pub fn markup_context(&self) -> Option<&str> {
        self.markup_context.as_deref()
    }

    /// Attach a line number unless one is already recorded. Errors bubble up
    /// through enclosing blocks and the innermost location wins.
    #[must_use]
    pub fn with_line_number(mut self, line_number: Option<usize>) -> Self {
        if self.line_number.is_none() {
            self.line_number = line_number;
        }
        self
    }

    /// Attach a template name unless one is already recorded.
    #[must_use]
    pub fn with_template_name(mut self, template_name: Option<&str>) -> Self {
        if self.template_name.is_none() {
            self.template_name = template_name.map(str::to_owned);
        }
        self
    }

    #[must_use]
    pub fn with_markup_context(mut self, markup_context: impl Into<String>) -> Self {
        self.markup_context = Some(markup_context.into());
        self
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_prefix() {
        let err = Error::syntax("Unknown tag 'foo'");
        assert_eq!(err.to_string(), "Liquid syntax error: Unknown tag 'foo'");
    }

    #[test]
    fn line_and_template_prefix() {
        let err = Error::zero_division().with_line_number(Some(3));
        assert_eq!(err.to_string(), "Liquid error (line 3): divided by 0");

        let err = err.with_template_name(Some("product"));
        assert_eq!(err.to_string(), "Liquid error (product line 3): divided by 0");
    }

    #[test]
    fn markup_context_suffix() {
        let err = Error::syntax("Expected id but found pipe")
            .with_line_number(Some(1))
            .with_markup_context("in \"{{ a | | b }}\"");
        assert_eq!(
            err.to_string(),
            "Liquid syntax error (line 1): Expected id but found pipe in \"{{ a | | b }}\""
        );
    }

    #[test]
    fn first_location_wins() {
        let err = Error::argument("bad")
            .with_line_number(Some(2))
            .with_line_number(Some(9))
            .with_template_name(Some("inner"))
            .with_template_name(Some("outer"));
        assert_eq!(err.line_number(), Some(2));
        assert_eq!(err.template_name(), Some("inner"));
    }

    #[test]
    fn fatal_kinds() {
        assert!(ErrorKind::Memory.is_fatal());
        assert!(ErrorKind::StackLevel.is_fatal());
        assert!(!ErrorKind::Argument.is_fatal());
        assert!(ErrorKind::UndefinedFilter.is_undefined());
        assert!(!ErrorKind::Syntax.is_undefined());
    }
}

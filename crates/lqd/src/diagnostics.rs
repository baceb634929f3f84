use std::io::IsTerminal;

use lqd_source::Diagnostic;
use lqd_source::DiagnosticRenderer;
use lqd_source::Severity;
use lqd_templates::Error;
use lqd_templates::ErrorKind;

pub fn pick_renderer() -> DiagnosticRenderer {
    if std::io::stderr().is_terminal() {
        DiagnosticRenderer::styled()
    } else {
        DiagnosticRenderer::plain()
    }
}

/// Render an engine error against the template it came from.
pub fn render_error(
    renderer: &DiagnosticRenderer,
    source: &str,
    path: &str,
    error: &Error,
    severity: Severity,
) -> String {
    let message = match error.markup_context() {
        Some(markup) => format!("{} {markup}", error.message()),
        None => error.message().to_owned(),
    };
    let note = error
        .template_name()
        .map(|name| format!("raised in partial '{name}'"));
    let mut diagnostic = Diagnostic::at_line(
        source,
        path,
        code(error.kind()),
        &message,
        severity,
        error.line_number(),
        label(error.kind()),
    );
    if let Some(note) = &note {
        diagnostic = diagnostic.note(note);
    }
    renderer.render(&diagnostic)
}

fn code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Syntax => "syntax",
        ErrorKind::Argument => "argument",
        ErrorKind::UndefinedVariable => "undefined-variable",
        ErrorKind::UndefinedDropMethod => "undefined-drop-method",
        ErrorKind::UndefinedFilter => "undefined-filter",
        ErrorKind::StackLevel => "stack-level",
        ErrorKind::Memory => "memory",
        ErrorKind::ZeroDivision => "zero-division",
        ErrorKind::FloatDomain => "float-domain",
        ErrorKind::Context => "context",
        ErrorKind::FileSystem => "file-system",
        ErrorKind::Disabled => "disabled",
        ErrorKind::Internal => "internal",
    }
}

fn label(kind: ErrorKind) -> &'static str {
    if kind == ErrorKind::Syntax {
        "invalid markup"
    } else {
        "raised here"
    }
}

#[cfg(test)]
mod tests {
    use lqd_templates::Template;

    use super::*;

    #[test]
    fn syntax_error_points_at_its_line() {
        let source = "hello\n{% frobnicate %}\n";
        let Err(error) = Template::parse(source) else {
            panic!("expected a syntax error");
        };
        let output = render_error(
            &DiagnosticRenderer::plain(),
            source,
            "page.liquid",
            &error,
            Severity::Error,
        );
        assert!(output.contains("error[syntax]"), "{output}");
        assert!(output.contains("page.liquid"), "{output}");
        assert!(output.contains("{% frobnicate %}"), "{output}");
    }

    #[test]
    fn partial_errors_carry_a_note() {
        let error = Error::new(ErrorKind::ZeroDivision, "divided by 0")
            .with_line_number(Some(1))
            .with_template_name(Some("card"));
        let output = render_error(
            &DiagnosticRenderer::plain(),
            "{{ 1 | divided_by: 0 }}",
            "page.liquid",
            &error,
            Severity::Warning,
        );
        assert!(output.contains("warning[zero-division]"), "{output}");
        assert!(output.contains("raised in partial 'card'"), "{output}");
    }
}

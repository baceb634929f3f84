use annotate_snippets::AnnotationKind;
use annotate_snippets::Level;
use annotate_snippets::Renderer;
use annotate_snippets::Snippet;

use crate::LineIndex;
use crate::Span;

/// Label printed in front of a rendered diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A highlighted region of the template source.
#[derive(Debug, Clone)]
pub struct DiagnosticAnnotation<'a> {
    pub span: Span,
    pub label: &'a str,
    pub primary: bool,
}

/// A template problem ready for display.
///
/// Engine errors only know which line they came from, so the usual way to
/// build one is [`Diagnostic::at_line`], which annotates the whole line.
#[derive(Debug)]
pub struct Diagnostic<'a> {
    pub source: &'a str,
    pub path: &'a str,
    pub code: &'a str,
    pub message: &'a str,
    pub severity: Severity,
    pub annotations: Vec<DiagnosticAnnotation<'a>>,
    pub notes: Vec<&'a str>,
}

impl<'a> Diagnostic<'a> {
    #[must_use]
    pub fn new(
        source: &'a str,
        path: &'a str,
        code: &'a str,
        message: &'a str,
        severity: Severity,
    ) -> Self {
        Self {
            source,
            path,
            code,
            message,
            severity,
            annotations: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Diagnostic pointing at a one-based line. Lines outside the source are
    /// ignored and the diagnostic renders without a snippet annotation.
    #[must_use]
    pub fn at_line(
        source: &'a str,
        path: &'a str,
        code: &'a str,
        message: &'a str,
        severity: Severity,
        line_number: Option<usize>,
        label: &'a str,
    ) -> Self {
        let diagnostic = Self::new(source, path, code, message, severity);
        let index = LineIndex::from_text(source);
        match line_number.and_then(|line| index.line_span(line)) {
            Some(span) => diagnostic.annotation(span, label, true),
            None => diagnostic,
        }
    }

    #[must_use]
    pub fn annotation(mut self, span: Span, label: &'a str, primary: bool) -> Self {
        self.annotations.push(DiagnosticAnnotation {
            span,
            label,
            primary,
        });
        self
    }

    #[must_use]
    pub fn note(mut self, note: &'a str) -> Self {
        self.notes.push(note);
        self
    }
}

/// Renders diagnostics with `annotate-snippets`, plain for pipes and tests,
/// styled for terminals.
#[derive(Debug)]
pub struct DiagnosticRenderer {
    renderer: Renderer,
}

impl DiagnosticRenderer {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            renderer: Renderer::plain(),
        }
    }

    #[must_use]
    pub fn styled() -> Self {
        Self {
            renderer: Renderer::styled(),
        }
    }

    #[must_use]
    pub fn render(&self, diagnostic: &Diagnostic<'_>) -> String {
        let level = match diagnostic.severity {
            Severity::Error => Level::ERROR,
            Severity::Warning => Level::WARNING,
        };

        let mut snippet = Snippet::source(diagnostic.source)
            .path(diagnostic.path)
            .line_start(1);

        for ann in &diagnostic.annotations {
            let start = ann.span.start_usize().min(diagnostic.source.len());
            let end = (start + ann.span.length_usize()).min(diagnostic.source.len());
            let kind = if ann.primary {
                AnnotationKind::Primary
            } else {
                AnnotationKind::Context
            };
            snippet = snippet.annotation(kind.span(start..end).label(ann.label));
        }

        let mut title = level
            .primary_title(diagnostic.message)
            .id(diagnostic.code)
            .element(snippet);

        for note in &diagnostic.notes {
            title = title.element(Level::NOTE.message(*note));
        }

        let report = &[title];
        self.renderer.render(report).clone()
    }
}

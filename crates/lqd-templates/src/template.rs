use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::context::ContextBuilder;
use crate::context::ExceptionRenderer;
use crate::context::GlobalFilter;
use crate::document::Document;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::file_system::FileSystem;
use crate::parse_context::ParseContext;
use crate::parse_context::ParseOptions;
use crate::resource_limits::ResourceLimitsConfig;
use crate::strainer::FilterSet;
use crate::tokenizer::Tokenizer;
use crate::value::Object;

/// Options for a single render.
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Host-defined registers, readable by custom tags and filters.
    pub registers: Object,
    /// Filter sets added for this render on top of the environment's.
    pub filters: Vec<Arc<FilterSet>>,
    pub strict_variables: bool,
    pub strict_filters: bool,
    /// Applied to every `{{ }}` output after its filters.
    pub global_filter: Option<GlobalFilter>,
    /// Text written in place of a recovered error.
    pub exception_renderer: Option<ExceptionRenderer>,
    /// Fail the render on the first error instead of recovering.
    pub rethrow_errors: bool,
    /// Overrides the environment's limits.
    pub resource_limits: Option<ResourceLimitsConfig>,
    /// Overrides the environment's file system.
    pub file_system: Option<Arc<dyn FileSystem>>,
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("registers", &self.registers)
            .field("filters", &self.filters)
            .field("strict_variables", &self.strict_variables)
            .field("strict_filters", &self.strict_filters)
            .field("rethrow_errors", &self.rethrow_errors)
            .field("resource_limits", &self.resource_limits)
            .finish_non_exhaustive()
    }
}

impl RenderOptions {
    /// A context builder with these options applied.
    #[must_use]
    pub fn context_builder(&self, environment: Arc<Environment>) -> ContextBuilder {
        let mut builder = Context::builder(environment)
            .registers(self.registers.clone())
            .strict_variables(self.strict_variables)
            .strict_filters(self.strict_filters)
            .rethrow_errors(self.rethrow_errors);
        for set in &self.filters {
            builder = builder.filters(set.clone());
        }
        if let Some(filter) = &self.global_filter {
            builder = builder.global_filter(filter.clone());
        }
        if let Some(renderer) = &self.exception_renderer {
            builder = builder.exception_renderer(renderer.clone());
        }
        if let Some(limits) = self.resource_limits {
            builder = builder.resource_limits(limits);
        }
        if let Some(file_system) = &self.file_system {
            builder = builder.file_system(file_system.clone());
        }
        builder
    }
}

/// A parsed template. Parsing happens once; rendering any number of times,
/// each with its own [`Context`].
#[derive(Debug)]
pub struct Template {
    name: Option<String>,
    root: Document,
    warnings: Vec<Error>,
    environment: Arc<Environment>,
}

impl Template {
    /// Parse with the global environment and default options.
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(source, Environment::global(), &ParseOptions::default())
    }

    pub fn parse_with(
        source: &str,
        environment: Arc<Environment>,
        options: &ParseOptions,
    ) -> Result<Self> {
        let mut parse_context = ParseContext::new(environment.clone(), options);
        Self::parse_in(source, environment, &mut parse_context)
    }

    pub(crate) fn parse_partial(
        source: &str,
        environment: Arc<Environment>,
        options: &ParseOptions,
        name: &str,
    ) -> Result<Self> {
        let mut parse_context = ParseContext::new(environment.clone(), options);
        parse_context.set_partial(true);
        let template = Self::parse_in(source, environment, &mut parse_context)
            .map_err(|err| err.with_template_name(Some(name)))?;
        Ok(template.with_name(name))
    }

    fn parse_in(
        source: &str,
        environment: Arc<Environment>,
        parse_context: &mut ParseContext,
    ) -> Result<Self> {
        let line_numbers = parse_context.line_number().is_some();
        let mut tokenizer = Tokenizer::new(source, line_numbers);
        let root = Document::parse(&mut tokenizer, parse_context)?;
        let warnings = parse_context.take_warnings();
        tracing::debug!(
            bytes = source.len(),
            warnings = warnings.len(),
            "parsed template"
        );
        Ok(Self {
            name: None,
            root,
            warnings,
            environment,
        })
    }

    /// Name used in error messages.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Syntax errors recovered from in warn mode.
    #[must_use]
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    #[must_use]
    pub fn root(&self) -> &Document {
        &self.root
    }

    #[must_use]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Render with `bindings` as the variable environment.
    pub fn render(&self, bindings: Object) -> Result<String> {
        self.render_with(bindings, &RenderOptions::default())
    }

    pub fn render_with(&self, bindings: Object, options: &RenderOptions) -> Result<String> {
        let mut context = options
            .context_builder(self.environment.clone())
            .environment(bindings)
            .build();
        self.render_in(&mut context)
    }

    /// Render with an existing context. Recovered errors stay available
    /// through [`Context::errors`].
    pub fn render_in(&self, context: &mut Context) -> Result<String> {
        let mut output = String::new();
        self.render_to_output_buffer(context, &mut output)?;
        Ok(output)
    }

    /// Render, appending to `output`. Resource usage starts from zero.
    ///
    /// Exceeding a resource limit or the nesting depth fails the whole
    /// render.
    pub fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> Result<()> {
        context.resource_limits_mut().reset();
        if context.template_name().is_none() {
            context.set_template_name(self.name.clone());
        }
        match self.root.render_to_output_buffer(context, output) {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.kind().is_fatal() {
                    tracing::warn!(%err, "render aborted");
                }
                Err(err)
            }
        }
    }
}

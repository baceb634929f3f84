use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::environment::Environment;
use crate::error::Result;
use crate::parse_context::ParseOptions;
use crate::template::Template;

/// Turns partial source into a template.
pub trait TemplateFactory: fmt::Debug + Send + Sync {
    fn for_partial(
        &self,
        name: &str,
        source: &str,
        environment: &Arc<Environment>,
        options: &ParseOptions,
    ) -> Result<Template>;
}

/// Parses partials with the including template's environment and options.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplateFactory;

impl TemplateFactory for DefaultTemplateFactory {
    fn for_partial(
        &self,
        name: &str,
        source: &str,
        environment: &Arc<Environment>,
        options: &ParseOptions,
    ) -> Result<Template> {
        Template::parse_partial(source, environment.clone(), options, name)
    }
}

/// Load a partial through the context's file system, parsing each name at
/// most once per render.
pub fn load_partial(
    context: &mut Context,
    name: &str,
    environment: &Arc<Environment>,
    options: &ParseOptions,
) -> Result<Arc<Template>> {
    if let Some(cached) = context.registers().cached_partials.get(name) {
        return Ok(cached.clone());
    }

    let source = context.registers().file_system().read_template_file(name)?;
    tracing::debug!(partial = name, "parsing partial");
    let factory = context.registers().template_factory().clone();
    let template = Arc::new(factory.for_partial(name, &source, environment, options)?);
    context
        .registers_mut()
        .cached_partials
        .insert(name.to_owned(), template.clone());
    Ok(template)
}

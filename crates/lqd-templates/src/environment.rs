use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::file_system::BlankFileSystem;
use crate::file_system::FileSystem;
use crate::i18n::I18n;
use crate::parse_context::ErrorMode;
use crate::resource_limits::ResourceLimitsConfig;
use crate::standard_filters;
use crate::strainer::FilterSet;
use crate::strainer::StrainerFactory;
use crate::tag::TagParser;
use crate::tag::TagRegistry;
use crate::tags;

static GLOBAL: LazyLock<RwLock<Arc<Environment>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Environment::builder().build())));

/// Everything a parse or render needs beyond its input: registered tags
/// and filters, defaults for error mode and limits, the locale and the
/// partial file system.
///
/// Environments are immutable. [`Environment::global`] is the process-wide
/// default; registering into it swaps in a modified copy, so templates
/// already parsed keep the environment they were parsed with.
#[derive(Debug, Clone)]
pub struct Environment {
    tags: TagRegistry,
    filter_sets: Vec<Arc<FilterSet>>,
    strainer_factory: Arc<StrainerFactory>,
    error_mode: ErrorMode,
    locale: Arc<I18n>,
    file_system: Arc<dyn FileSystem>,
    resource_limits: ResourceLimitsConfig,
}

impl Environment {
    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// The process-wide default environment.
    #[must_use]
    pub fn global() -> Arc<Environment> {
        GLOBAL.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the global environment.
    pub fn set_global(environment: Environment) {
        *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(environment);
    }

    /// Register a tag in the global environment.
    pub fn register_global_tag(name: &str, parser: impl TagParser + 'static) {
        Self::update_global(|env| env.tags.register(name, parser));
    }

    /// Add a filter set to the global environment.
    pub fn register_global_filters(set: FilterSet) {
        Self::update_global(|env| {
            env.filter_sets.push(Arc::new(set));
            env.strainer_factory = Arc::new(StrainerFactory::new(env.filter_sets.clone()));
        });
    }

    fn update_global(update: impl FnOnce(&mut Environment)) {
        let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
        let mut environment = Environment::clone(&global);
        update(&mut environment);
        tracing::debug!(tags = environment.tags.names().len(), "updated global environment");
        *global = Arc::new(environment);
    }

    #[must_use]
    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    #[must_use]
    pub fn filter_sets(&self) -> &[Arc<FilterSet>] {
        &self.filter_sets
    }

    #[must_use]
    pub fn strainer_factory(&self) -> &StrainerFactory {
        &self.strainer_factory
    }

    #[must_use]
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    #[must_use]
    pub fn locale(&self) -> &Arc<I18n> {
        &self.locale
    }

    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    #[must_use]
    pub fn resource_limits(&self) -> ResourceLimitsConfig {
        self.resource_limits
    }
}

/// Configures an [`Environment`]. Starts with the standard tags and filters.
#[derive(Debug)]
pub struct EnvironmentBuilder {
    tags: TagRegistry,
    filter_sets: Vec<Arc<FilterSet>>,
    error_mode: ErrorMode,
    locale: Option<Arc<I18n>>,
    file_system: Arc<dyn FileSystem>,
    resource_limits: ResourceLimitsConfig,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            tags: tags::builtins(),
            filter_sets: vec![Arc::new(standard_filters::standard_filters())],
            error_mode: ErrorMode::default(),
            locale: None,
            file_system: Arc::new(BlankFileSystem),
            resource_limits: ResourceLimitsConfig::default(),
        }
    }
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn tag(mut self, name: &str, parser: impl TagParser + 'static) -> Self {
        self.tags.register(name, parser);
        self
    }

    /// Remove a standard tag.
    #[must_use]
    pub fn without_tag(mut self, name: &str) -> Self {
        self.tags.remove(name);
        self
    }

    #[must_use]
    pub fn filters(mut self, set: FilterSet) -> Self {
        self.filter_sets.push(Arc::new(set));
        self
    }

    #[must_use]
    pub fn error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: I18n) -> Self {
        self.locale = Some(Arc::new(locale));
        self
    }

    #[must_use]
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = file_system;
        self
    }

    #[must_use]
    pub fn resource_limits(mut self, limits: ResourceLimitsConfig) -> Self {
        self.resource_limits = limits;
        self
    }

    #[must_use]
    pub fn build(self) -> Environment {
        Environment {
            strainer_factory: Arc::new(StrainerFactory::new(self.filter_sets.clone())),
            tags: self.tags,
            filter_sets: self.filter_sets,
            error_mode: self.error_mode,
            locale: self.locale.unwrap_or_else(|| Arc::new(I18n::english())),
            file_system: self.file_system,
            resource_limits: self.resource_limits,
        }
    }
}

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use lqd_conf::Settings;
use lqd_templates::Environment;
use lqd_templates::ErrorMode;
use lqd_templates::LocalFileSystem;
use lqd_templates::ParseOptions;
use lqd_templates::RenderOptions;
use lqd_templates::ResourceLimitsConfig;

/// The directory commands run in, with its layered settings.
#[derive(Debug)]
pub struct Project {
    root: Utf8PathBuf,
    settings: Settings,
}

impl Project {
    /// Load settings for the current directory.
    pub fn discover() -> Result<Self> {
        let root = resolve_project_root()?;
        let settings = Settings::new(root.as_std_path()).context("Failed to load settings")?;
        Ok(Self { root, settings })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve `path` against the project root.
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_owned()
        }
    }

    /// An environment with partials served from `template_root` (or the
    /// configured one) and the configured resource limits.
    pub fn environment(&self, template_root: Option<&Utf8Path>) -> Arc<Environment> {
        let limits = self.settings.limits;
        let mut builder = Environment::builder()
            .error_mode(self.error_mode())
            .resource_limits(ResourceLimitsConfig {
                render_length_limit: limits.render_length,
                render_score_limit: limits.render_score,
                assign_score_limit: limits.assign_score,
            });

        let root = template_root
            .map(|root| self.resolve(root))
            .or_else(|| self.settings.template_root(&self.root));
        if let Some(root) = root {
            tracing::debug!(root = %root, pattern = %self.settings.partial_pattern, "partials enabled");
            builder = builder.file_system(Arc::new(LocalFileSystem::with_pattern(
                root,
                self.settings.partial_pattern.clone(),
            )));
        }

        Arc::new(builder.build())
    }

    pub fn parse_options(&self, strict: bool) -> ParseOptions {
        ParseOptions {
            error_mode: Some(if strict {
                ErrorMode::Strict
            } else {
                self.error_mode()
            }),
            line_numbers: self.settings.line_numbers,
            locale: None,
        }
    }

    pub fn render_options(&self, strict: bool) -> RenderOptions {
        RenderOptions {
            strict_variables: strict || self.settings.strict_variables,
            strict_filters: strict || self.settings.strict_filters,
            ..RenderOptions::default()
        }
    }

    fn error_mode(&self) -> ErrorMode {
        match self.settings.error_mode {
            lqd_conf::ErrorMode::Lax => ErrorMode::Lax,
            lqd_conf::ErrorMode::Warn => ErrorMode::Warn,
            lqd_conf::ErrorMode::Strict => ErrorMode::Strict,
        }
    }
}

fn resolve_project_root() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| anyhow::anyhow!("Current directory is not valid UTF-8"))
}

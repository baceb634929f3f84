use std::path::Path;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
}

/// How malformed markup is treated while parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    #[default]
    Lax,
    Warn,
    Strict,
}

/// Resource quotas applied to every render. Unset means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub render_length: Option<usize>,
    pub render_score: Option<usize>,
    pub assign_score: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub error_mode: ErrorMode,
    pub line_numbers: bool,
    pub strict_variables: bool,
    pub strict_filters: bool,
    /// Directory partials are loaded from. Relative paths resolve against the
    /// project root.
    pub template_root: Option<Utf8PathBuf>,
    pub partial_pattern: String,
    pub limits: Limits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            error_mode: ErrorMode::default(),
            line_numbers: true,
            strict_variables: false,
            strict_filters: false,
            template_root: None,
            partial_pattern: String::from("_%s.liquid"),
            limits: Limits::default(),
        }
    }
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("dev", "lqd", "lqd")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"));

        Self::load_from_sources(
            project_root,
            user_config_file.as_deref(),
            Environment::with_prefix("LQD"),
        )
    }

    fn load_from_sources(
        project_root: &Path,
        user_config_path: Option<&Path>,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            tracing::debug!("user config source: {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".lqd.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("lqd.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            environment
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// The partial directory, resolved against `project_root`.
    #[must_use]
    pub fn template_root(&self, project_root: &Utf8Path) -> Option<Utf8PathBuf> {
        self.template_root.as_ref().map(|root| {
            if root.is_absolute() {
                root.clone()
            } else {
                project_root.join(root)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn no_env() -> Environment {
        Environment::with_prefix("LQD").source(Some(HashMap::new()))
    }

    fn load(project_root: &Path) -> Result<Settings, ConfigError> {
        Settings::load_from_sources(project_root, None, no_env())
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_load_no_files() {
            let dir = tempdir().unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(settings, Settings::default());
            assert!(settings.line_numbers);
            assert_eq!(settings.error_mode, ErrorMode::Lax);
            assert_eq!(settings.partial_pattern, "_%s.liquid");
        }
    }

    mod project_files {
        use super::*;

        #[test]
        fn test_load_lqd_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("lqd.toml"),
                "error_mode = \"strict\"\nstrict_variables = true\n",
            )
            .unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(
                settings,
                Settings {
                    error_mode: ErrorMode::Strict,
                    strict_variables: true,
                    ..Settings::default()
                }
            );
        }

        #[test]
        fn test_load_dot_lqd_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".lqd.toml"), "debug = true").unwrap();
            let settings = load(dir.path()).unwrap();
            assert!(settings.debug);
        }

        #[test]
        fn test_load_limits_table() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("lqd.toml"),
                "[limits]\nrender_score = 500\nrender_length = 4096\n",
            )
            .unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(
                settings.limits,
                Limits {
                    render_length: Some(4096),
                    render_score: Some(500),
                    assign_score: None,
                }
            );
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn test_project_priority_lqd_overrides_dot_lqd() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".lqd.toml"), "strict_filters = false").unwrap();
            fs::write(dir.path().join("lqd.toml"), "strict_filters = true").unwrap();
            let settings = load(dir.path()).unwrap();
            assert!(settings.strict_filters);
        }

        #[test]
        fn test_user_priority_project_overrides_user() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("config.toml");
            fs::write(&user_conf_path, "error_mode = \"warn\"\ndebug = true").unwrap();
            fs::write(project_dir.path().join("lqd.toml"), "error_mode = \"strict\"").unwrap();

            let settings =
                Settings::load_from_sources(project_dir.path(), Some(&user_conf_path), no_env())
                    .unwrap();
            assert_eq!(settings.error_mode, ErrorMode::Strict);
            assert!(settings.debug);
        }

        #[test]
        fn test_environment_overrides_files() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("lqd.toml"), "line_numbers = true").unwrap();
            let env = Environment::with_prefix("LQD").source(Some(HashMap::from([
                (String::from("LQD_LINE_NUMBERS"), String::from("false")),
                (String::from("LQD_LIMITS__ASSIGN_SCORE"), String::from("20")),
            ])));
            let settings = Settings::load_from_sources(dir.path(), None, env).unwrap();
            assert!(!settings.line_numbers);
            assert_eq!(settings.limits.assign_score, Some(20));
        }
    }

    mod user_config {
        use super::*;

        #[test]
        fn test_missing_user_config_is_skipped() {
            let dir = tempdir().unwrap();
            let missing = dir.path().join("nope").join("config.toml");
            let settings =
                Settings::load_from_sources(dir.path(), Some(&missing), no_env()).unwrap();
            assert_eq!(settings, Settings::default());
        }
    }

    mod template_root {
        use super::*;

        #[test]
        fn test_relative_root_resolves_against_project() {
            let settings = Settings {
                template_root: Some(Utf8PathBuf::from("partials")),
                ..Settings::default()
            };
            assert_eq!(
                settings.template_root(Utf8Path::new("/srv/site")),
                Some(Utf8PathBuf::from("/srv/site/partials"))
            );
        }

        #[test]
        fn test_absolute_root_is_kept() {
            let settings = Settings {
                template_root: Some(Utf8PathBuf::from("/opt/partials")),
                ..Settings::default()
            };
            assert_eq!(
                settings.template_root(Utf8Path::new("/srv/site")),
                Some(Utf8PathBuf::from("/opt/partials"))
            );
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_invalid_toml_content() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("lqd.toml"), "debug = not_a_boolean").unwrap();
            let result = load(dir.path());
            assert!(result.is_err());
            assert!(matches!(result.unwrap_err(), ConfigError::Config(_)));
        }

        #[test]
        fn test_unknown_error_mode() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("lqd.toml"), "error_mode = \"loud\"").unwrap();
            assert!(matches!(load(dir.path()), Err(ConfigError::Config(_))));
        }
    }
}

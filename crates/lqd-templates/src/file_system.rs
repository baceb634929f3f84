use std::fmt;
use std::sync::LazyLock;

use camino::Utf8Component;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::error::Result;

/// Source of partial templates for `include` and `render`.
pub trait FileSystem: fmt::Debug + Send + Sync {
    fn read_template_file(&self, template_path: &str) -> Result<String>;
}

/// Rejects every read. The default for contexts without partials.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankFileSystem;

impl FileSystem for BlankFileSystem {
    fn read_template_file(&self, _template_path: &str) -> Result<String> {
        Err(Error::file_system(
            "This liquid context does not allow includes.",
        ))
    }
}

static TEMPLATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[^./][a-zA-Z0-9_/]+\z").expect("valid regex"));

pub const DEFAULT_PATTERN: &str = "_%s.liquid";

/// Reads partials from a directory. `product` resolves to
/// `<root>/_product.liquid` and `shop/cart` to `<root>/shop/_cart.liquid`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: Utf8PathBuf,
    pattern: String,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self::with_pattern(root, DEFAULT_PATTERN)
    }

    /// `pattern` maps a partial name to a file name; `%s` is replaced with
    /// the name.
    pub fn with_pattern(root: impl Into<Utf8PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn full_path(&self, template_path: &str) -> Result<Utf8PathBuf> {
        if !TEMPLATE_NAME.is_match(template_path) {
            return Err(Error::file_system(format!(
                "Illegal template name '{template_path}'"
            )));
        }

        let path = Utf8Path::new(template_path);
        let file_name = self
            .pattern
            .replace("%s", path.file_name().unwrap_or(template_path));
        let full_path = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => self.root.join(dir).join(file_name),
            _ => self.root.join(file_name),
        };

        let normalized = normalize(&full_path);
        if !normalized.starts_with(normalize(&self.root)) {
            return Err(Error::file_system(format!(
                "Illegal template path '{normalized}'"
            )));
        }
        Ok(full_path)
    }
}

fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::ParentDir => {
                out.pop();
            }
            Utf8Component::CurDir => {}
            other => out.push(other.as_str()),
        }
    }
    out
}

impl FileSystem for LocalFileSystem {
    fn read_template_file(&self, template_path: &str) -> Result<String> {
        let full_path = self.full_path(template_path)?;
        if !full_path.is_file() {
            return Err(Error::file_system(format!(
                "No such template '{template_path}'"
            )));
        }
        tracing::debug!(path = %full_path, "reading partial");
        std::fs::read_to_string(&full_path)
            .map_err(|err| Error::file_system(format!("{full_path}: {err}")))
    }
}

/// Partials held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    templates: FxHashMap<String, String>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_template_file(&self, template_path: &str) -> Result<String> {
        self.templates
            .get(template_path)
            .cloned()
            .ok_or_else(|| Error::file_system(format!("No such template '{template_path}'")))
    }
}

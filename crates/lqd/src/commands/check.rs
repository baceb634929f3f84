use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Parser;
use ignore::WalkBuilder;
use lqd_source::DiagnosticRenderer;
use lqd_source::Severity;
use lqd_templates::Environment;
use lqd_templates::Error;
use lqd_templates::ParseOptions;
use lqd_templates::Template;

use crate::args::Args;
use crate::commands::Command;
use crate::diagnostics::pick_renderer;
use crate::diagnostics::render_error;
use crate::exit::Exit;
use crate::project::Project;

const TEMPLATE_EXTENSION: &str = "liquid";

#[derive(Debug, Parser)]
pub struct Check {
    /// Files or directories to check. Defaults to the current directory.
    paths: Vec<Utf8PathBuf>,
}

impl Command for Check {
    fn execute(&self, args: &Args, project: &Project) -> Result<Exit> {
        let fmt = pick_renderer();

        let roots: Vec<Utf8PathBuf> = if self.paths.is_empty() {
            vec![project.root().to_owned()]
        } else {
            self.paths.iter().map(|path| project.resolve(path)).collect()
        };
        let files = discover_files(&roots);
        tracing::info!(files = files.len(), "checking templates");

        if files.is_empty() {
            return Ok(Exit::success());
        }

        let environment = project.environment(None);
        let options = project.parse_options(true);

        // Parse in parallel, render diagnostics on the main thread once all
        // files are done.
        let mut results: Vec<FileCheckResult> = {
            let (tx, rx) = std::sync::mpsc::channel();
            rayon::scope(|scope| {
                for path in files {
                    let tx = tx.clone();
                    let environment = environment.clone();
                    let options = &options;
                    scope.spawn(move |_| {
                        let result = check_file(path, environment, options);
                        if result.has_diagnostics() {
                            let _ = tx.send(result);
                        }
                    });
                }
            });
            drop(tx);
            rx.into_iter().collect()
        };
        results.sort_by(|a, b| a.path.cmp(&b.path));

        let file_count = results.len();
        let mut error_count: usize = 0;
        for result in &results {
            for output in result.render(&fmt, project.root()) {
                if !args.global.quiet {
                    println!("{output}\n");
                }
                error_count += 1;
            }
        }

        if error_count > 0 {
            let file_word = if file_count == 1 { "file" } else { "files" };
            let error_word = if error_count == 1 { "error" } else { "errors" };
            Ok(Exit::error().with_message(format!(
                "Found {error_count} {error_word} in {file_count} {file_word}."
            )))
        } else {
            Ok(Exit::success())
        }
    }
}

/// Outcome of parsing one file, collected on a rayon task.
struct FileCheckResult {
    path: Utf8PathBuf,
    source: String,
    outcome: Outcome,
}

enum Outcome {
    Clean,
    Unreadable(String),
    Invalid(Error),
}

impl FileCheckResult {
    fn has_diagnostics(&self) -> bool {
        !matches!(self.outcome, Outcome::Clean)
    }

    fn render(&self, fmt: &DiagnosticRenderer, project_root: &Utf8Path) -> Vec<String> {
        let path = self
            .path
            .strip_prefix(project_root)
            .unwrap_or(self.path.as_path())
            .as_str();
        match &self.outcome {
            Outcome::Clean => Vec::new(),
            Outcome::Unreadable(reason) => vec![format!("{path}: {reason}")],
            Outcome::Invalid(error) => vec![render_error(
                fmt,
                &self.source,
                path,
                error,
                Severity::Error,
            )],
        }
    }
}

fn check_file(
    path: Utf8PathBuf,
    environment: Arc<Environment>,
    options: &ParseOptions,
) -> FileCheckResult {
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            return FileCheckResult {
                path,
                source: String::new(),
                outcome: Outcome::Unreadable(err.to_string()),
            };
        }
    };

    let outcome = match Template::parse_with(&source, environment, options) {
        Ok(_) => Outcome::Clean,
        Err(err) => {
            tracing::debug!(path = %path, error = %err, "template failed to parse");
            Outcome::Invalid(err)
        }
    };

    FileCheckResult {
        path,
        source,
        outcome,
    }
}

/// Every template under `roots`, honouring ignore files and skipping hidden
/// directories. Paths naming a file are checked whatever their extension.
fn discover_files(roots: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        for entry in WalkBuilder::new(root).build().filter_map(Result::ok) {
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 path");
                continue;
            };
            if is_template(path) {
                files.push(path.to_owned());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

fn is_template(path: &Utf8Path) -> bool {
    path.extension() == Some(TEMPLATE_EXTENSION)
}

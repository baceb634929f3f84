use std::io::IsTerminal;
use std::io::Read as _;
use std::io::Write as _;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Parser;
use lqd_source::Severity;
use lqd_templates::Object;
use lqd_templates::Template;
use lqd_templates::Value;

use crate::args::Args;
use crate::commands::Command;
use crate::diagnostics::pick_renderer;
use crate::diagnostics::render_error;
use crate::exit::Exit;
use crate::project::Project;

const STDIN_PATH: &str = "<stdin>";

#[derive(Debug, Parser)]
pub struct Render {
    /// Template to render. Reads stdin when omitted.
    template: Option<Utf8PathBuf>,

    /// JSON file holding the object to render with.
    #[arg(long, short, value_name = "FILE")]
    data: Option<Utf8PathBuf>,

    /// Parse strictly, fail on undefined variables and filters.
    #[arg(long)]
    strict: bool,

    /// Directory partials are loaded from.
    #[arg(long, value_name = "DIR")]
    root: Option<Utf8PathBuf>,
}

impl Command for Render {
    fn execute(&self, args: &Args, project: &Project) -> Result<Exit> {
        let fmt = pick_renderer();

        let (path, source) = match &self.template {
            Some(path) => {
                let resolved = project.resolve(path);
                let source = std::fs::read_to_string(&resolved)
                    .with_context(|| format!("Failed to read template '{resolved}'"))?;
                (path.to_string(), source)
            }
            None if std::io::stdin().is_terminal() => {
                return Ok(Exit::error()
                    .with_message("No template given. Pass a path or pipe one on stdin."));
            }
            None => {
                let mut source = String::new();
                std::io::stdin()
                    .read_to_string(&mut source)
                    .context("Failed to read stdin")?;
                (STDIN_PATH.to_owned(), source)
            }
        };

        let bindings = match &self.data {
            Some(data) => load_bindings(&project.resolve(data))?,
            None => Object::new(),
        };

        let environment = project.environment(self.root.as_deref());
        let template = match Template::parse_with(
            &source,
            environment.clone(),
            &project.parse_options(self.strict),
        ) {
            Ok(template) => template,
            Err(err) => {
                if !args.global.quiet {
                    eprintln!("{}", render_error(&fmt, &source, &path, &err, Severity::Error));
                }
                return Ok(Exit::error().with_message(format!("Failed to parse {path}.")));
            }
        };

        if !args.global.quiet {
            for warning in template.warnings() {
                eprintln!(
                    "{}",
                    render_error(&fmt, &source, &path, warning, Severity::Warning)
                );
            }
        }

        let mut context = project
            .render_options(self.strict)
            .context_builder(environment)
            .environment(bindings)
            .build();
        let output = match template.render_in(&mut context) {
            Ok(output) => output,
            Err(err) => {
                if !args.global.quiet {
                    eprintln!("{}", render_error(&fmt, &source, &path, &err, Severity::Error));
                }
                return Ok(Exit::error().with_message(format!("Failed to render {path}.")));
            }
        };

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(output.as_bytes())
            .and_then(|()| stdout.flush())
            .context("Failed to write output")?;

        let errors = context.errors();
        tracing::debug!(bytes = output.len(), errors = errors.len(), "rendered template");
        if !args.global.quiet {
            for error in errors {
                eprintln!("{}", render_error(&fmt, &source, &path, error, Severity::Warning));
            }
        }

        if self.strict && !errors.is_empty() {
            let word = if errors.len() == 1 { "error" } else { "errors" };
            Ok(Exit::error().with_message(format!(
                "Rendered {path} with {} {word}.",
                errors.len()
            )))
        } else {
            Ok(Exit::success())
        }
    }
}

fn load_bindings(path: &Utf8Path) -> Result<Object> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file '{path}'"))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse data file '{path}'"))?;
    match Value::from(json) {
        Value::Object(bindings) => Ok(bindings),
        _ => anyhow::bail!("Data file '{path}' must contain a JSON object"),
    }
}

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::args::Args;
use crate::commands::Command;
use crate::commands::LqdCommand;
use crate::logging;
use crate::project::Project;

/// Render and check Liquid templates.
#[derive(Parser)]
#[command(name = "lqd")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: LqdCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command
pub fn run(args: Vec<String>) -> Result<ExitCode> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    let project = Project::discover()?;
    let _guard = logging::init_tracing(&cli.args.global, project.settings().debug)?;
    tracing::debug!(root = %project.root(), settings = ?project.settings(), "loaded settings");
    let exit = cli.command.execute(&cli.args, &project)?;
    Ok(exit.report(&cli.args.global))
}

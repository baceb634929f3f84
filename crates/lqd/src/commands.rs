mod check;
mod render;

use anyhow::Result;
use clap::Subcommand;

use crate::args::Args;
use crate::exit::Exit;
use crate::project::Project;

pub trait Command {
    fn execute(&self, args: &Args, project: &Project) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum LqdCommand {
    /// Render a template to stdout
    Render(self::render::Render),
    /// Check templates for syntax errors
    Check(self::check::Check),
}

impl Command for LqdCommand {
    fn execute(&self, args: &Args, project: &Project) -> Result<Exit> {
        match self {
            Self::Render(command) => command.execute(args, project),
            Self::Check(command) => command.execute(args, project),
        }
    }
}

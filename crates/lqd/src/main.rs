mod args;
mod cli;
mod commands;
mod diagnostics;
mod exit;
mod logging;
mod project;

use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match cli::run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("lqd: {err:#}");
            ExitCode::from(2)
        }
    }
}

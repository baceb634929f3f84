use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Parser)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Do not print status messages or diagnostics.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose output.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Also write logs to this file.
    #[arg(global = true, long, value_name = "PATH")]
    pub log_file: Option<Utf8PathBuf>,
}

impl GlobalArgs {
    /// Filter directive used when `RUST_LOG` is not set. The `debug` setting
    /// raises the level to at least debug unless `--quiet` is given.
    pub fn default_log_level(&self, debug: bool) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 | 1 if debug => "debug",
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(quiet: bool, verbose: u8) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            log_file: None,
        }
    }

    #[test]
    fn log_level_from_flags() {
        assert_eq!(global(false, 0).default_log_level(false), "warn");
        assert_eq!(global(false, 1).default_log_level(false), "info");
        assert_eq!(global(false, 3).default_log_level(false), "trace");
        assert_eq!(global(true, 0).default_log_level(false), "error");
    }

    #[test]
    fn debug_setting_raises_log_level() {
        assert_eq!(global(false, 0).default_log_level(true), "debug");
        assert_eq!(global(false, 1).default_log_level(true), "debug");
        assert_eq!(global(false, 3).default_log_level(true), "trace");
        assert_eq!(global(true, 0).default_log_level(true), "error");
    }
}

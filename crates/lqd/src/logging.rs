//! Tracing setup for the CLI.
//!
//! Events go to stderr, and additionally to `--log-file` when given. Both are
//! filtered by `RUST_LOG`, falling back to a level derived from `-q`/`-v`
//! and the `debug` setting.

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::args::GlobalArgs;

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop and must be held until
/// the command finishes.
pub fn init_tracing(args: &GlobalArgs, debug: bool) -> Result<Option<WorkerGuard>> {
    let default_level = args.default_log_level(debug);
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(env_filter());

    let mut guard = None;
    let file_layer = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_str().is_empty())
                .unwrap_or(Utf8Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path '{path}' has no file name"))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    Registry::default()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

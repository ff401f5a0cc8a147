use anyhow::{Context as _, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

const DEFAULT_DIRECTIVES: &str = "rag_evals=info,warn";

/// Logs to a daily rotated file in the log dir, and warnings to stderr
///
/// `RUST_LOG` overrides the file filter.
pub fn init(config: &Config) -> Result<()> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "rag-evals.log");

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVES))?
        .add_directive("h2=error".parse()?)
        .add_directive("hyper_util=error".parse()?);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(env_filter);

    // Progress goes to stdout, so only problems are shown on the terminal
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    tracing::debug!(log_dir = %log_dir.display(), "Tracing initialized");

    Ok(())
}

use anyhow::{Context as _, Result};
use clap::Parser;

use rag_evals::cli::Args;
use rag_evals::config::Config;
use rag_evals::{eval_tracing, evaluations};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine, credentials may come from the environment or the config
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::load(&args.config_path)?;
    args.apply_overrides(&mut config);
    config.validate()?;

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let command = args
        .command
        .context("No command given, expected one of `answers`, `retrieval` or `all`")?;

    eval_tracing::init(&config)?;
    ::tracing::info!(?config, "Loaded configuration");

    for suite in command.suites() {
        let run_name = args.run_name_for(suite);
        evaluations::run_suite(&config, suite, run_name.as_deref())
            .await
            .with_context(|| format!("The {suite} experiment failed"))?;
    }

    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::evaluations::Suite;

#[derive(Parser, Debug, Clone)]
#[clap(author, about, version, arg_required_else_help = true)]
pub struct Args {
    /// Optional path to overwrite the config
    #[arg(short, long, default_value = "rag-evals.toml")]
    pub config_path: PathBuf,

    /// Name of the Langfuse dataset to evaluate against
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Name of the experiment run, defaults to the experiment name and start time
    #[arg(long)]
    pub run_name: Option<String>,

    /// Maximum number of dataset items evaluated at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the configuration and exit
    #[arg(long)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Score answer relevance and faithfulness
    Answers,
    /// Score the relevance of the retrieved chunks
    Retrieval,
    /// Run both experiments, one after the other
    All,
}

impl Command {
    #[must_use]
    pub fn suites(self) -> Vec<Suite> {
        match self {
            Command::Answers => vec![Suite::Answers],
            Command::Retrieval => vec![Suite::Retrieval],
            Command::All => vec![Suite::Answers, Suite::Retrieval],
        }
    }
}

impl Args {
    /// Flags take precedence over the config file and environment
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dataset) = &self.dataset {
            config.dataset.clone_from(dataset);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
    }

    /// Run name for a suite
    ///
    /// When several suites run, the suite is appended so that their dataset runs do not merge.
    #[must_use]
    pub fn run_name_for(&self, suite: Suite) -> Option<String> {
        let run_name = self.run_name.as_ref()?;
        match self.command {
            Some(Command::All) => Some(format!("{run_name} ({suite})")),
            _ => Some(run_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_and_overrides() {
        let args = Args::try_parse_from([
            "rag-evals",
            "--dataset",
            "support_questions",
            "--concurrency",
            "2",
            "answers",
        ])
        .unwrap();

        assert_eq!(args.command, Some(Command::Answers));
        assert_eq!(args.config_path, PathBuf::from("rag-evals.toml"));

        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.dataset, "support_questions");
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args::try_parse_from(["rag-evals", "retrieval"]).unwrap();

        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.dataset, "rag_bot_evals");
        assert_eq!(config.concurrency, 8);
    }

    #[test]
    fn test_all_runs_both_suites_with_distinct_run_names() {
        let args = Args::try_parse_from(["rag-evals", "--run-name", "nightly", "all"]).unwrap();

        assert_eq!(
            args.command.unwrap().suites(),
            vec![Suite::Answers, Suite::Retrieval]
        );
        assert_eq!(
            args.run_name_for(Suite::Answers).as_deref(),
            Some("nightly (answers)")
        );
        assert_eq!(
            args.run_name_for(Suite::Retrieval).as_deref(),
            Some("nightly (retrieval)")
        );
    }

    #[test]
    fn test_single_suite_keeps_run_name() {
        let args =
            Args::try_parse_from(["rag-evals", "--run-name", "nightly", "retrieval"]).unwrap();
        assert_eq!(
            args.run_name_for(Suite::Retrieval).as_deref(),
            Some("nightly")
        );

        let args = Args::try_parse_from(["rag-evals", "retrieval"]).unwrap();
        assert!(args.run_name_for(Suite::Retrieval).is_none());
    }

    #[test]
    fn test_print_config_needs_no_command() {
        let args = Args::try_parse_from(["rag-evals", "--print-config"]).unwrap();
        assert!(args.print_config);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_unknown_command() {
        assert!(Args::try_parse_from(["rag-evals", "everything"]).is_err());
    }
}

//! Experiments that score the RAG pipeline with LLM judges
//!
//! Both suites fetch the same Langfuse dataset, call the pipeline for every item and report the
//! judge scores back to Langfuse. A copy of each run is written to the output directory.
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::json;

mod experiment;
mod output;
mod result;
mod tracker;

#[cfg(test)]
mod tests;

pub use experiment::{Experiment, ExperimentBuilder, TRACE_NAME};
pub use output::ExperimentOutput;
pub use result::{AverageScore, ExperimentResult, ItemResult};
#[cfg(test)]
pub use tracker::MockExperimentTracker;
pub use tracker::{ExperimentTracker, RunItemLink, ScoreRecord, TraceRecord};

use crate::config::{Config, LLMConfiguration};
use crate::judges::{
    AnswerRelevance, Evaluator, Faithfulness, RetrievalRelevance, StructuredPrompt,
};
use crate::langfuse::LangfuseClient;
use crate::rag::{HttpRagPipeline, RagPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Suite {
    /// Answer relevance and faithfulness
    Answers,
    /// Relevance of the retrieved chunks
    Retrieval,
}

impl Suite {
    #[must_use]
    pub fn experiment_name(self) -> &'static str {
        match self {
            Suite::Answers => "Answer Quality: Relevance and Faithfulness",
            Suite::Retrieval => "Multi-metric Evaluation",
        }
    }

    fn progress_message(self) -> &'static str {
        match self {
            Suite::Answers => "Running answer evaluation experiment",
            Suite::Retrieval => "Running experiments...",
        }
    }

    fn provider(self, config: &Config) -> &LLMConfiguration {
        match self {
            Suite::Answers => config.answer_provider(),
            Suite::Retrieval => config.retrieval_provider(),
        }
    }

    /// The judges of this suite, all sharing the same model
    #[must_use]
    pub fn evaluators(self, llm: &Arc<dyn StructuredPrompt>) -> Vec<Arc<dyn Evaluator>> {
        match self {
            Suite::Answers => vec![
                Arc::new(AnswerRelevance::new(Arc::clone(llm))) as Arc<dyn Evaluator>,
                Arc::new(Faithfulness::new(Arc::clone(llm))) as Arc<dyn Evaluator>,
            ],
            Suite::Retrieval => {
                vec![Arc::new(RetrievalRelevance::new(Arc::clone(llm))) as Arc<dyn Evaluator>]
            }
        }
    }

    /// Builds the experiment for this suite from the configuration
    pub fn experiment(
        self,
        config: &Config,
        task: Arc<dyn RagPipeline>,
        run_name: Option<&str>,
    ) -> Result<Experiment> {
        let provider = self.provider(config);
        let model = provider
            .get_judge_model(config.backoff)
            .with_context(|| format!("Failed to configure the judge model for {self}"))?;
        let metadata = json!({
            "judge_provider": provider.to_string(),
            "judge_model": model.model(),
        });
        let llm: Arc<dyn StructuredPrompt> = Arc::new(model);

        let mut builder = Experiment::builder();
        builder
            .name(self.experiment_name())
            .task(task)
            .max_concurrency(config.concurrency)
            .metadata(metadata);
        if let Some(run_name) = run_name {
            builder.run_name(run_name);
        }
        for evaluator in self.evaluators(&llm) {
            builder.evaluator(evaluator);
        }

        builder.build()
    }
}

/// Runs a suite end to end against Langfuse and the configured pipeline
#[tracing::instrument(skip(config), err)]
pub async fn run_suite(
    config: &Config,
    suite: Suite,
    run_name: Option<&str>,
) -> Result<ExperimentResult> {
    let langfuse = LangfuseClient::from_config(&config.langfuse)?;
    let task: Arc<dyn RagPipeline> = Arc::new(HttpRagPipeline::from_config(&config.rag)?);
    let experiment = suite.experiment(config, task, run_name)?;

    println!("Fetching dataset");
    let dataset = langfuse.get_dataset(&config.dataset).await?;

    println!("{}", suite.progress_message());
    let result = experiment.run(&dataset, &langfuse).await?;
    println!("Experiment run successfully");

    let output = ExperimentOutput::new(config.output_dir(), experiment.name())?;
    output.write_results(&result)?;
    output.write_summary(&result)?;
    tracing::info!(dir = %output.dir().display(), "Wrote experiment results");

    println!("{}", result.format());

    Ok(result)
}

use std::sync::Arc;

use anyhow::{Context as _, Result};
use derive_builder::Builder;
use futures::StreamExt as _;
use serde_json::{json, Value};
use uuid::Uuid;

use super::result::{ExperimentResult, ItemResult};
use super::tracker::{ExperimentTracker, RunItemLink, ScoreRecord, TraceRecord};
use crate::dataset::{Dataset, DatasetItem};
use crate::judges::{EvaluationInput, Evaluator};
use crate::rag::RagPipeline;

pub const TRACE_NAME: &str = "experiment-item-run";

/// Runs a task over every item of a dataset and scores the outputs
///
/// Each item gets its own trace, linked to the named run of the dataset. Evaluator failures are
/// logged and skipped, a failing task only fails its own item.
#[derive(Clone, Builder)]
#[builder(build_fn(error = anyhow::Error))]
pub struct Experiment {
    #[builder(setter(into))]
    name: String,
    /// Defaults to the experiment name with the start time
    #[builder(setter(into, strip_option), default)]
    run_name: Option<String>,
    #[builder(setter(into, strip_option), default)]
    description: Option<String>,
    /// Stored on every run item, i.e. which judge models were used
    #[builder(setter(strip_option), default)]
    metadata: Option<Value>,
    #[builder(setter(custom))]
    task: Arc<dyn RagPipeline>,
    #[builder(setter(custom), default)]
    evaluators: Vec<Arc<dyn Evaluator>>,
    max_concurrency: usize,
}

impl ExperimentBuilder {
    pub fn task(&mut self, task: Arc<dyn RagPipeline>) -> &mut Self {
        self.task = Some(task);
        self
    }

    pub fn evaluator(&mut self, evaluator: Arc<dyn Evaluator>) -> &mut Self {
        self.evaluators.get_or_insert_with(Vec::new).push(evaluator);
        self
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("run_name", &self.run_name)
            .field(
                "evaluators",
                &self.evaluators.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Experiment {
    #[must_use]
    pub fn builder() -> ExperimentBuilder {
        ExperimentBuilder::default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the experiment over all active items and flushes the tracker
    ///
    /// Results keep the order of the dataset.
    #[tracing::instrument(skip_all, fields(experiment = %self.name, dataset = %dataset.name), err)]
    pub async fn run(
        &self,
        dataset: &Dataset,
        tracker: &dyn ExperimentTracker,
    ) -> Result<ExperimentResult> {
        let run_name = self
            .run_name
            .clone()
            .unwrap_or_else(|| default_run_name(&self.name));

        let items = dataset.active_items().collect::<Vec<_>>();
        let skipped = dataset.items.len() - items.len();
        if skipped > 0 {
            tracing::info!(skipped, "Skipping archived dataset items");
        }
        tracing::info!(items = items.len(), %run_name, "Starting experiment run");

        let run_name_ref = run_name.as_str();
        let results = futures::stream::iter(items)
            .map(|item| self.run_item(item, run_name_ref, tracker))
            .buffered(self.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        tracker
            .flush()
            .await
            .context("Failed to flush experiment results")?;

        Ok(ExperimentResult {
            name: self.name.clone(),
            run_name,
            dataset_name: dataset.name.clone(),
            item_results: results,
        })
    }

    #[tracing::instrument(skip_all, fields(item = %item.id))]
    async fn run_item(
        &self,
        item: &DatasetItem,
        run_name: &str,
        tracker: &dyn ExperimentTracker,
    ) -> ItemResult {
        let trace_id = Uuid::new_v4();
        let mut result = ItemResult::new(&item.id, trace_id);

        let question = match item.question() {
            Ok(question) => question.to_string(),
            Err(err) => {
                tracing::error!(error = %err, "Skipping item without a question");
                result.errors.push(format!("{err:#}"));
                return result;
            }
        };
        result.question = Some(question.clone());

        let answer = self.task.answer(question.clone()).await;
        let trace_output = match &answer {
            Ok(output) => serde_json::to_value(output).unwrap_or(Value::Null),
            Err(err) => {
                tracing::error!(error = ?err, "Task failed");
                result.errors.push(format!("Task failed: {err:#}"));
                json!({ "error": format!("{err:#}") })
            }
        };

        let trace = TraceRecord {
            id: trace_id,
            name: TRACE_NAME.to_string(),
            input: json!({ "question": question }),
            output: trace_output,
            metadata: item.metadata.clone(),
        };
        if let Err(err) = tracker.record_trace(trace).await {
            tracing::warn!(error = ?err, "Failed to record trace");
            result.errors.push(format!("Failed to record trace: {err:#}"));
        }

        let link = RunItemLink {
            run_name: run_name.to_string(),
            run_description: self.description.clone(),
            dataset_item_id: item.id.clone(),
            trace_id,
            metadata: self.metadata.clone(),
        };
        if let Err(err) = tracker.link_run_item(link).await {
            tracing::warn!(error = ?err, "Failed to link dataset run item");
            result
                .errors
                .push(format!("Failed to link dataset run item: {err:#}"));
        }

        let Ok(output) = answer else {
            return result;
        };

        let input = EvaluationInput {
            question,
            expected_answer: item.expected_answer().ok().map(str::to_string),
            output: output.clone(),
            metadata: item.metadata.clone(),
        };
        let input = &input;
        let outcomes = futures::future::join_all(self.evaluators.iter().map(|evaluator| async move {
            (evaluator.name(), evaluator.evaluate(input).await)
        }))
        .await;

        for (name, outcome) in outcomes {
            let evaluation = match outcome {
                Ok(evaluation) => evaluation,
                Err(err) => {
                    tracing::warn!(evaluator = name, error = %err, "Evaluator failed");
                    result.errors.push(format!("{name}: {err}"));
                    continue;
                }
            };

            let score = ScoreRecord {
                trace_id,
                name: evaluation.name.clone(),
                value: evaluation.value,
                comment: evaluation.comment.clone(),
            };
            if let Err(err) = tracker.record_score(score).await {
                tracing::warn!(evaluator = name, error = ?err, "Failed to record score");
                result
                    .errors
                    .push(format!("Failed to record {name}: {err:#}"));
            }
            result.evaluations.push(evaluation);
        }

        result.output = Some(output);
        result
    }
}

fn default_run_name(name: &str) -> String {
    format!(
        "{name} - {}",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::judges::Evaluation;
use crate::rag::RagResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub name: String,
    pub run_name: String,
    pub dataset_name: String,
    pub item_results: Vec<ItemResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: String,
    pub trace_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Missing when the task failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<RagResponse>,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ItemResult {
    pub(crate) fn new(item_id: &str, trace_id: Uuid) -> Self {
        Self {
            item_id: item_id.to_string(),
            trace_id,
            question: None,
            output: None,
            evaluations: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }
}

/// Mean of one evaluator over the items it scored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageScore {
    pub name: String,
    pub mean: f64,
    pub count: usize,
}

impl ExperimentResult {
    #[must_use]
    pub fn failed_items(&self) -> usize {
        self.item_results.iter().filter(|item| !item.is_success()).count()
    }

    /// Averages per evaluator, in the order evaluators first appear
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn averages(&self) -> Vec<AverageScore> {
        let mut totals: Vec<(String, f64, usize)> = Vec::new();
        for evaluation in self.item_results.iter().flat_map(|item| &item.evaluations) {
            match totals.iter_mut().find(|(name, _, _)| *name == evaluation.name) {
                Some((_, sum, count)) => {
                    *sum += evaluation.value;
                    *count += 1;
                }
                None => totals.push((evaluation.name.clone(), evaluation.value, 1)),
            }
        }

        totals
            .into_iter()
            .map(|(name, sum, count)| AverageScore {
                name,
                mean: sum / count as f64,
                count,
            })
            .collect()
    }

    /// Human readable summary of the run
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Experiment: {}", self.name);
        let _ = writeln!(out, "Run: {}", self.run_name);
        let _ = writeln!(out, "Dataset: {}", self.dataset_name);
        let _ = writeln!(
            out,
            "Items: {} ({} failed)",
            self.item_results.len(),
            self.failed_items()
        );

        let averages = self.averages();
        if averages.is_empty() {
            let _ = writeln!(out, "\nNo scores were recorded");
        } else {
            let _ = writeln!(out, "\nAverage scores:");
            for average in &averages {
                let _ = writeln!(
                    out,
                    "  {}: {:.2} ({} scored)",
                    average.name, average.mean, average.count
                );
            }
        }

        let with_errors = self
            .item_results
            .iter()
            .filter(|item| !item.errors.is_empty())
            .collect::<Vec<_>>();
        if !with_errors.is_empty() {
            let _ = writeln!(out, "\nErrors:");
            for item in with_errors {
                for error in &item.errors {
                    let _ = writeln!(out, "  {}: {error}", item.item_id);
                }
            }
        }

        out
    }
}

//! LLM judges that score the output of the pipeline against a rubric
//!
//! Every judge renders a fixed rubric prompt, asks a model for a structured grade and turns the
//! grade into an [`Evaluation`]. Scores are integers from 1 to 10.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod answer_relevance;
mod faithfulness;
mod grade;
mod model;
mod retrieval_relevance;

pub use answer_relevance::AnswerRelevance;
pub use faithfulness::Faithfulness;
pub use grade::{RelevanceGrade, ScoreGrade, SCORE_RANGE};
#[cfg(test)]
pub use model::MockStructuredPrompt;
pub use model::{OpenAIJudgeModel, ResponseSchema, StructuredPrompt};
pub use retrieval_relevance::RetrievalRelevance;

use crate::rag::RagResponse;

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Missing input: {0}")]
    MissingInput(String),
    #[error("Could not render rubric: {0}")]
    Prompt(#[from] tera::Error),
    #[error("Judge request failed: {0}")]
    Request(#[from] async_openai::error::OpenAIError),
    #[error("Judge returned no content")]
    EmptyResponse,
    #[error("Judge refused to grade: {0}")]
    Refusal(String),
    #[error("Judge returned an invalid grade: {message}. Raw response: {raw}")]
    InvalidGrade { message: String, raw: String },
    #[error("Score {0} is outside of 1..=10")]
    ScoreOutOfRange(i64),
}

/// A named score, reported as-is to the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Everything a judge may look at for a single dataset item
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub question: String,
    pub expected_answer: Option<String>,
    pub output: RagResponse,
    pub metadata: Option<Value>,
}

impl EvaluationInput {
    pub(crate) fn require_expected_answer(&self) -> Result<&str, JudgeError> {
        self.expected_answer.as_deref().ok_or_else(|| {
            JudgeError::MissingInput("the dataset item has no expected answer".to_string())
        })
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Name of the score this evaluator produces
    fn name(&self) -> &'static str;

    async fn evaluate(&self, input: &EvaluationInput) -> Result<Evaluation, JudgeError>;
}

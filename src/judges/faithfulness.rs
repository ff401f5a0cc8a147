use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;

use super::{Evaluation, EvaluationInput, Evaluator, JudgeError, ScoreGrade, StructuredPrompt};
use crate::templates::Templates;

pub const NAME: &str = "faithfulness";

/// Whether the answer is grounded in the retrieved documents
pub struct Faithfulness {
    llm: Arc<dyn StructuredPrompt>,
}

impl Faithfulness {
    pub fn new(llm: Arc<dyn StructuredPrompt>) -> Self {
        Self { llm }
    }

    pub(crate) fn prompt(input: &EvaluationInput) -> Result<String, JudgeError> {
        let mut context = Context::new();
        context.insert("answer", &input.output.answer);
        context.insert("documents", &input.output.joined_documents());

        Ok(Templates::render("faithfulness.md", &context)?)
    }
}

#[async_trait]
impl Evaluator for Faithfulness {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, err)]
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Evaluation, JudgeError> {
        let schema = ScoreGrade::schema(
            "FaithfulnessGrade",
            "Rate the faithfulness of the answer to the source documents from 1 to 10",
        );

        let value = self
            .llm
            .prompt_structured(Self::prompt(input)?, schema)
            .await?;
        let grade = ScoreGrade::parse(value)?;

        Ok(Evaluation {
            name: NAME.to_string(),
            value: grade.value(),
            comment: Some(grade.explanation),
        })
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;

use super::{Evaluation, EvaluationInput, Evaluator, JudgeError, ScoreGrade, StructuredPrompt};
use crate::templates::Templates;

pub const NAME: &str = "answer_relevance";

/// How well the answer addresses the question, compared to the expected answer
pub struct AnswerRelevance {
    llm: Arc<dyn StructuredPrompt>,
}

impl AnswerRelevance {
    pub fn new(llm: Arc<dyn StructuredPrompt>) -> Self {
        Self { llm }
    }

    pub(crate) fn prompt(input: &EvaluationInput) -> Result<String, JudgeError> {
        let mut context = Context::new();
        context.insert("question", &input.question);
        context.insert("answer", &input.output.answer);
        context.insert("expected_answer", input.require_expected_answer()?);

        Ok(Templates::render("answer_relevance.md", &context)?)
    }
}

#[async_trait]
impl Evaluator for AnswerRelevance {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, err)]
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Evaluation, JudgeError> {
        let schema = ScoreGrade::schema(
            "AnswerRelevanceGrade",
            "Rate the relevance of the answer to the question from 1 to 10",
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

use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;

use super::{Evaluation, EvaluationInput, Evaluator, JudgeError, RelevanceGrade, StructuredPrompt};
use crate::templates::Templates;

pub const NAME: &str = "retrieval_relevance";

/// Scores every retrieved chunk against the question and reports the mean
pub struct RetrievalRelevance {
    llm: Arc<dyn StructuredPrompt>,
}

impl RetrievalRelevance {
    pub fn new(llm: Arc<dyn StructuredPrompt>) -> Self {
        Self { llm }
    }

    pub(crate) fn prompt(input: &EvaluationInput) -> Result<String, JudgeError> {
        let mut context = Context::new();
        context.insert("question", &input.question);
        context.insert("expected_answer", input.require_expected_answer()?);
        context.insert("answer", &input.output.answer);
        context.insert("documents", &input.output.joined_documents());
        context.insert("document_count", &input.output.documents.len());

        Ok(Templates::render("retrieval_relevance.md", &context)?)
    }
}

#[async_trait]
impl Evaluator for RetrievalRelevance {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, err)]
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Evaluation, JudgeError> {
        let document_count = input.output.documents.len();
        let schema = RelevanceGrade::schema(
            "RetrievalRelevanceGrade",
            &format!(
                "{document_count} chunks are provided, please rate the relevance of each chunk to the question from 1 to 10"
            ),
        );

        let value = self
            .llm
            .prompt_structured(Self::prompt(input)?, schema)
            .await?;
        let grade = RelevanceGrade::parse(value)?;

        if grade.relevant.len() != document_count {
            tracing::warn!(
                expected = document_count,
                received = grade.relevant.len(),
                "Judge did not score every retrieved chunk"
            );
        }

        Ok(Evaluation {
            name: NAME.to_string(),
            value: grade.mean(),
            comment: Some(grade.explanation),
        })
    }
}

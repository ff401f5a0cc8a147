use serde_json::json;

use crate::dataset::{Dataset, DatasetItem};
use crate::judges::EvaluationInput;
use crate::rag::{RagResponse, RetrievedDocument};

pub fn rag_response() -> RagResponse {
    RagResponse {
        answer: "Paris is the capital.".into(),
        documents: vec![
            RetrievedDocument::new("Paris is the capital of France."),
            RetrievedDocument::new("France is in Europe."),
        ],
    }
}

pub fn evaluation_input() -> EvaluationInput {
    EvaluationInput {
        question: "What is the capital of France?".into(),
        expected_answer: Some("Paris".into()),
        output: rag_response(),
        metadata: None,
    }
}

pub fn dataset_item(id: &str, question: &str) -> DatasetItem {
    serde_json::from_value(json!({
        "id": id,
        "status": "ACTIVE",
        "input": {"question": question},
        "expectedOutput": {"answer": format!("answer to {question}")},
    }))
    .expect("valid dataset item")
}

/// A dataset with the given questions, all active
pub fn dataset(questions: &[&str]) -> Dataset {
    Dataset {
        id: "ds-1".into(),
        name: "rag_bot_evals".into(),
        description: None,
        items: questions
            .iter()
            .enumerate()
            .map(|(i, question)| dataset_item(&format!("item-{}", i + 1), question))
            .collect(),
    }
}

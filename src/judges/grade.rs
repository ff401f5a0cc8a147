//! Structured grades the judges answer with

use std::ops::RangeInclusive;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{JudgeError, ResponseSchema};

pub const SCORE_RANGE: RangeInclusive<i64> = 1..=10;

const EXPLANATION_DESCRIPTION: &str = "Explain your reasoning for the score";

/// A single score with the reasoning behind it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreGrade {
    pub explanation: String,
    pub score: i64,
}

impl ScoreGrade {
    pub fn schema(name: &str, score_description: &str) -> ResponseSchema {
        ResponseSchema {
            name: name.to_string(),
            description: None,
            schema: json!({
                "type": "object",
                "properties": {
                    "explanation": {"type": "string", "description": EXPLANATION_DESCRIPTION},
                    "score": {"type": "integer", "description": score_description}
                },
                "required": ["explanation", "score"],
                "additionalProperties": false
            }),
        }
    }

    pub fn parse(value: Value) -> Result<Self, JudgeError> {
        let grade: Self = parse(value)?;
        check_score(grade.score)?;
        Ok(grade)
    }

    /// The score as reported to Langfuse
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn value(&self) -> f64 {
        self.score as f64
    }
}

/// One score per retrieved document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelevanceGrade {
    pub explanation: String,
    pub relevant: Vec<i64>,
}

impl RelevanceGrade {
    pub fn schema(name: &str, relevant_description: &str) -> ResponseSchema {
        ResponseSchema {
            name: name.to_string(),
            description: None,
            schema: json!({
                "type": "object",
                "properties": {
                    "explanation": {"type": "string", "description": EXPLANATION_DESCRIPTION},
                    "relevant": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": relevant_description
                    }
                },
                "required": ["explanation", "relevant"],
                "additionalProperties": false
            }),
        }
    }

    pub fn parse(value: Value) -> Result<Self, JudgeError> {
        let grade: Self = parse(value)?;
        if grade.relevant.is_empty() {
            return Err(JudgeError::InvalidGrade {
                message: "no relevance scores".to_string(),
                raw: serde_json::to_string(&grade.relevant).unwrap_or_default(),
            });
        }
        for score in &grade.relevant {
            check_score(*score)?;
        }
        Ok(grade)
    }

    /// Arithmetic mean of the per document scores
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean(&self) -> f64 {
        let total: i64 = self.relevant.iter().sum();
        total as f64 / self.relevant.len() as f64
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, JudgeError> {
    serde_json::from_value(value.clone()).map_err(|err| JudgeError::InvalidGrade {
        message: err.to_string(),
        raw: value.to_string(),
    })
}

fn check_score(score: i64) -> Result<(), JudgeError> {
    if SCORE_RANGE.contains(&score) {
        Ok(())
    } else {
        Err(JudgeError::ScoreOutOfRange(score))
    }
}

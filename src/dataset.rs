//! Question and expected answer records to evaluate against

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<DatasetItem>,
}

impl Dataset {
    /// Items that are still part of the dataset
    pub fn active_items(&self) -> impl Iterator<Item = &DatasetItem> {
        self.items.iter().filter(|item| item.is_active())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetItem {
    pub id: String,
    #[serde(default)]
    pub status: DatasetStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl DatasetItem {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DatasetStatus::Active
    }

    /// The question is stored as `input.question`
    pub fn question(&self) -> Result<&str> {
        self.input
            .get("question")
            .and_then(Value::as_str)
            .with_context(|| format!("Dataset item {} has no `input.question`", self.id))
    }

    /// The reference answer is stored as `expected_output.answer`
    pub fn expected_answer(&self) -> Result<&str> {
        self.expected_output
            .as_ref()
            .and_then(|output| output.get("answer"))
            .and_then(Value::as_str)
            .with_context(|| {
                format!(
                    "Dataset item {} has no `expected_output.answer`",
                    self.id
                )
            })
    }
}

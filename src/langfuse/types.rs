//! Request and response bodies of the Langfuse public API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dataset::DatasetItem;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetItemsPage {
    #[serde(default)]
    pub data: Vec<DatasetItem>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub total_items: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionBatch<'a> {
    pub batch: &'a [IngestionEvent],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestionEventType {
    TraceCreate,
    ScoreCreate,
}

/// A single event of an ingestion batch
///
/// The event id is used by Langfuse for deduplication and to report per event errors.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: IngestionEventType,
    pub body: IngestionBody,
}

impl IngestionEvent {
    pub fn trace(body: TraceBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: IngestionEventType::TraceCreate,
            body: IngestionBody::Trace(body),
        }
    }

    pub fn score(body: ScoreBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: IngestionEventType::ScoreCreate,
            body: IngestionBody::Score(body),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IngestionBody {
    Trace(TraceBody),
    Score(ScoreBody),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreDataType {
    Numeric,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub id: Uuid,
    pub trace_id: Uuid,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub data_type: ScoreDataType,
}

/// Response of the ingestion endpoint, usually with status 207
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestionResponse {
    #[serde(default)]
    pub successes: Vec<IngestionSuccess>,
    #[serde(default)]
    pub errors: Vec<IngestionError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionSuccess {
    pub id: String,
    pub status: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionError {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRunItemRequest {
    pub run_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub dataset_item_id: String,
    pub trace_id: Uuid,
}

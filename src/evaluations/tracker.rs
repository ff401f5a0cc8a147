use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// The input and output of a single task invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub id: Uuid,
    pub name: String,
    pub input: Value,
    pub output: Value,
    pub metadata: Option<Value>,
}

/// Links a dataset item to the trace produced for it in a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunItemLink {
    pub run_name: String,
    pub run_description: Option<String>,
    pub dataset_item_id: String,
    pub trace_id: Uuid,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub trace_id: Uuid,
    pub name: String,
    pub value: f64,
    pub comment: Option<String>,
}

/// Where experiment runs are recorded
///
/// Implementations may buffer; nothing is guaranteed to be persisted until `flush` returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    async fn record_trace(&self, trace: TraceRecord) -> Result<()>;

    async fn link_run_item(&self, link: RunItemLink) -> Result<()>;

    async fn record_score(&self, score: ScoreRecord) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

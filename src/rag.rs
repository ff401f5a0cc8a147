//! The pipeline under evaluation
//!
//! The pipeline itself lives elsewhere. It is reached over HTTP: the question is posted as
//! `{"question": "..."}` and the pipeline answers with
//!
//! ```json
//! {
//!   "answer": "Paris",
//!   "documents": [{"page_content": "The capital of France is Paris", "metadata": {}}]
//! }
//! ```
//!
//! Documents may also be plain strings, or use `content` instead of `page_content`.
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::RagConfiguration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    #[serde(default)]
    pub documents: Vec<RetrievedDocument>,
}

impl RagResponse {
    /// Page contents separated by a blank line, the way judges read them
    #[must_use]
    pub fn joined_documents(&self) -> String {
        self.documents
            .iter()
            .map(|doc| doc.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDocument")]
pub struct RetrievedDocument {
    pub page_content: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl RetrievedDocument {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Value::Null,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Text(String),
    Object {
        #[serde(alias = "content")]
        page_content: String,
        #[serde(default)]
        metadata: Value,
    },
}

impl From<RawDocument> for RetrievedDocument {
    fn from(raw: RawDocument) -> Self {
        match raw {
            RawDocument::Text(page_content) => RetrievedDocument::new(page_content),
            RawDocument::Object {
                page_content,
                metadata,
            } => RetrievedDocument {
                page_content,
                metadata,
            },
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RagPipeline: Send + Sync {
    async fn answer(&self, question: String) -> Result<RagResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpRagPipeline {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRagPipeline {
    pub fn from_config(config: &RagConfiguration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build http client for the rag pipeline")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RagPipeline for HttpRagPipeline {
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    async fn answer(&self, question: String) -> Result<RagResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .context("Could not reach the rag pipeline")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Rag pipeline responded with {status}: {body}");
        }

        let response = response
            .json::<RagResponse>()
            .await
            .context("Rag pipeline returned an unexpected response")?;

        tracing::debug!(
            documents = response.documents.len(),
            "Received answer from rag pipeline"
        );

        Ok(response)
    }
}

use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use super::types::{
    DatasetItemsPage, DatasetResponse, DatasetRunItemRequest, IngestionBatch, IngestionEvent,
    IngestionResponse, ScoreBody, ScoreDataType, TraceBody,
};
use crate::config::{ApiKey, LangfuseConfiguration};
use crate::dataset::Dataset;
use crate::evaluations::{ExperimentTracker, RunItemLink, ScoreRecord, TraceRecord};

const ITEMS_PAGE_LIMIT: u32 = 50;

/// Client for the Langfuse public API
///
/// Traces and scores are queued and sent in batches of `flush_at` events. Call
/// [`LangfuseClient::flush`] before exiting to send whatever is left.
pub struct LangfuseClient {
    http: reqwest::Client,
    host: Url,
    public_key: ApiKey,
    secret_key: ApiKey,
    flush_at: usize,
    queue: Mutex<Vec<IngestionEvent>>,
}

impl std::fmt::Debug for LangfuseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangfuseClient")
            .field("host", &self.host.as_str())
            .field("flush_at", &self.flush_at)
            .finish_non_exhaustive()
    }
}

impl LangfuseClient {
    pub fn from_config(config: &LangfuseConfiguration) -> Result<Self> {
        let public_key = config
            .public_key
            .clone()
            .filter(|key| !key.is_empty())
            .context("Missing Langfuse public key; set LANGFUSE_PUBLIC_KEY or langfuse.public_key")?;
        let secret_key = config
            .secret_key
            .clone()
            .filter(|key| !key.is_empty())
            .context("Missing Langfuse secret key; set LANGFUSE_SECRET_KEY or langfuse.secret_key")?;

        Self::new(
            config.host.clone(),
            public_key,
            secret_key,
            config.flush_at,
            config.timeout(),
        )
    }

    pub fn new(
        host: Url,
        public_key: ApiKey,
        secret_key: ApiKey,
        flush_at: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Langfuse http client")?;

        Ok(Self {
            http,
            host,
            public_key,
            secret_key,
            flush_at: flush_at.max(1),
            queue: Mutex::new(Vec::new()),
        })
    }

    /// Fetches a dataset with all of its items
    #[tracing::instrument(skip(self), err)]
    pub async fn get_dataset(&self, name: &str) -> Result<Dataset> {
        let url = self.url(&["api", "public", "v2", "datasets", name])?;
        let response = self.get(url).await?;
        let dataset: DatasetResponse = Self::parse(response)
            .await
            .with_context(|| format!("Failed to fetch dataset `{name}`"))?;

        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let mut url = self.url(&["api", "public", "dataset-items"])?;
            url.query_pairs_mut()
                .append_pair("datasetName", name)
                .append_pair("page", &page.to_string())
                .append_pair("limit", &ITEMS_PAGE_LIMIT.to_string());

            let response = self.get(url).await?;
            let batch: DatasetItemsPage = Self::parse(response)
                .await
                .with_context(|| format!("Failed to fetch page {page} of dataset `{name}`"))?;

            tracing::debug!(
                page,
                total_pages = batch.meta.total_pages,
                count = batch.data.len(),
                "Fetched dataset items"
            );

            let done = batch.data.is_empty() || page >= batch.meta.total_pages;
            items.extend(batch.data);
            if done {
                break;
            }
            page += 1;
        }

        tracing::info!(dataset = name, items = items.len(), "Fetched dataset");

        Ok(Dataset {
            id: dataset.id,
            name: dataset.name,
            description: dataset.description,
            items,
        })
    }

    #[tracing::instrument(skip(self, request), fields(run_name = %request.run_name, item = %request.dataset_item_id), err)]
    pub async fn create_dataset_run_item(&self, request: &DatasetRunItemRequest) -> Result<()> {
        let url = self.url(&["api", "public", "dataset-run-items"])?;
        let response = self
            .authorized(self.http.post(url))
            .json(request)
            .send()
            .await
            .context("Failed to reach Langfuse")?;

        Self::ensure_success(response).await
    }

    /// Queues an event, sending the queue when it reaches `flush_at`
    ///
    /// Events of a batch that could not be sent stay queued for the next send.
    pub async fn enqueue(&self, event: IngestionEvent) -> Result<()> {
        let events = {
            let mut queue = self.queue.lock().await;
            queue.push(event);
            if queue.len() < self.flush_at {
                return Ok(());
            }
            std::mem::take(&mut *queue)
        };

        self.send_all(events).await
    }

    /// Sends all queued events
    ///
    /// Fails if any event could not be delivered, including events of earlier failed batches.
    #[tracing::instrument(skip(self), err)]
    pub async fn flush(&self) -> Result<()> {
        let events = std::mem::take(&mut *self.queue.lock().await);
        self.send_all(events).await
    }

    async fn send_all(&self, events: Vec<IngestionEvent>) -> Result<()> {
        for (index, batch) in events.chunks(self.flush_at).enumerate() {
            if let Err(err) = self.send_batch(batch).await {
                let unsent = events[index * self.flush_at..].to_vec();
                tracing::warn!(unsent = unsent.len(), "Keeping unsent events queued");
                self.requeue(unsent).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Puts unsent events back in front of anything queued since
    async fn requeue(&self, mut events: Vec<IngestionEvent>) {
        let mut queue = self.queue.lock().await;
        events.append(&mut queue);
        *queue = events;
    }

    async fn send_batch(&self, batch: &[IngestionEvent]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let url = self.url(&["api", "public", "ingestion"])?;
        let response = self
            .authorized(self.http.post(url))
            .json(&IngestionBatch { batch })
            .send()
            .await
            .context("Failed to reach Langfuse")?;

        let result: IngestionResponse = Self::parse(response)
            .await
            .context("Failed to send events to Langfuse")?;

        for error in &result.errors {
            tracing::error!(
                event = %error.id,
                status = error.status,
                message = error.message.as_deref().unwrap_or_default(),
                error = ?error.error,
                "Langfuse rejected event"
            );
        }
        tracing::debug!(
            sent = batch.len(),
            accepted = result.successes.len(),
            rejected = result.errors.len(),
            "Sent ingestion batch"
        );

        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Invalid Langfuse host: {}", self.host))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(
            self.public_key.expose_secret(),
            Some(self.secret_key.expose_secret()),
        )
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        self.authorized(self.http.get(url))
            .send()
            .await
            .context("Failed to reach Langfuse")
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("Langfuse responded with {status}: {body}");
        }
        serde_json::from_str(&body)
            .with_context(|| format!("Unexpected response from Langfuse: {body}"))
    }

    async fn ensure_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Langfuse responded with {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl ExperimentTracker for LangfuseClient {
    async fn record_trace(&self, trace: TraceRecord) -> Result<()> {
        self.enqueue(IngestionEvent::trace(TraceBody {
            id: trace.id,
            timestamp: chrono::Utc::now(),
            name: trace.name,
            input: trace.input,
            output: trace.output,
            metadata: trace.metadata,
        }))
        .await
    }

    async fn link_run_item(&self, link: RunItemLink) -> Result<()> {
        self.create_dataset_run_item(&DatasetRunItemRequest {
            run_name: link.run_name,
            run_description: link.run_description,
            metadata: link.metadata,
            dataset_item_id: link.dataset_item_id,
            trace_id: link.trace_id,
        })
        .await
    }

    async fn record_score(&self, score: ScoreRecord) -> Result<()> {
        self.enqueue(IngestionEvent::score(ScoreBody {
            id: Uuid::new_v4(),
            trace_id: score.trace_id,
            name: score.name,
            value: score.value,
            comment: score.comment,
            data_type: ScoreDataType::Numeric,
        }))
        .await
    }

    async fn flush(&self) -> Result<()> {
        LangfuseClient::flush(self).await
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::defaults::{
    default_concurrency, default_dataset, default_flush_at, default_langfuse_host,
    default_langfuse_public_key, default_langfuse_secret_key, default_langfuse_timeout_secs,
    default_log_dir, default_output_dir, default_rag_endpoint, default_rag_timeout_secs,
};
use super::{ApiKey, LLMConfiguration, LLMConfigurations};

/// Environment variables with this prefix override the file, i.e. `RAG_EVALS__CONCURRENCY=4`
pub const ENV_PREFIX: &str = "RAG_EVALS";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Name of the Langfuse dataset to evaluate against
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Dataset items evaluated at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,

    #[serde(default)]
    pub langfuse: LangfuseConfiguration,
    #[serde(default)]
    pub rag: RagConfiguration,
    #[serde(default)]
    pub llm: LLMConfigurations,
    #[serde(default)]
    pub backoff: BackoffConfiguration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LangfuseConfiguration {
    #[serde(
        default = "default_langfuse_public_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key: Option<ApiKey>,
    #[serde(
        default = "default_langfuse_secret_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_key: Option<ApiKey>,
    #[serde(default = "default_langfuse_host")]
    pub host: Url,
    /// Number of buffered trace and score events that triggers an ingestion request
    #[serde(default = "default_flush_at")]
    pub flush_at: usize,
    #[serde(default = "default_langfuse_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LangfuseConfiguration {
    fn default() -> Self {
        Self {
            public_key: default_langfuse_public_key(),
            secret_key: default_langfuse_secret_key(),
            host: default_langfuse_host(),
            flush_at: default_flush_at(),
            timeout_secs: default_langfuse_timeout_secs(),
        }
    }
}

impl LangfuseConfiguration {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the pipeline under evaluation can be reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfiguration {
    #[serde(default = "default_rag_endpoint")]
    pub endpoint: Url,
    #[serde(default = "default_rag_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RagConfiguration {
    fn default() -> Self {
        Self {
            endpoint: default_rag_endpoint(),
            timeout_secs: default_rag_timeout_secs(),
        }
    }
}

impl RagConfiguration {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Backoff for judge requests that hit rate limits or server errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfiguration {
    #[serde(default = "default_initial_interval_sec")]
    pub initial_interval_sec: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_max_elapsed_time_sec")]
    pub max_elapsed_time_sec: u64,
}

fn default_initial_interval_sec() -> u64 {
    15
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_randomization_factor() -> f64 {
    0.05
}

fn default_max_elapsed_time_sec() -> u64 {
    120
}

impl Default for BackoffConfiguration {
    fn default() -> Self {
        Self {
            initial_interval_sec: default_initial_interval_sec(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_elapsed_time_sec: default_max_elapsed_time_sec(),
        }
    }
}

impl From<BackoffConfiguration> for backoff::ExponentialBackoff {
    fn from(config: BackoffConfiguration) -> Self {
        backoff::ExponentialBackoffBuilder::default()
            .with_initial_interval(Duration::from_secs(config.initial_interval_sec))
            .with_multiplier(config.multiplier)
            .with_randomization_factor(config.randomization_factor)
            .with_max_elapsed_time(Some(Duration::from_secs(config.max_elapsed_time_sec)))
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            concurrency: default_concurrency(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            langfuse: LangfuseConfiguration::default(),
            rag: RagConfiguration::default(),
            llm: LLMConfigurations::default(),
            backoff: BackoffConfiguration::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, layered with `RAG_EVALS__*` environment variables
    ///
    /// A missing file is fine, every setting has a default. The result is not validated, so that
    /// command line overrides can be applied first.
    #[tracing::instrument(err)]
    pub fn load(path: &Path) -> Result<Config> {
        let config: Config = ::config::Config::builder()
            .add_source(
                ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("`concurrency` must be at least 1");
        }
        if self.langfuse.flush_at == 0 {
            anyhow::bail!("`langfuse.flush_at` must be at least 1");
        }
        if self.dataset.trim().is_empty() {
            anyhow::bail!("`dataset` cannot be empty");
        }
        Ok(())
    }

    pub fn answer_provider(&self) -> &LLMConfiguration {
        match &self.llm {
            LLMConfigurations::Single(config) => config,
            LLMConfigurations::Multiple { answer, .. } => answer,
        }
    }

    pub fn retrieval_provider(&self) -> &LLMConfiguration {
        match &self.llm {
            LLMConfigurations::Single(config) => config,
            LLMConfigurations::Multiple { retrieval, .. } => retrieval,
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_path()
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_path()
    }

    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }
}

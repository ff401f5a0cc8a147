use std::path::PathBuf;

use url::Url;

use super::ApiKey;

pub const DEFAULT_DATASET: &str = "rag_bot_evals";
pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";
pub const DEFAULT_RAG_ENDPOINT: &str = "http://localhost:8000/rag";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[must_use]
pub fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

pub(super) fn default_concurrency() -> usize {
    8
}

pub(super) fn default_output_dir() -> PathBuf {
    "evals".into()
}

pub(super) fn default_log_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    path.push("rag-evals");
    path.push("logs");

    path
}

pub(super) fn default_answer_model() -> String {
    "gpt-4o".to_string()
}

pub(super) fn default_retrieval_model() -> String {
    "gpt-5".to_string()
}

pub(super) fn default_langfuse_public_key() -> Option<ApiKey> {
    ApiKey::from_env("LANGFUSE_PUBLIC_KEY")
}

pub(super) fn default_langfuse_secret_key() -> Option<ApiKey> {
    ApiKey::from_env("LANGFUSE_SECRET_KEY")
}

/// `LANGFUSE_HOST` wins over `LANGFUSE_BASE_URL`, both over Langfuse cloud
///
/// # Panics
///
/// Panics if the built in default is not a valid url
pub(super) fn default_langfuse_host() -> Url {
    ["LANGFUSE_HOST", "LANGFUSE_BASE_URL"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| Url::parse(value.trim()).ok())
        .unwrap_or_else(|| Url::parse(DEFAULT_LANGFUSE_HOST).expect("valid default host"))
}

pub(super) fn default_flush_at() -> usize {
    15
}

pub(super) fn default_langfuse_timeout_secs() -> u64 {
    30
}

/// # Panics
///
/// Panics if the built in default is not a valid url
pub(super) fn default_rag_endpoint() -> Url {
    Url::parse(DEFAULT_RAG_ENDPOINT).expect("valid default rag endpoint")
}

pub(super) fn default_rag_timeout_secs() -> u64 {
    120
}

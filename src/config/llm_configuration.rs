use anyhow::{Context as _, Result};
use async_openai::config::OpenAIConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use super::defaults::{
    default_answer_model, default_retrieval_model, DEFAULT_OLLAMA_BASE_URL,
    DEFAULT_OPENROUTER_BASE_URL,
};
use super::{ApiKey, BackoffConfiguration};
use crate::judges::OpenAIJudgeModel;

/// Judge models, either one for every rubric or one per experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LLMConfigurations {
    Single(LLMConfiguration),
    Multiple {
        /// Used by the answer relevance and faithfulness judges
        answer: LLMConfiguration,
        /// Used by the retrieval relevance judge
        retrieval: LLMConfiguration,
    },
}

impl Default for LLMConfigurations {
    fn default() -> Self {
        LLMConfigurations::Multiple {
            answer: LLMConfiguration::OpenAI {
                api_key: None,
                prompt_model: default_answer_model(),
                base_url: None,
                temperature: None,
            },
            retrieval: LLMConfiguration::OpenAI {
                api_key: None,
                prompt_model: default_retrieval_model(),
                base_url: None,
                temperature: None,
            },
        }
    }
}

/// Every provider is spoken to through the OpenAI chat completions protocol, as all of them support
/// `json_schema` response formats.
#[derive(
    Debug, Clone, Deserialize, Serialize, strum_macros::Display, strum_macros::VariantNames,
)]
#[serde(tag = "provider")]
pub enum LLMConfiguration {
    OpenAI {
        /// Falls back to `OPENAI_API_KEY`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<ApiKey>,
        #[serde(default = "default_answer_model")]
        prompt_model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<Url>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
    },
    Ollama {
        prompt_model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<Url>,
    },
    OpenRouter {
        /// Falls back to `OPENROUTER_API_KEY`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<ApiKey>,
        prompt_model: String,
    },
}

impl LLMConfiguration {
    #[must_use]
    pub fn prompt_model(&self) -> &str {
        match self {
            LLMConfiguration::OpenAI { prompt_model, .. }
            | LLMConfiguration::Ollama { prompt_model, .. }
            | LLMConfiguration::OpenRouter { prompt_model, .. } => prompt_model,
        }
    }

    /// Judges grade deterministically, unless the model does not accept a temperature at all
    #[must_use]
    pub fn temperature(&self) -> Option<f32> {
        match self {
            LLMConfiguration::OpenAI {
                temperature: Some(temperature),
                ..
            } => Some(*temperature),
            _ if accepts_temperature(self.prompt_model()) => Some(0.0),
            _ => None,
        }
    }

    fn openai_config(&self) -> Result<OpenAIConfig> {
        let config = match self {
            LLMConfiguration::OpenAI {
                api_key, base_url, ..
            } => {
                let api_key = api_key
                    .clone()
                    .or_else(|| ApiKey::from_env("OPENAI_API_KEY"))
                    .context("Expected an api key for OpenAI, set `OPENAI_API_KEY` or `api_key`")?;

                let mut config = OpenAIConfig::new().with_api_key(api_key.expose_secret());
                if let Some(base_url) = base_url {
                    config = config.with_api_base(api_base(base_url));
                }
                config
            }
            LLMConfiguration::Ollama { base_url, .. } => {
                let base = base_url
                    .as_ref()
                    .map_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string(), api_base);

                // Ollama ignores the key, but the client always sends one
                OpenAIConfig::new()
                    .with_api_base(base)
                    .with_api_key("ollama")
            }
            LLMConfiguration::OpenRouter { api_key, .. } => {
                let api_key = api_key
                    .clone()
                    .or_else(|| ApiKey::from_env("OPENROUTER_API_KEY"))
                    .context(
                        "Expected an api key for OpenRouter, set `OPENROUTER_API_KEY` or `api_key`",
                    )?;

                OpenAIConfig::new()
                    .with_api_base(DEFAULT_OPENROUTER_BASE_URL)
                    .with_api_key(api_key.expose_secret())
            }
        };

        Ok(config)
    }

    pub fn get_judge_model(&self, backoff_config: BackoffConfiguration) -> Result<OpenAIJudgeModel> {
        let config = self
            .openai_config()
            .with_context(|| format!("Failed to configure {self} judge model"))?;

        let client = async_openai::Client::with_config(config).with_backoff(backoff_config.into());

        Ok(OpenAIJudgeModel::new(
            client,
            self.prompt_model(),
            self.temperature(),
        ))
    }
}

/// The client appends paths like `/chat/completions` verbatim
fn api_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// Reasoning models only accept their default temperature
fn accepts_temperature(model: &str) -> bool {
    let name = model.rsplit('/').next().unwrap_or(model);
    let is_reasoning = name.starts_with("gpt-5")
        || (name.starts_with('o') && name.chars().nth(1).is_some_and(|c| c.is_ascii_digit()));

    !is_reasoning
}

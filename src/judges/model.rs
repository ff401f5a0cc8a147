use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use super::JudgeError;

/// Strict JSON schema the judge has to answer with
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub description: Option<String>,
    pub schema: Value,
}

/// A model that answers a single prompt with JSON matching a schema
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StructuredPrompt: Send + Sync {
    async fn prompt_structured(
        &self,
        prompt: String,
        schema: ResponseSchema,
    ) -> Result<Value, JudgeError>;
}

#[derive(Debug, Clone)]
pub struct OpenAIJudgeModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIJudgeModel {
    pub fn new(
        client: Client<OpenAIConfig>,
        model: impl Into<String>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl StructuredPrompt for OpenAIJudgeModel {
    #[tracing::instrument(skip_all, fields(model = %self.model, schema = %schema.name), err)]
    async fn prompt_structured(
        &self,
        prompt: String,
        schema: ResponseSchema,
    ) -> Result<Value, JudgeError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into()];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: schema.description,
                    name: schema.name,
                    schema: Some(schema.schema),
                    strict: Some(true),
                },
            });

        if let Some(temperature) = self.temperature {
            request.temperature(temperature);
        }

        let response = self.client.chat().create(request.build()?).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Judge responded"
            );
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or(JudgeError::EmptyResponse)?
            .message;

        if let Some(refusal) = message.refusal {
            return Err(JudgeError::Refusal(refusal));
        }

        let content = message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or(JudgeError::EmptyResponse)?;

        serde_json::from_str(&content).map_err(|err| JudgeError::InvalidGrade {
            message: err.to_string(),
            raw: content,
        })
    }
}

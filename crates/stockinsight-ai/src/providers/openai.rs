use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stockinsight_core::{HttpAuth, HttpClient, HttpRequest, LlmVendor};

use crate::error::LlmError;
use crate::providers::{send, LlmProvider, MAX_TOKENS, REQUEST_TIMEOUT_MS, TEMPERATURE};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Reasoning-model families only accept this token limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// `gpt-5*` and `o*` models reject `max_tokens` and a custom temperature.
fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_ascii_lowercase();
    model.starts_with("gpt-5")
        || (model.starts_with('o') && model[1..].starts_with(|c: char| c.is_ascii_digit()))
}

/// OpenAI chat completions in JSON mode.
pub struct OpenAiProvider {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: String::from(API_URL),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }


    fn request_body(&self, system: &str, user: &str) -> Result<serde_json::Value, LlmError> {
        let reasoning = is_reasoning_model(&self.model);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: (!reasoning).then_some(MAX_TOKENS),
            max_completion_tokens: reasoning.then_some(MAX_TOKENS),
            temperature: (!reasoning).then_some(TEMPERATURE),
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        serde_json::to_value(&request)
            .map_err(|e| LlmError::invalid_response(LlmVendor::OpenAi, e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn vendor(&self) -> LlmVendor {
        LlmVendor::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        if !self.is_configured() {
            return Err(LlmError::not_configured(LlmVendor::OpenAi));
        }

        let request = HttpRequest::post(&self.endpoint)
            .with_auth(&HttpAuth::BearerToken(self.api_key.clone()))
            .with_json(&self.request_body(system, user)?)
            .with_timeout_ms(REQUEST_TIMEOUT_MS);
        let body = send(LlmVendor::OpenAi, self.http_client.as_ref(), request).await?;

        let response: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::invalid_response(LlmVendor::OpenAi, format!("JSON parse error: {e}"))
        })?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::invalid_response(LlmVendor::OpenAi, "empty completion"))
    }
}

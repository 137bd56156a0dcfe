use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stockinsight_core::{HttpAuth, HttpClient, HttpRequest, LlmVendor};

use crate::error::LlmError;
use crate::providers::{send, LlmProvider, MAX_TOKENS, REQUEST_TIMEOUT_MS};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

/// Anthropic messages API.
pub struct AnthropicProvider {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicProvider {
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
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn vendor(&self) -> LlmVendor {
        LlmVendor::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        if !self.is_configured() {
            return Err(LlmError::not_configured(LlmVendor::Anthropic));
        }

        let body = serde_json::to_value(MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Message {
                role: "user",
                content: user,
            }],
        })
        .map_err(|e| LlmError::invalid_response(LlmVendor::Anthropic, e.to_string()))?;

        let request = HttpRequest::post(&self.endpoint)
            .with_auth(&HttpAuth::Header {
                name: String::from("x-api-key"),
                value: self.api_key.clone(),
            })
            .with_header("anthropic-version", API_VERSION)
            .with_json(&body)
            .with_timeout_ms(REQUEST_TIMEOUT_MS);
        let body =
            send(LlmVendor::Anthropic, self.http_client.as_ref(), request).await?;

        let response: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::invalid_response(LlmVendor::Anthropic, format!("JSON parse error: {e}"))
        })?;
        let text: String = response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::invalid_response(
                LlmVendor::Anthropic,
                "empty completion",
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmErrorKind;
    use stockinsight_core::{CannedHttpClient, HttpError};

    #[tokio::test]
    async fn sends_versioned_messages_request() {
        let client = Arc::new(CannedHttpClient::new().with_route(
            "v1/messages",
            200,
            r#"{"content":[{"type":"text","text":"{\"risk_score\":3}"}]}"#,
        ));
        let provider = AnthropicProvider::new(client.clone(), "ak-test", "claude-3-5-sonnet-20241022");

        let text = provider.complete("be terse", "analyze AAPL").await.expect("completion");
        assert_eq!(text, r#"{"risk_score":3}"#);

        let sent = &client.requests()[0];
        assert_eq!(sent.headers.get("x-api-key").map(String::as_str), Some("ak-test"));
        assert_eq!(
            sent.headers.get("anthropic-version").map(String::as_str),
            Some("2023-06-01")
        );
        let body: serde_json::Value =
            serde_json::from_str(sent.body.as_deref().expect("body")).expect("json");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let client = Arc::new(
            CannedHttpClient::new().with_failure("v1/messages", HttpError::non_retryable("reset")),
        );
        let provider = AnthropicProvider::new(client, "ak-test", "claude");

        let error = provider.complete("s", "u").await.expect_err("network");
        assert_eq!(error.kind, LlmErrorKind::Network);
    }

    #[tokio::test]
    async fn when_server_fails_then_request_is_sent_once() {
        // Given
        let client = Arc::new(CannedHttpClient::new().with_route("v1/messages", 529, "overloaded"));
        let provider = AnthropicProvider::new(client.clone(), "ak-test", "claude");

        // When
        let error = provider.complete("s", "u").await.expect_err("overloaded");

        // Then
        assert_eq!(error.kind, LlmErrorKind::ServerError);
        assert_eq!(client.requests().len(), 1);
    }
}

//! LLM backends behind one chat-completion capability.

mod anthropic;
mod openai;

use async_trait::async_trait;
use stockinsight_core::{HttpClient, HttpRequest, LlmVendor};

use crate::error::LlmError;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Upper bound on generated tokens for one insight.
pub const MAX_TOKENS: u32 = 4_000;
pub const TEMPERATURE: f32 = 0.3;
/// Model calls routinely take tens of seconds.
pub const REQUEST_TIMEOUT_MS: u64 = 120_000;

/// One system instruction plus one user message in, free text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn vendor(&self) -> LlmVendor;

    fn model(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Sends `request` exactly once and returns the success body.
pub(crate) async fn send(
    vendor: LlmVendor,
    http_client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<String, LlmError> {
    let response = http_client
        .execute(request)
        .await
        .map_err(|error| LlmError::network(vendor, &error))?;

    if !response.is_success() {
        return Err(LlmError::from_status(vendor, response.status, &response.body));
    }
    Ok(response.body)
}

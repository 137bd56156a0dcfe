//! # Stockinsight AI
//!
//! Model-backed insight generation.
//!
//! | Module | Role |
//! |--------|------|
//! | [`providers`] | OpenAI and Anthropic chat clients behind [`LlmProvider`] |
//! | [`router`] | Preferred-provider routing with one failover and circuit breakers |
//! | [`prompts`] | System prompt and per-stock user prompt |
//! | [`validator`] | Lenient JSON extraction with field-level defaults |
//! | [`generator`] | Quote, model, parse and persist as one state machine |
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stockinsight_ai::{LlmRouter, OpenAiProvider, LlmProvider};
//! use stockinsight_core::{CircuitBreakerConfig, LlmVendor, ReqwestHttpClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let http = Arc::new(ReqwestHttpClient::default());
//! let openai: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(http, "sk-...", "gpt-4o"));
//! let router = LlmRouter::new(LlmVendor::OpenAi, vec![openai], CircuitBreakerConfig::default());
//! let completion = router.complete("Reply in JSON.", "Analyze AAPL").await?;
//! println!("{} answered", completion.model);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod generator;
pub mod prompts;
pub mod providers;
pub mod router;
pub mod validator;

pub use error::{LlmError, LlmErrorKind};
pub use generator::{GenerationFailure, GenerationRequest, GenerationState, InsightGenerator};
pub use providers::{AnthropicProvider, LlmProvider, OpenAiProvider};
pub use router::{Completion, LlmRouter, ProviderStatus};
pub use validator::{default_fields, parse_insight};

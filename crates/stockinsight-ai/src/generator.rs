//! Insight generation as an explicit state machine.
//!
//! ```text
//! Idle ──quote──▶ DataCollected ──model──▶ ModelInvoked ──parse──▶ Parsed ──store──▶ Persisted
//!   └──────────────────┴───────────────────────┴─────────────────────┴──▶ Failed
//! ```

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use stockinsight_core::{
    CanonicalSymbol, InsightRecord, NewInsight, QuoteService, QuoteSnapshot, ServiceError,
    Timeframe, UserId,
};
use stockinsight_warehouse::InsightStore;
use thiserror::Error;

use crate::error::LlmError;
use crate::prompts::{build_user_prompt, SYSTEM_PROMPT};
use crate::router::LlmRouter;
use crate::validator::parse_insight;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    DataCollected,
    ModelInvoked,
    Parsed,
    Persisted,
    Failed,
}

impl GenerationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DataCollected => "data_collected",
            Self::ModelInvoked => "model_invoked",
            Self::Parsed => "parsed",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Failed)
    }
}

impl Display for GenerationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a generation ended in [`GenerationState::Failed`].
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("no market data: {0}")]
    NoData(ServiceError),

    #[error("generation error: {0}")]
    Generation(#[from] LlmError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<GenerationFailure> for ServiceError {
    fn from(failure: GenerationFailure) -> Self {
        match failure {
            GenerationFailure::NoData(error) => error,
            GenerationFailure::Generation(error) => error.into(),
            GenerationFailure::Persistence(message) => Self::Persistence(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub symbol: CanonicalSymbol,
    pub timeframe: Timeframe,
    pub user_id: UserId,
}

/// Tracks and logs the state of one generation.
struct Run<'a> {
    symbol: &'a CanonicalSymbol,
    state: GenerationState,
}

impl<'a> Run<'a> {
    fn start(symbol: &'a CanonicalSymbol) -> Self {
        Self {
            symbol,
            state: GenerationState::Idle,
        }
    }

    fn advance(&mut self, next: GenerationState) {
        info!("insight {}: {} -> {next}", self.symbol, self.state);
        self.state = next;
    }

    fn fail(&mut self, failure: GenerationFailure) -> GenerationFailure {
        error!("insight {}: {} -> failed ({failure})", self.symbol, self.state);
        self.state = GenerationState::Failed;
        failure
    }
}

fn to_insight(
    request: &GenerationRequest,
    quote: &QuoteSnapshot,
    raw: &str,
    model: String,
    started: Instant,
) -> NewInsight {
    NewInsight {
        user_id: request.user_id.clone(),
        symbol: request.symbol.code().to_owned(),
        display_name: quote.name.clone(),
        market: request.symbol.market(),
        timeframe: request.timeframe,
        fields: parse_insight(raw),
        current_price: Some(quote.price),
        price_change_1d: quote.change_1d_pct,
        price_change_1w: quote.change_1w_pct,
        price_change_1m: quote.change_1m_pct,
        model,
        processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

pub struct InsightGenerator {
    quotes: Arc<QuoteService>,
    router: Arc<LlmRouter>,
    store: Arc<dyn InsightStore>,
}

impl InsightGenerator {
    pub fn new(
        quotes: Arc<QuoteService>,
        router: Arc<LlmRouter>,
        store: Arc<dyn InsightStore>,
    ) -> Self {
        Self {
            quotes,
            router,
            store,
        }
    }

    pub fn router(&self) -> &Arc<LlmRouter> {
        &self.router
    }

    /// Runs one generation to a terminal state. The record is written
    /// exactly once, only after every earlier step succeeded.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<InsightRecord, GenerationFailure> {
        let started = Instant::now();
        let mut run = Run::start(&request.symbol);

        let quote = match self.quotes.get_quote(&request.symbol).await {
            Ok(quote) => quote,
            Err(error) => return Err(run.fail(GenerationFailure::NoData(error))),
        };
        run.advance(GenerationState::DataCollected);

        let user_prompt = build_user_prompt(&quote, request.timeframe);
        let completion = match self.router.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(completion) => completion,
            Err(error) => return Err(run.fail(error.into())),
        };
        run.advance(GenerationState::ModelInvoked);

        let insight = to_insight(&request, &quote, &completion.text, completion.model, started);
        run.advance(GenerationState::Parsed);

        let store = Arc::clone(&self.store);
        let stored = tokio::task::spawn_blocking(move || store.insert(insight)).await;
        let record = match stored {
            Ok(Ok(record)) => record,
            Ok(Err(error)) => {
                return Err(run.fail(GenerationFailure::Persistence(error.to_string())))
            }
            Err(join_error) => {
                return Err(run.fail(GenerationFailure::Persistence(join_error.to_string())))
            }
        };
        run.advance(GenerationState::Persisted);

        info!(
            "insight {} stored for {}: {} in {}ms",
            record.id,
            record.symbol,
            record.fields.recommendation.as_str(),
            record.processing_time_ms
        );
        Ok(record)
    }
}

//! # Quotes
//!
//! Market-dispatched quote fetching with a per-symbol TTL cache.
//!
//! | Market | Backend | Notes |
//! |--------|---------|-------|
//! | Foreign | [`FinnhubAdapter`] | quote + profile + metrics, shared 60/min budget |
//! | Domestic | [`YahooDomesticAdapter`] | quoteSummary blob + 3 month daily closes |

mod finnhub;
mod yahoo;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::cache::CacheStore;
use crate::domain::{CanonicalSymbol, Market, QuoteSnapshot};
use crate::error::{ServiceError, SourceError};

pub use finnhub::FinnhubAdapter;
pub use yahoo::YahooDomesticAdapter;

/// One market's quote backend.
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn market(&self) -> Market;

    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a CanonicalSymbol,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSnapshot, SourceError>> + Send + 'a>>;
}

/// Maps a non-success upstream status to a source error.
pub(crate) fn status_error(provider: &str, status: u16) -> SourceError {
    match status {
        404 => SourceError::not_found(format!("{provider} has no data (status 404)")),
        401 | 403 => SourceError::not_configured(format!("{provider} rejected the credentials")),
        429 => SourceError::rate_limited(format!("{provider} rate limit exceeded")),
        _ => SourceError::unavailable(format!("{provider} returned status {status}")),
    }
}

pub struct QuoteService {
    domestic: Arc<dyn QuoteProvider>,
    foreign: Arc<dyn QuoteProvider>,
    cache: CacheStore<QuoteSnapshot>,
}

impl QuoteService {
    pub fn new(
        domestic: Arc<dyn QuoteProvider>,
        foreign: Arc<dyn QuoteProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            domestic,
            foreign,
            cache: CacheStore::new(ttl),
        }
    }

    fn provider_for(&self, market: Market) -> &Arc<dyn QuoteProvider> {
        match market {
            Market::Domestic => &self.domestic,
            Market::Foreign => &self.foreign,
        }
    }

    /// Cached quote for `symbol`. A cache hit makes no network call; a
    /// quote without a positive price is reported as not found.
    pub async fn get_quote(&self, symbol: &CanonicalSymbol) -> Result<QuoteSnapshot, ServiceError> {
        if let Some(quote) = self.cache.get(symbol.code()).await {
            debug!("quote cache hit for {symbol}");
            return Ok(quote);
        }

        let provider = self.provider_for(symbol.market());
        let quote = provider.fetch_quote(symbol).await.map_err(|error| {
            warn!("{} quote for {symbol} failed: {error}", provider.name());
            ServiceError::from(error)
        })?;

        if !quote.has_price() {
            return Err(ServiceError::NotFound(format!(
                "no quote data for {}",
                symbol.code()
            )));
        }

        info!(
            "{} quote for {symbol}: {} {}",
            provider.name(),
            quote.price,
            quote.currency
        );
        self.cache
            .put(symbol.code(), quote.clone(), None)
            .await;
        Ok(quote)
    }

    pub async fn cached_symbols(&self) -> usize {
        self.cache.len().await
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::domain::{CanonicalSymbol, Market, QuoteSnapshot, UtcDateTime};
use crate::error::SourceError;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::quotes::{status_error, QuoteProvider};
use crate::resolver::TickerSearch;
use crate::throttling::RateBudget;

const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
/// Free tier allowance.
const FINNHUB_CALLS_PER_MINUTE: u32 = 60;
const SEARCH_RESULT_LIMIT: usize = 10;

/// Foreign-market quotes from Finnhub.
pub struct FinnhubAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    budget: RateBudget,
    circuit_breaker: CircuitBreaker,
}

impl FinnhubAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: String::from(FINNHUB_BASE_URL),
            budget: RateBudget::per_minute(FINNHUB_CALLS_PER_MINUTE),
            circuit_breaker: CircuitBreaker::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn get_json<T>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        if !self.is_configured() {
            return Err(SourceError::not_configured("FINNHUB_API key is not set"));
        }
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::unavailable("finnhub circuit is open"));
        }

        self.budget.acquire().await;
        let request = HttpRequest::get(format!("{}/{endpoint}", self.base_url))
            .with_query(query)
            .with_auth(&HttpAuth::Header {
                name: String::from("X-Finnhub-Token"),
                value: self.api_key.clone(),
            });

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::unavailable(format!(
                    "finnhub {endpoint} request failed: {error}"
                )));
            }
        };

        if !response.is_success() {
            if response.status >= 500 || response.status == 429 {
                self.circuit_breaker.record_failure();
            }
            return Err(status_error("finnhub", response.status));
        }

        self.circuit_breaker.record_success();
        serde_json::from_str(&response.body)
            .map_err(|e| SourceError::internal(format!("malformed finnhub {endpoint} payload: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    l: Option<f64>,
    #[serde(default)]
    o: Option<f64>,
    #[serde(default)]
    pc: Option<f64>,
    #[serde(default)]
    t: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubProfile {
    name: Option<String>,
    currency: Option<String>,
    /// Millions of the listing currency.
    market_capitalization: Option<f64>,
    finnhub_industry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FinnhubMetricResponse {
    #[serde(default)]
    metric: FinnhubMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct FinnhubMetrics {
    #[serde(rename = "peBasicExclExtraTTM")]
    pe_ratio: Option<f64>,
    #[serde(rename = "pbAnnual")]
    pb_ratio: Option<f64>,
    beta: Option<f64>,
    #[serde(rename = "52WeekHigh")]
    high_52w: Option<f64>,
    #[serde(rename = "52WeekLow")]
    low_52w: Option<f64>,
    #[serde(rename = "currentDividendYieldTTM")]
    dividend_yield: Option<f64>,
    /// Millions of shares.
    #[serde(rename = "10DayAverageTradingVolume")]
    avg_volume_10d: Option<f64>,
    #[serde(rename = "5DayPriceReturnDaily")]
    return_5d: Option<f64>,
    #[serde(rename = "monthToDatePriceReturnDaily")]
    return_mtd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubSearchResponse {
    #[serde(default)]
    result: Vec<FinnhubSearchHit>,
}

#[derive(Debug, Deserialize)]
struct FinnhubSearchHit {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    description: String,
}

fn merge_snapshot(
    symbol: &CanonicalSymbol,
    quote: FinnhubQuote,
    profile: FinnhubProfile,
    metrics: FinnhubMetrics,
) -> QuoteSnapshot {
    let price = quote.c.unwrap_or_default();
    let mut snapshot = QuoteSnapshot::new(
        symbol.clone(),
        price,
        profile.currency.unwrap_or_else(|| String::from("USD")),
    );

    if let Some(name) = profile.name.filter(|name| !name.trim().is_empty()) {
        snapshot.name = name;
    }
    snapshot.change_1d = quote.d;
    snapshot.change_1d_pct = quote.dp;
    snapshot.change_1w_pct = metrics.return_5d;
    snapshot.change_1m_pct = metrics.return_mtd;
    snapshot.day_open = quote.o.filter(|value| *value > 0.0);
    snapshot.day_high = quote.h.filter(|value| *value > 0.0);
    snapshot.day_low = quote.l.filter(|value| *value > 0.0);
    snapshot.previous_close = quote.pc.filter(|value| *value > 0.0);
    snapshot.avg_volume = metrics
        .avg_volume_10d
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(|millions| (millions * 1_000_000.0).round() as u64);
    snapshot.market_cap = profile
        .market_capitalization
        .filter(|value| *value > 0.0)
        .map(|millions| millions * 1_000_000.0);
    snapshot.pe_ratio = metrics.pe_ratio;
    snapshot.pb_ratio = metrics.pb_ratio;
    snapshot.dividend_yield = metrics.dividend_yield;
    snapshot.fifty_two_week_high = metrics.high_52w;
    snapshot.fifty_two_week_low = metrics.low_52w;
    snapshot.beta = metrics.beta;
    snapshot.industry = profile.finnhub_industry;
    if let Some(as_of) = quote.t.and_then(UtcDateTime::from_unix_seconds) {
        snapshot.as_of = as_of;
    }
    snapshot
}

impl QuoteProvider for FinnhubAdapter {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    fn market(&self) -> Market {
        Market::Foreign
    }

    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a CanonicalSymbol,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSnapshot, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let ticker = symbol.code();
            let quote: FinnhubQuote = self.get_json("quote", &[("symbol", ticker)]).await?;
            if quote.c.unwrap_or_default() <= 0.0 {
                return Err(SourceError::not_found(format!("no quote data for {ticker}")));
            }

            let profile = self
                .get_json::<FinnhubProfile>("stock/profile2", &[("symbol", ticker)])
                .await
                .unwrap_or_else(|error| {
                    debug!("finnhub profile for {ticker} unavailable: {error}");
                    FinnhubProfile::default()
                });
            let metrics = self
                .get_json::<FinnhubMetricResponse>("stock/metric", &[("symbol", ticker), ("metric", "all")])
                .await
                .map(|response| response.metric)
                .unwrap_or_else(|error| {
                    debug!("finnhub metrics for {ticker} unavailable: {error}");
                    FinnhubMetrics::default()
                });

            Ok(merge_snapshot(symbol, quote, profile, metrics))
        })
    }
}

impl TickerSearch for FinnhubAdapter {
    fn search_tickers<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CanonicalSymbol>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let response: FinnhubSearchResponse = self.get_json("search", &[("q", query)]).await?;
            Ok(response
                .result
                .into_iter()
                .filter(|hit| !hit.symbol.is_empty())
                .take(SEARCH_RESULT_LIMIT)
                .map(|hit| {
                    let name = if hit.description.is_empty() {
                        hit.symbol.clone()
                    } else {
                        hit.description
                    };
                    CanonicalSymbol::foreign(&hit.symbol, name)
                })
                .collect())
        })
    }
}

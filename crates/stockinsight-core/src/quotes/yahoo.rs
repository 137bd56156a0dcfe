use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Deserialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::domain::{
    percent_change, session_change_pct, CanonicalSymbol, Market, QuoteSnapshot, UtcDateTime,
};
use crate::error::SourceError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::quotes::{status_error, QuoteProvider};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const SUMMARY_BASE_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,assetProfile";
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(60 * 60);

const WEEK_SESSIONS: usize = 7;
const MONTH_SESSIONS: usize = 30;

/// Cookie/crumb pair required by the quoteSummary endpoint.
///
/// The cookie lives in the transport's jar; only the crumb is held here.
#[derive(Debug, Default)]
struct CrumbSession {
    crumb: tokio::sync::Mutex<Option<(String, Instant)>>,
}

impl CrumbSession {
    async fn crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        let mut slot = self.crumb.lock().await;
        if let Some((crumb, fetched_at)) = slot.as_ref() {
            if fetched_at.elapsed() < CRUMB_TTL {
                return Ok(crumb.clone());
            }
        }

        let crumb = Self::fetch(http_client).await?;
        *slot = Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }

    async fn fetch(http_client: &dyn HttpClient) -> Result<String, SourceError> {
        // Status is irrelevant; the response only seeds the cookie jar.
        let _ = http_client
            .execute(HttpRequest::get(COOKIE_URL).with_header("referer", REFERER))
            .await;

        for url in CRUMB_URLS {
            let request = HttpRequest::get(url).with_header("referer", REFERER);
            let Ok(response) = http_client.execute(request).await else {
                continue;
            };
            let body = response.body.trim();
            if response.status == 429 || body.to_ascii_lowercase().contains("too many requests") {
                return Err(SourceError::rate_limited("yahoo throttled the crumb request"));
            }
            let plausible = response.is_success()
                && !body.is_empty()
                && body.len() < 100
                && !body.contains(char::is_whitespace)
                && !body.contains('<');
            if plausible {
                return Ok(body.to_owned());
            }
        }

        Err(SourceError::unavailable("could not obtain a yahoo crumb"))
    }
}

/// Domestic-market quotes from Yahoo Finance (`.KS` / `.KQ` tickers).
pub struct YahooDomesticAdapter {
    http_client: Arc<dyn HttpClient>,
    session: CrumbSession,
    circuit_breaker: CircuitBreaker,
}

impl YahooDomesticAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            session: CrumbSession::default(),
            circuit_breaker: CircuitBreaker::default(),
        }
    }

    async fn get(&self, request: HttpRequest, what: &str) -> Result<String, SourceError> {
        let response = self.http_client.execute(request).await.map_err(|e| {
            self.circuit_breaker.record_failure();
            SourceError::unavailable(format!("yahoo {what} request failed: {e}"))
        })?;

        if !response.is_success() {
            if response.status >= 500 {
                self.circuit_breaker.record_failure();
            }
            return Err(status_error("yahoo", response.status));
        }

        self.circuit_breaker.record_success();
        Ok(response.body)
    }

    async fn fetch_summary(&self, ticker: &str) -> Result<SummaryResult, SourceError> {
        let crumb = self.session.crumb(self.http_client.as_ref()).await?;
        let request = HttpRequest::get(format!("{SUMMARY_BASE_URL}/{ticker}"))
            .with_query(&[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .with_header("referer", REFERER);

        let body = match self.get(request, "quoteSummary").await {
            Ok(body) => body,
            Err(error) => {
                if error.code() == "source.not_configured" {
                    // 401 usually means the crumb went stale.
                    self.session.invalidate().await;
                }
                return Err(error);
            }
        };

        let envelope: SummaryEnvelope = serde_json::from_str(&body)
            .map_err(|e| SourceError::internal(format!("malformed quoteSummary payload: {e}")))?;
        envelope
            .quote_summary
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::not_found(format!("no quoteSummary for {ticker}")))
    }

    async fn fetch_chart(&self, ticker: &str) -> Result<ChartResult, SourceError> {
        let request = HttpRequest::get(format!("{CHART_BASE_URL}/{ticker}"))
            .with_query(&[("range", "3mo"), ("interval", "1d")])
            .with_header("referer", REFERER);
        let body = self.get(request, "chart").await?;

        let envelope: ChartEnvelope = serde_json::from_str(&body)
            .map_err(|e| SourceError::internal(format!("malformed chart payload: {e}")))?;
        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::not_found(format!("no chart for {ticker}")))
    }
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value
        .and_then(|value| value.raw)
        .filter(|value| value.is_finite())
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    price: PriceModule,
    #[serde(default)]
    summary_detail: SummaryDetailModule,
    #[serde(default)]
    default_key_statistics: KeyStatisticsModule,
    #[serde(default)]
    asset_profile: AssetProfileModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
    currency: Option<String>,
    regular_market_price: Option<RawValue>,
    regular_market_open: Option<RawValue>,
    regular_market_day_high: Option<RawValue>,
    regular_market_day_low: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
    regular_market_volume: Option<RawValue>,
    market_cap: Option<RawValue>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    fifty_two_week_high: Option<RawValue>,
    fifty_two_week_low: Option<RawValue>,
    average_volume: Option<RawValue>,
    beta: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    price_to_book: Option<RawValue>,
    beta: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfileModule {
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn to_count(value: Option<f64>) -> Option<u64> {
    value
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value.round() as u64)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Combines the summary blob and the close series; either may be absent.
fn build_snapshot(
    symbol: &CanonicalSymbol,
    summary: Option<SummaryResult>,
    chart: Option<ChartResult>,
) -> QuoteSnapshot {
    let summary = summary.unwrap_or_default();
    let (meta, closes) = match chart {
        Some(chart) => {
            let closes = chart
                .indicators
                .quote
                .into_iter()
                .next()
                .map(|quote| quote.close)
                .unwrap_or_default();
            (chart.meta, closes)
        }
        None => (ChartMeta::default(), Vec::new()),
    };

    let price_module = &summary.price;
    let price = raw(&price_module.regular_market_price)
        .or(meta.regular_market_price)
        .unwrap_or_default();
    let currency = non_empty(price_module.currency.clone())
        .or(meta.currency.clone())
        .unwrap_or_else(|| String::from("KRW"));

    let mut snapshot = QuoteSnapshot::new(symbol.clone(), price, currency);
    if let Some(name) = non_empty(price_module.long_name.clone())
        .or_else(|| non_empty(price_module.short_name.clone()))
        .or_else(|| non_empty(meta.long_name.clone()))
        .or_else(|| non_empty(meta.short_name.clone()))
    {
        snapshot.name = name;
    }

    let previous_close = raw(&price_module.regular_market_previous_close)
        .or(meta.chart_previous_close)
        .filter(|value| *value > 0.0);
    snapshot.previous_close = previous_close;
    snapshot.change_1d = previous_close.map(|reference| price - reference);
    snapshot.change_1d_pct = session_change_pct(&closes, 1)
        .or_else(|| previous_close.and_then(|reference| percent_change(price, reference)));
    snapshot.change_1w_pct = session_change_pct(&closes, WEEK_SESSIONS);
    snapshot.change_1m_pct = session_change_pct(&closes, MONTH_SESSIONS);

    snapshot.day_open = raw(&price_module.regular_market_open);
    snapshot.day_high = raw(&price_module.regular_market_day_high).or(meta.regular_market_day_high);
    snapshot.day_low = raw(&price_module.regular_market_day_low).or(meta.regular_market_day_low);
    snapshot.volume = to_count(raw(&price_module.regular_market_volume).or(meta.regular_market_volume));
    snapshot.avg_volume = to_count(raw(&summary.summary_detail.average_volume));
    snapshot.market_cap = raw(&price_module.market_cap);
    snapshot.pe_ratio = raw(&summary.summary_detail.trailing_pe);
    snapshot.pb_ratio = raw(&summary.default_key_statistics.price_to_book);
    snapshot.dividend_yield = raw(&summary.summary_detail.dividend_yield).map(|ratio| ratio * 100.0);
    snapshot.fifty_two_week_high =
        raw(&summary.summary_detail.fifty_two_week_high).or(meta.fifty_two_week_high);
    snapshot.fifty_two_week_low =
        raw(&summary.summary_detail.fifty_two_week_low).or(meta.fifty_two_week_low);
    snapshot.beta = raw(&summary.summary_detail.beta).or(raw(&summary.default_key_statistics.beta));
    snapshot.sector = non_empty(summary.asset_profile.sector);
    snapshot.industry = non_empty(summary.asset_profile.industry);

    if let Some(as_of) = price_module
        .regular_market_time
        .or(meta.regular_market_time)
        .and_then(UtcDateTime::from_unix_seconds)
    {
        snapshot.as_of = as_of;
    }
    snapshot
}

impl QuoteProvider for YahooDomesticAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn market(&self) -> Market {
        Market::Domestic
    }

    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a CanonicalSymbol,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSnapshot, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.circuit_breaker.allow_request() {
                return Err(SourceError::unavailable("yahoo circuit is open"));
            }

            let ticker = symbol.code();
            let summary = self.fetch_summary(ticker).await;
            let chart = self.fetch_chart(ticker).await;

            match (summary, chart) {
                (Err(summary_error), Err(chart_error)) => {
                    warn!("yahoo has no data for {ticker}: {summary_error}; {chart_error}");
                    Err(chart_error)
                }
                (summary, chart) => {
                    if let Err(error) = &summary {
                        debug!("yahoo quoteSummary for {ticker} unavailable: {error}");
                    }
                    if let Err(error) = &chart {
                        debug!("yahoo chart for {ticker} unavailable: {error}");
                    }
                    Ok(build_snapshot(symbol, summary.ok(), chart.ok()))
                }
            }
        })
    }
}

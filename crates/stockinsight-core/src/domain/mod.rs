//! # Domain Models
//!
//! Canonical domain types shared by every stockinsight crate.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CanonicalSymbol`] | Resolved `(code, name, market, segment)` identity |
//! | [`Market`] | Domestic (`KR`) or foreign (`US`) universe |
//! | [`ExchangeSegment`] | KOSPI / KOSDAQ / overseas listing |
//! | [`QuoteSnapshot`] | Point-in-time market data for one symbol |
//! | [`InsightFields`] | Validated model output |
//! | [`InsightRecord`] | Persisted, append-only insight |
//! | [`Timeframe`] | Investment horizon (short, mid, long) |
//! | [`UserId`] | Caller identity (hyphenated UUID v4) |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Enumerated insight values
//!
//! | Type | Values | Default on unknown input |
//! |------|--------|--------------------------|
//! | [`Recommendation`] | strong_buy, buy, hold, sell, strong_sell | hold |
//! | [`Confidence`] | low, medium, high | low |
//! | [`Sentiment`] | bullish, neutral, bearish | neutral |

mod insight;
mod market;
mod quote;
mod symbol;
mod timestamp;
mod user;

pub use insight::{
    Confidence, CurrentDrivers, FutureCatalysts, HistoryPage, HistoryQuery, InsightFields,
    InsightRecord, InsightSummary, MarketOverview, NewInsight, Recommendation, RiskAnalysis,
    Sentiment, SentimentDetails, Timeframe,
};
pub use market::{ExchangeSegment, Market};
pub use quote::{percent_change, session_change_pct, QuoteSnapshot};
pub use symbol::{
    normalize_query, pad_domestic_code, CanonicalSymbol, DOMESTIC_CODE_WIDTH, MAX_QUERY_LENGTH,
};
pub use timestamp::UtcDateTime;
pub use user::UserId;

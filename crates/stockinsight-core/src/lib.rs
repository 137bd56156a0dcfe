//! # Stockinsight Core
//!
//! Domain contracts and market-data plumbing shared by the stockinsight
//! service crates.
//!
//! ## Overview
//!
//! - **Canonical domain models** for symbols, quotes and persisted insights
//! - **Symbol resolution** from free text to a `(code, name, market)` identity
//! - **Market directory** of listed domestic stocks with single-flight reloads
//! - **Quote adapters** with a per-symbol TTL cache
//! - **Resilience primitives** (circuit breaker, retry policy, rate budget)
//! - **Configuration** read once from the process environment
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Generic TTL cache |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Environment-driven application configuration |
//! | [`directory`] | Listed-stock directory and its KRX source |
//! | [`domain`] | Domain models |
//! | [`error`] | Validation, source and service errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`quotes`] | Quote providers (Finnhub, Yahoo) and the cached quote service |
//! | [`resolver`] | Free-text symbol resolution |
//! | [`retry`] | Retry and backoff policy |
//! | [`throttling`] | Request budgets |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Symbol Resolver │────▶│ Market Directory │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Quote Service   │────▶│ HTTP Client      │
//! │ (TTL cache)     │     │ (reqwest/canned) │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Domain Models   │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapters return [`SourceError`]; services convert to [`ServiceError`],
//! whose [`ServiceError::code`] is the stable machine-readable code used on
//! the wire.
//!
//! ```rust
//! use stockinsight_core::{ServiceError, SourceError};
//!
//! let error = ServiceError::from(SourceError::not_found("no quote for ZZZZ"));
//! assert_eq!(error.code(), "not_found");
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod directory;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod quotes;
pub mod resolver;
pub mod retry;
pub mod throttling;

pub use cache::CacheStore;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{
    AppConfig, ConfigError, LemonSqueezyConfig, LlmConfig, LlmVendor, MarketDataConfig,
    PaymentConfig, PaymentVendor, PortOneConfig, ServerConfig, StorageConfig,
};
pub use directory::{
    DirectoryEntry, DirectorySource, KrxDirectorySource, Listings, MarketDirectory,
};
pub use domain::{
    CanonicalSymbol, Confidence, CurrentDrivers, ExchangeSegment, FutureCatalysts, HistoryPage,
    HistoryQuery, InsightFields, InsightRecord, InsightSummary, Market, MarketOverview,
    NewInsight, QuoteSnapshot, Recommendation, RiskAnalysis, Sentiment, SentimentDetails,
    Timeframe, UserId, UtcDateTime,
};
pub use error::{ServiceError, SourceError, SourceErrorKind, ValidationError};
pub use http_client::{
    CannedHttpClient, HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use quotes::{FinnhubAdapter, QuoteProvider, QuoteService, YahooDomesticAdapter};
pub use resolver::{SymbolResolver, TickerSearch};
pub use retry::{Backoff, RetryConfig};
pub use throttling::RateBudget;

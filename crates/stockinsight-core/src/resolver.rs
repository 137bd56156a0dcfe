//! Free-text stock query to [`CanonicalSymbol`].
//!
//! Resolution order, first match wins:
//!
//! 1. suffixed domestic code (`005930.KS`), checked against the directory
//! 2. static alias table (domestic and foreign names)
//! 3. directory: exact code, then exact listing name
//! 4. all digits: zero-padded and looked up in the directory
//! 5. uppercase alphabetic: foreign ticker as-is
//! 6. anything else: uppercased foreign ticker
//!
//! Foreign tickers are never checked over the network here; an unknown
//! ticker surfaces later as "no quote data".

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, warn};

use crate::directory::MarketDirectory;
use crate::domain::{normalize_query, pad_domestic_code, CanonicalSymbol, ExchangeSegment, Market};
use crate::error::{ServiceError, SourceError};

/// Curated domestic names, `name -> suffixed code`.
const DOMESTIC_ALIASES: &[(&str, &str)] = &[
    ("삼성전자", "005930.KS"),
    ("SK하이닉스", "000660.KS"),
    ("LG에너지솔루션", "373220.KS"),
    ("삼성바이오로직스", "207940.KS"),
    ("현대차", "005380.KS"),
    ("기아", "000270.KS"),
    ("셀트리온", "068270.KS"),
    ("KB금융", "105560.KS"),
    ("신한지주", "055550.KS"),
    ("POSCO홀딩스", "005490.KS"),
    ("네이버", "035420.KS"),
    ("카카오", "035720.KS"),
    ("LG화학", "051910.KS"),
    ("삼성SDI", "006400.KS"),
    ("현대모비스", "012330.KS"),
];

/// Foreign companies by their domestic-locale name, `name -> ticker`.
const FOREIGN_ALIASES: &[(&str, &str)] = &[
    ("애플", "AAPL"),
    ("마이크로소프트", "MSFT"),
    ("구글", "GOOGL"),
    ("아마존", "AMZN"),
    ("테슬라", "TSLA"),
    ("엔비디아", "NVDA"),
    ("메타", "META"),
    ("넷플릭스", "NFLX"),
    ("버크셔해서웨이", "BRK-B"),
];

/// Maximum number of hits returned by [`SymbolResolver::search`].
pub const SEARCH_RESULT_CAP: usize = 10;
/// Local hit count below which the remote ticker search is consulted.
pub const REMOTE_SEARCH_THRESHOLD: usize = 5;

/// Remote ticker search used to widen sparse local results.
pub trait TickerSearch: Send + Sync {
    fn search_tickers<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CanonicalSymbol>, SourceError>> + Send + 'a>>;
}

fn alias_symbol(name: &str, code: &str) -> CanonicalSymbol {
    match ExchangeSegment::from_suffix(code) {
        Some(segment) => {
            let local = code.strip_suffix(segment.suffix()).unwrap_or(code);
            CanonicalSymbol::domestic(local, name, segment)
        }
        None => CanonicalSymbol::foreign(code, name),
    }
}

fn lookup_alias(query: &str) -> Option<CanonicalSymbol> {
    DOMESTIC_ALIASES
        .iter()
        .chain(FOREIGN_ALIASES)
        .find(|(name, _)| *name == query)
        .map(|(name, code)| alias_symbol(name, code))
}

fn is_suffixed_domestic(query: &str) -> bool {
    ExchangeSegment::from_suffix(query).is_some_and(|segment| {
        let local = &query[..query.len() - segment.suffix().len()];
        !local.is_empty() && local.bytes().all(|b| b.is_ascii_digit())
    })
}

fn is_uppercase_ticker(query: &str) -> bool {
    query.chars().all(|c| c.is_ascii_alphabetic()) && query.chars().all(|c| c.is_ascii_uppercase())
}

pub struct SymbolResolver {
    directory: Arc<MarketDirectory>,
    ticker_search: Option<Arc<dyn TickerSearch>>,
}

impl SymbolResolver {
    pub fn new(directory: Arc<MarketDirectory>) -> Self {
        Self {
            directory,
            ticker_search: None,
        }
    }

    pub fn with_ticker_search(mut self, ticker_search: Arc<dyn TickerSearch>) -> Self {
        self.ticker_search = Some(ticker_search);
        self
    }

    pub fn directory(&self) -> &Arc<MarketDirectory> {
        &self.directory
    }

    pub async fn resolve(&self, query: &str) -> Result<CanonicalSymbol, ServiceError> {
        let query = normalize_query(query)?;

        if is_suffixed_domestic(query) {
            return self.resolve_suffixed(query).await;
        }

        if let Some(symbol) = lookup_alias(query) {
            debug!("resolved '{query}' from alias table to {symbol}");
            return Ok(symbol);
        }

        let listings = self.directory.listings().await;
        if let Some(symbol) = listings.symbol_for_code(query) {
            return Ok(symbol);
        }
        if let Some(symbol) = listings.symbol_for_name(query) {
            return Ok(symbol);
        }

        if query.bytes().all(|b| b.is_ascii_digit()) {
            let code = pad_domestic_code(query)?;
            return listings
                .symbol_for_code(&code)
                .ok_or_else(|| ServiceError::NotFound(format!("unknown domestic code '{code}'")));
        }

        if is_uppercase_ticker(query) {
            return Ok(CanonicalSymbol::foreign(query, query));
        }

        let ticker = query.to_uppercase();
        debug!("treating '{query}' as foreign ticker {ticker}");
        Ok(CanonicalSymbol::foreign(&ticker, ticker.clone()))
    }

    async fn resolve_suffixed(&self, query: &str) -> Result<CanonicalSymbol, ServiceError> {
        let listings = self.directory.listings().await;
        if let Some(symbol) = listings.symbol_for_code(query) {
            return Ok(symbol);
        }

        if listings.is_healthy() {
            return Err(ServiceError::NotFound(format!(
                "'{query}' is not a listed domestic code"
            )));
        }

        // Directory never loaded; the code is accepted unverified.
        warn!("market directory unavailable, accepting '{query}' unverified");
        let segment = ExchangeSegment::from_suffix(query).unwrap_or(ExchangeSegment::Kospi);
        let local = query.strip_suffix(segment.suffix()).unwrap_or(query);
        let code = pad_domestic_code(local)?;
        Ok(CanonicalSymbol::domestic(&code, code.clone(), segment))
    }

    /// Merged suggestions: aliases, directory, then remote tickers when the
    /// local hits are sparse. Deduplicated by code and capped.
    pub async fn search(&self, query: &str) -> Result<Vec<CanonicalSymbol>, ServiceError> {
        let query = normalize_query(query)?;
        let needle = query.to_lowercase();
        let upper = query.to_uppercase();

        let mut hits: Vec<CanonicalSymbol> = DOMESTIC_ALIASES
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains(&needle))
            .chain(FOREIGN_ALIASES.iter().filter(|(name, code)| {
                name.to_lowercase().contains(&needle) || *code == upper
            }))
            .map(|(name, code)| alias_symbol(name, code))
            .collect();

        hits.extend(self.directory.search(query, SEARCH_RESULT_CAP).await);

        if hits.len() < REMOTE_SEARCH_THRESHOLD {
            if let Some(ticker_search) = &self.ticker_search {
                match ticker_search.search_tickers(query).await {
                    Ok(remote) => hits.extend(
                        remote
                            .into_iter()
                            .filter(|symbol| symbol.market() == Market::Foreign)
                            .filter(|symbol| !symbol.code().contains('.')),
                    ),
                    Err(error) => warn!("remote ticker search failed for '{query}': {error}"),
                }
            }
        }

        let mut seen = HashSet::new();
        hits.retain(|symbol| seen.insert(symbol.code().to_owned()));
        hits.truncate(SEARCH_RESULT_CAP);
        Ok(hits)
    }
}

//! # Market directory
//!
//! Lazily refreshed index of every listed domestic instrument.
//!
//! The directory is either empty (never loaded) or the product of exactly
//! one successful reload; readers never observe a half-built snapshot.
//! Reloads are single-flight: callers arriving while a reload is running
//! wait on the initialization lock and then reuse its result instead of
//! starting another bulk load.

mod krx;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::domain::{CanonicalSymbol, ExchangeSegment, MAX_QUERY_LENGTH};
use crate::error::SourceError;

pub use krx::KrxDirectorySource;

/// Largest `limit` accepted by [`MarketDirectory::search`].
pub const MAX_SEARCH_LIMIT: usize = 100;
/// Limit substituted when the caller asks for something out of range.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Bare six-digit code without the exchange suffix.
    pub code: String,
    pub name: String,
    pub segment: ExchangeSegment,
}

impl DirectoryEntry {
    pub fn new(code: impl Into<String>, name: impl Into<String>, segment: ExchangeSegment) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            segment,
        }
    }

    pub fn to_symbol(&self) -> CanonicalSymbol {
        CanonicalSymbol::domestic(&self.code, self.name.clone(), self.segment)
    }
}

/// Bulk source of directory entries, one exchange segment per call.
pub trait DirectorySource: Send + Sync {
    fn load_segment<'a>(
        &'a self,
        segment: ExchangeSegment,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirectoryEntry>, SourceError>> + Send + 'a>>;
}

#[derive(Debug, Default)]
struct DirectorySnapshot {
    by_code: BTreeMap<String, DirectoryEntry>,
    by_name: HashMap<String, String>,
    loaded_at: Option<Instant>,
}

impl DirectorySnapshot {
    fn build(entries: Vec<DirectoryEntry>) -> Self {
        let mut by_code = BTreeMap::new();
        let mut by_name = HashMap::new();
        for entry in entries {
            by_name.insert(entry.name.clone(), entry.code.clone());
            by_code.insert(entry.code.clone(), entry);
        }

        Self {
            by_code,
            by_name,
            loaded_at: Some(Instant::now()),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at
            .is_some_and(|loaded_at| loaded_at.elapsed() < ttl)
    }

    fn entry(&self, code: &str) -> Option<&DirectoryEntry> {
        self.by_code.get(strip_segment_suffix(code))
    }
}

/// The directory as it stood after one freshness check. Lookups on it
/// never trigger a reload.
#[derive(Debug, Clone)]
pub struct Listings(Arc<DirectorySnapshot>);

impl Listings {
    /// Resolves a bare or suffixed code.
    pub fn symbol_for_code(&self, code: &str) -> Option<CanonicalSymbol> {
        self.0.entry(code).map(DirectoryEntry::to_symbol)
    }

    /// Resolves an exact listing name.
    pub fn symbol_for_name(&self, name: &str) -> Option<CanonicalSymbol> {
        self.0
            .by_name
            .get(name.trim())
            .and_then(|code| self.0.by_code.get(code))
            .map(DirectoryEntry::to_symbol)
    }

    /// Populated by at least one successful reload.
    pub fn is_healthy(&self) -> bool {
        self.0.loaded_at.is_some() && !self.0.by_code.is_empty()
    }
}

fn strip_segment_suffix(code: &str) -> &str {
    let code = code.trim();
    code.strip_suffix(ExchangeSegment::Kospi.suffix())
        .or_else(|| code.strip_suffix(ExchangeSegment::Kosdaq.suffix()))
        .unwrap_or(code)
}

pub struct MarketDirectory {
    source: Arc<dyn DirectorySource>,
    ttl: Duration,
    init_lock: tokio::sync::Mutex<()>,
    snapshot: RwLock<Arc<DirectorySnapshot>>,
    load_attempts: AtomicU64,
}

impl std::fmt::Debug for MarketDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDirectory")
            .field("ttl", &self.ttl)
            .field("stock_count", &self.stock_count())
            .finish()
    }
}

impl MarketDirectory {
    pub fn new(source: Arc<dyn DirectorySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            init_lock: tokio::sync::Mutex::new(()),
            snapshot: RwLock::new(Arc::new(DirectorySnapshot::default())),
            load_attempts: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(
            &self
                .snapshot
                .read()
                .expect("directory snapshot lock is not poisoned"),
        )
    }

    /// Reloads the directory when it is empty or older than the TTL.
    pub async fn ensure_fresh(&self) {
        if self.current().is_fresh(self.ttl) {
            return;
        }

        let attempts_seen = self.load_attempts.load(Ordering::Acquire);
        let _guard = self.init_lock.lock().await;

        // Someone else reloaded (or tried to) while this caller waited.
        if self.load_attempts.load(Ordering::Acquire) != attempts_seen
            || self.current().is_fresh(self.ttl)
        {
            return;
        }

        self.reload().await;
        self.load_attempts.fetch_add(1, Ordering::AcqRel);
    }

    async fn reload(&self) {
        info!("loading market directory");
        let mut entries = Vec::new();

        for segment in ExchangeSegment::DOMESTIC {
            match self.source.load_segment(segment).await {
                Ok(loaded) => {
                    info!("loaded {} {} listings", loaded.len(), segment);
                    entries.extend(loaded);
                }
                Err(error) => {
                    warn!("skipping {segment} in directory reload: {error}");
                }
            }
        }

        if entries.is_empty() {
            warn!("directory reload returned no listings, keeping previous snapshot");
            return;
        }

        let snapshot = Arc::new(DirectorySnapshot::build(entries));
        info!("market directory ready with {} listings", snapshot.by_code.len());
        *self
            .snapshot
            .write()
            .expect("directory snapshot lock is not poisoned") = snapshot;
    }

    /// Exact code hit first, then case-insensitive name substring matches.
    ///
    /// Empty or oversized queries return nothing; a `limit` outside
    /// `1..=MAX_SEARCH_LIMIT` is replaced by [`DEFAULT_SEARCH_LIMIT`].
    pub async fn search(&self, query: &str, limit: usize) -> Vec<CanonicalSymbol> {
        let query = query.trim();
        if query.is_empty() || query.chars().count() > MAX_QUERY_LENGTH {
            return Vec::new();
        }
        let limit = if (1..=MAX_SEARCH_LIMIT).contains(&limit) {
            limit
        } else {
            DEFAULT_SEARCH_LIMIT
        };

        self.ensure_fresh().await;
        let snapshot = self.current();

        let code_query = strip_segment_suffix(query).to_uppercase();
        let exact = snapshot.by_code.get(&code_query);
        let needle = query.to_lowercase();

        exact
            .into_iter()
            .chain(snapshot.by_code.values().filter(|entry| {
                entry.code != code_query && entry.name.to_lowercase().contains(&needle)
            }))
            .take(limit)
            .map(DirectoryEntry::to_symbol)
            .collect()
    }

    pub async fn lookup_name(&self, code: &str) -> Option<String> {
        self.ensure_fresh().await;
        self.current().entry(code).map(|entry| entry.name.clone())
    }

    pub async fn lookup_segment(&self, code: &str) -> Option<ExchangeSegment> {
        self.ensure_fresh().await;
        self.current().entry(code).map(|entry| entry.segment)
    }

    /// Checks freshness once and returns the resulting view.
    pub async fn listings(&self) -> Listings {
        self.ensure_fresh().await;
        Listings(self.current())
    }

    pub async fn symbol_for_code(&self, code: &str) -> Option<CanonicalSymbol> {
        self.listings().await.symbol_for_code(code)
    }

    pub async fn symbol_for_name(&self, name: &str) -> Option<CanonicalSymbol> {
        self.listings().await.symbol_for_name(name)
    }

    pub fn stock_count(&self) -> usize {
        self.current().by_code.len()
    }

    /// Populated by at least one successful reload.
    pub fn is_healthy(&self) -> bool {
        Listings(self.current()).is_healthy()
    }

    pub fn is_fresh(&self) -> bool {
        self.current().is_fresh(self.ttl)
    }
}

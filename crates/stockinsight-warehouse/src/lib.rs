//! # Stockinsight Warehouse
//!
//! DuckDB-backed storage for generated insights.
//!
//! ## Overview
//!
//! - **Append-only**: records are inserted once and never updated or deleted
//! - **User-scoped reads**: every query filters on the owning user id
//! - **Parameterized SQL**: caller input is always bound, never interpolated
//! - **Connection pooling**: connections share one in-process database
//! - **Versioned migrations** tracked in `schema_migrations`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stockinsight_core::{HistoryQuery, UserId};
//! use stockinsight_warehouse::{InsightStore, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::new("/tmp/insights.duckdb"))?;
//!     let user = UserId::parse("3f2b8c1e-9d4a-4f6b-8a2c-1e5d7f9b0c3a")?;
//!
//!     let query = HistoryQuery::new(None, Some(10), None, 100)?;
//!     let page = warehouse.history(&user, &query)?;
//!     println!("{} insights", page.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `insights` | One row per generated insight |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
mod error;
pub mod migrations;
mod records;

use std::fs;
use std::path::PathBuf;

use ::duckdb::{params, Connection, ToSql};
use log::debug;
use stockinsight_core::{HistoryPage, HistoryQuery, InsightRecord, NewInsight, UserId};

pub use duckdb::{DatabaseLocation, DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;

use records::{
    creation_time, record_from_new, EncodedSections, StoredInsight, INSERT_INSIGHT,
    INSIGHT_COLUMNS,
};

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub location: DatabaseLocation,
    /// Idle connections kept for reuse.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(db_path.into()),
            max_pool_size: 4,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            max_pool_size: 4,
        }
    }
}

/// Persistence capability for insights.
///
/// Every read takes the caller's [`UserId`]; a record owned by someone else
/// is indistinguishable from a missing one.
pub trait InsightStore: Send + Sync {
    /// Persists a new insight, assigning its id and creation time.
    fn insert(&self, insight: NewInsight) -> Result<InsightRecord, WarehouseError>;

    fn find(&self, user_id: &UserId, id: i64) -> Result<Option<InsightRecord>, WarehouseError>;

    /// Most recent insight for `symbol`.
    fn latest(&self, user_id: &UserId, symbol: &str)
        -> Result<Option<InsightRecord>, WarehouseError>;

    /// Newest-first page of summaries plus the unpaginated total.
    fn history(&self, user_id: &UserId, query: &HistoryQuery) -> Result<HistoryPage, WarehouseError>;
}

/// DuckDB-backed [`InsightStore`].
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Opens (creating if needed) the database and applies migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let DatabaseLocation::File(path) = &config.location {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.location, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn location(&self) -> &DatabaseLocation {
        self.manager.location()
    }

    fn fetch_records(
        connection: &Connection,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<InsightRecord>, WarehouseError> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement.query_map(params, StoredInsight::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl InsightStore for Warehouse {
    fn insert(&self, insight: NewInsight) -> Result<InsightRecord, WarehouseError> {
        let sections = EncodedSections::encode(&insight.fields)?;
        let (created_at_ms, created_at) = creation_time();
        let fields = &insight.fields;
        let processing_time_ms = i64::try_from(insight.processing_time_ms).unwrap_or(i64::MAX);

        let connection = self.manager.acquire()?;
        let id: i64 = connection.query_row(
            INSERT_INSIGHT,
            params![
                insight.user_id.as_str(),
                insight.symbol.as_str(),
                insight.display_name.as_str(),
                insight.market.as_str(),
                insight.timeframe.as_str(),
                fields.deep_research.as_str(),
                fields.recommendation.as_str(),
                fields.confidence.as_str(),
                fields.recommendation_reason.as_str(),
                i32::from(fields.risk_score),
                sections.risk_analysis,
                insight.current_price,
                insight.price_change_1d,
                insight.price_change_1w,
                insight.price_change_1m,
                sections.market_overview,
                fields.market_sentiment.as_str(),
                sections.sentiment_details,
                sections.key_summary,
                sections.current_drivers,
                sections.future_catalysts,
                insight.model.as_str(),
                processing_time_ms,
                created_at_ms,
            ],
            |row| row.get(0),
        )?;

        debug!("stored insight {id} for {}", insight.symbol);
        Ok(record_from_new(insight, id, created_at))
    }

    fn find(&self, user_id: &UserId, id: i64) -> Result<Option<InsightRecord>, WarehouseError> {
        let sql = format!("SELECT {INSIGHT_COLUMNS} FROM insights WHERE id = ? AND user_id = ?");
        let connection = self.manager.acquire()?;
        let user = user_id.as_str();
        let records = Self::fetch_records(&connection, &sql, &[&id, &user])?;
        Ok(records.into_iter().next())
    }

    fn latest(
        &self,
        user_id: &UserId,
        symbol: &str,
    ) -> Result<Option<InsightRecord>, WarehouseError> {
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE user_id = ? AND stock_code = ? \
             ORDER BY created_at_ms DESC, id DESC LIMIT 1"
        );
        let connection = self.manager.acquire()?;
        let user = user_id.as_str();
        let symbol = normalize_symbol(symbol);
        let records = Self::fetch_records(&connection, &sql, &[&user, &symbol])?;
        Ok(records.into_iter().next())
    }

    fn history(&self, user_id: &UserId, query: &HistoryQuery) -> Result<HistoryPage, WarehouseError> {
        if query.limit == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "history limit must be greater than zero",
            )));
        }

        let user = user_id.as_str();
        let symbol = query.symbol.as_deref().map(normalize_symbol);
        let filter = if symbol.is_some() {
            "WHERE user_id = ? AND stock_code = ?"
        } else {
            "WHERE user_id = ?"
        };
        let mut filter_params: Vec<&dyn ToSql> = Vec::new();
        filter_params.push(&user);
        if let Some(symbol) = &symbol {
            filter_params.push(symbol);
        }

        let connection = self.manager.acquire()?;
        let count_sql = format!("SELECT COUNT(*) FROM insights {filter}");
        let total: i64 =
            connection.query_row(&count_sql, filter_params.as_slice(), |row| row.get(0))?;

        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(query.skip).unwrap_or(i64::MAX);
        let page_sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights {filter} \
             ORDER BY created_at_ms DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut page_params = filter_params;
        page_params.push(&limit);
        page_params.push(&skip);
        let records = Self::fetch_records(&connection, &page_sql, &page_params)?;

        Ok(HistoryPage {
            total: u64::try_from(total).unwrap_or_default(),
            items: records.iter().map(InsightRecord::summary).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockinsight_core::{
        Confidence, CurrentDrivers, FutureCatalysts, InsightFields, Market, MarketOverview,
        Recommendation, RiskAnalysis, Sentiment, SentimentDetails, Timeframe,
    };
    use tempfile::tempdir;

    const ALICE: &str = "3f2b8c1e-9d4a-4f6b-8a2c-1e5d7f9b0c3a";
    const BOB: &str = "a7c1e2d3-4b5f-4a6e-9c8d-0f1e2d3c4b5a";

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).expect("valid user id")
    }

    fn new_insight(owner: &str, symbol: &str) -> NewInsight {
        let mut risk_analysis = RiskAnalysis::filled("moderate");
        risk_analysis.liquidity = None;

        NewInsight {
            user_id: user(owner),
            symbol: symbol.to_owned(),
            display_name: format!("{symbol} Inc."),
            market: Market::Foreign,
            timeframe: Timeframe::Mid,
            fields: InsightFields {
                deep_research: String::from("Margins keep expanding."),
                recommendation: Recommendation::Buy,
                confidence: Confidence::Medium,
                recommendation_reason: String::from("Earnings momentum"),
                risk_score: 4,
                risk_analysis,
                market_overview: MarketOverview::filled("steady"),
                market_sentiment: Sentiment::Bullish,
                sentiment_details: SentimentDetails::filled("positive"),
                key_summary: vec![String::from("Revenue up 12%"), String::from("Buybacks")],
                current_drivers: CurrentDrivers::filled("AI demand"),
                future_catalysts: FutureCatalysts::filled("New product cycle"),
            },
            current_price: Some(190.5),
            price_change_1d: Some(1.2),
            price_change_1w: None,
            price_change_1m: Some(-3.4),
            model: String::from("gpt-5-mini"),
            processing_time_ms: 1_850,
        }
    }

    fn open_in_memory() -> Warehouse {
        Warehouse::open(WarehouseConfig::in_memory()).expect("warehouse open")
    }

    #[test]
    fn insert_then_find_returns_identical_record() {
        let warehouse = open_in_memory();
        let stored = warehouse
            .insert(new_insight(ALICE, "AAPL"))
            .expect("insert");

        let found = warehouse
            .find(&user(ALICE), stored.id)
            .expect("find")
            .expect("present");
        assert_eq!(found, stored);
        assert_eq!(found.fields.risk_analysis.liquidity, None);
        assert_eq!(found.fields.key_summary.len(), 2);
    }

    #[test]
    fn records_are_invisible_to_other_users() {
        let warehouse = open_in_memory();
        let stored = warehouse
            .insert(new_insight(ALICE, "AAPL"))
            .expect("insert");

        assert_eq!(warehouse.find(&user(BOB), stored.id).expect("find"), None);
        assert_eq!(warehouse.latest(&user(BOB), "AAPL").expect("latest"), None);
        let page = warehouse
            .history(&user(BOB), &HistoryQuery::new(None, None, None, 100).expect("query"))
            .expect("history");
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn history_pages_newest_first_with_symbol_filter() {
        let warehouse = open_in_memory();
        let mut ids = Vec::new();
        for symbol in ["AAPL", "MSFT", "AAPL", "AAPL"] {
            ids.push(warehouse.insert(new_insight(ALICE, symbol)).expect("insert").id);
        }
        warehouse
            .insert(new_insight(BOB, "AAPL"))
            .expect("other user");

        let everything = HistoryQuery::new(None, Some(2), Some(1), 100).expect("query");
        let page = warehouse.history(&user(ALICE), &everything).expect("history");
        assert_eq!(page.total, 4);
        assert_eq!(
            page.items.iter().map(|item| item.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );

        let apple = HistoryQuery::new(Some(String::from("aapl")), None, None, 100).expect("query");
        let page = warehouse.history(&user(ALICE), &apple).expect("history");
        assert_eq!(page.total, 3);
        assert!(page.items.iter().all(|item| item.symbol == "AAPL"));
    }

    #[test]
    fn latest_picks_most_recent_for_symbol() {
        let warehouse = open_in_memory();
        warehouse.insert(new_insight(ALICE, "NVDA")).expect("first");
        let newer = warehouse.insert(new_insight(ALICE, "NVDA")).expect("second");
        warehouse.insert(new_insight(ALICE, "TSLA")).expect("other");

        let latest = warehouse
            .latest(&user(ALICE), "NVDA")
            .expect("latest")
            .expect("present");
        assert_eq!(latest.id, newer.id);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("data").join("insights.duckdb");

        let id = {
            let warehouse = Warehouse::open(WarehouseConfig::new(&db_path)).expect("open");
            warehouse.insert(new_insight(ALICE, "AMZN")).expect("insert").id
        };

        let reopened = Warehouse::open(WarehouseConfig::new(&db_path)).expect("reopen");
        let found = reopened.find(&user(ALICE), id).expect("find");
        assert_eq!(found.map(|record| record.symbol), Some(String::from("AMZN")));
        assert_eq!(reopened.location(), &DatabaseLocation::File(db_path));
    }
}

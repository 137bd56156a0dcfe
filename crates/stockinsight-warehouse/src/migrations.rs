use ::duckdb::Connection;
use log::info;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_insights",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS insight_id_seq START 1;

CREATE TABLE IF NOT EXISTS insights (
    id BIGINT PRIMARY KEY DEFAULT nextval('insight_id_seq'),
    user_id TEXT NOT NULL,
    stock_code TEXT NOT NULL,
    stock_name TEXT NOT NULL,
    market TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    deep_research TEXT NOT NULL,
    recommendation TEXT NOT NULL,
    confidence_level TEXT NOT NULL,
    recommendation_reason TEXT NOT NULL,
    risk_score INTEGER NOT NULL,
    risk_analysis TEXT NOT NULL,
    current_price DOUBLE,
    price_change_1d DOUBLE,
    price_change_1w DOUBLE,
    price_change_1m DOUBLE,
    market_overview TEXT NOT NULL,
    market_sentiment TEXT NOT NULL,
    sentiment_details TEXT NOT NULL,
    key_summary TEXT NOT NULL,
    current_drivers TEXT NOT NULL,
    future_catalysts TEXT NOT NULL,
    ai_model TEXT NOT NULL,
    processing_time_ms BIGINT NOT NULL,
    created_at_ms BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_insight_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_insights_user_created ON insights(user_id, created_at_ms);
CREATE INDEX IF NOT EXISTS idx_insights_user_code ON insights(user_id, stock_code);
"#,
    },
];

/// Applies every migration not yet recorded in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
            info!("applied warehouse migration {}", migration.version);
        }
    }

    Ok(())
}

//! Row mapping between the `insights` table and the domain model.
//!
//! Structured sections and the summary bullets are stored as JSON text.

use ::duckdb::Row;
use stockinsight_core::{
    Confidence, InsightFields, InsightRecord, Market, NewInsight, Recommendation, Sentiment,
    Timeframe, UserId, UtcDateTime,
};

use crate::WarehouseError;

pub(crate) const INSIGHT_COLUMNS: &str = "id, user_id, stock_code, stock_name, market, timeframe, \
     deep_research, recommendation, confidence_level, recommendation_reason, risk_score, \
     risk_analysis, current_price, price_change_1d, price_change_1w, price_change_1m, \
     market_overview, market_sentiment, sentiment_details, key_summary, current_drivers, \
     future_catalysts, ai_model, processing_time_ms, created_at_ms";

pub(crate) const INSERT_INSIGHT: &str = "INSERT INTO insights (user_id, stock_code, stock_name, \
     market, timeframe, deep_research, recommendation, confidence_level, recommendation_reason, \
     risk_score, risk_analysis, current_price, price_change_1d, price_change_1w, price_change_1m, \
     market_overview, market_sentiment, sentiment_details, key_summary, current_drivers, \
     future_catalysts, ai_model, processing_time_ms, created_at_ms) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id";

/// Section columns encoded once before the insert.
pub(crate) struct EncodedSections {
    pub risk_analysis: String,
    pub market_overview: String,
    pub sentiment_details: String,
    pub key_summary: String,
    pub current_drivers: String,
    pub future_catalysts: String,
}

impl EncodedSections {
    pub fn encode(fields: &InsightFields) -> Result<Self, WarehouseError> {
        Ok(Self {
            risk_analysis: serde_json::to_string(&fields.risk_analysis)?,
            market_overview: serde_json::to_string(&fields.market_overview)?,
            sentiment_details: serde_json::to_string(&fields.sentiment_details)?,
            key_summary: serde_json::to_string(&fields.key_summary)?,
            current_drivers: serde_json::to_string(&fields.current_drivers)?,
            future_catalysts: serde_json::to_string(&fields.future_catalysts)?,
        })
    }
}

/// Millisecond-truncated creation time, so a returned record equals its
/// re-read copy.
pub(crate) fn creation_time() -> (i64, UtcDateTime) {
    let millis = UtcDateTime::now().unix_millis();
    let created_at = UtcDateTime::from_unix_millis(millis).unwrap_or_else(UtcDateTime::now);
    (millis, created_at)
}

pub(crate) fn record_from_new(insight: NewInsight, id: i64, created_at: UtcDateTime) -> InsightRecord {
    InsightRecord {
        id,
        user_id: insight.user_id,
        symbol: insight.symbol,
        display_name: insight.display_name,
        market: insight.market,
        timeframe: insight.timeframe,
        fields: insight.fields,
        current_price: insight.current_price,
        price_change_1d: insight.price_change_1d,
        price_change_1w: insight.price_change_1w,
        price_change_1m: insight.price_change_1m,
        model: insight.model,
        processing_time_ms: insight.processing_time_ms,
        created_at,
    }
}

/// Raw column values as read from one row.
pub(crate) struct StoredInsight {
    id: i64,
    user_id: String,
    stock_code: String,
    stock_name: String,
    market: String,
    timeframe: String,
    deep_research: String,
    recommendation: String,
    confidence_level: String,
    recommendation_reason: String,
    risk_score: i32,
    risk_analysis: String,
    current_price: Option<f64>,
    price_change_1d: Option<f64>,
    price_change_1w: Option<f64>,
    price_change_1m: Option<f64>,
    market_overview: String,
    market_sentiment: String,
    sentiment_details: String,
    key_summary: String,
    current_drivers: String,
    future_catalysts: String,
    ai_model: String,
    processing_time_ms: i64,
    created_at_ms: i64,
}

impl StoredInsight {
    /// Reads a row selected with [`INSIGHT_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> Result<Self, ::duckdb::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            stock_code: row.get(2)?,
            stock_name: row.get(3)?,
            market: row.get(4)?,
            timeframe: row.get(5)?,
            deep_research: row.get(6)?,
            recommendation: row.get(7)?,
            confidence_level: row.get(8)?,
            recommendation_reason: row.get(9)?,
            risk_score: row.get(10)?,
            risk_analysis: row.get(11)?,
            current_price: row.get(12)?,
            price_change_1d: row.get(13)?,
            price_change_1w: row.get(14)?,
            price_change_1m: row.get(15)?,
            market_overview: row.get(16)?,
            market_sentiment: row.get(17)?,
            sentiment_details: row.get(18)?,
            key_summary: row.get(19)?,
            current_drivers: row.get(20)?,
            future_catalysts: row.get(21)?,
            ai_model: row.get(22)?,
            processing_time_ms: row.get(23)?,
            created_at_ms: row.get(24)?,
        })
    }

    pub fn into_record(self) -> Result<InsightRecord, WarehouseError> {
        let id = self.id;
        let corrupt = |reason: String| WarehouseError::CorruptRecord { id, reason };

        let user_id = UserId::parse(&self.user_id).map_err(|e| corrupt(e.to_string()))?;
        let market = Market::parse(&self.market)
            .ok_or_else(|| corrupt(format!("unknown market '{}'", self.market)))?;
        let timeframe = Timeframe::parse(&self.timeframe).map_err(|e| corrupt(e.to_string()))?;
        let recommendation = Recommendation::parse_normalized(&self.recommendation)
            .ok_or_else(|| corrupt(format!("unknown recommendation '{}'", self.recommendation)))?;
        let confidence = Confidence::parse_normalized(&self.confidence_level)
            .ok_or_else(|| corrupt(format!("unknown confidence '{}'", self.confidence_level)))?;
        let market_sentiment = Sentiment::parse_normalized(&self.market_sentiment)
            .ok_or_else(|| corrupt(format!("unknown sentiment '{}'", self.market_sentiment)))?;
        let risk_score = u8::try_from(self.risk_score)
            .map_err(|_| corrupt(format!("risk score {} out of range", self.risk_score)))?;
        let created_at = UtcDateTime::from_unix_millis(self.created_at_ms)
            .ok_or_else(|| corrupt(format!("bad creation time {}", self.created_at_ms)))?;

        let fields = InsightFields {
            deep_research: self.deep_research,
            recommendation,
            confidence,
            recommendation_reason: self.recommendation_reason,
            risk_score,
            risk_analysis: serde_json::from_str(&self.risk_analysis)?,
            market_overview: serde_json::from_str(&self.market_overview)?,
            market_sentiment,
            sentiment_details: serde_json::from_str(&self.sentiment_details)?,
            key_summary: serde_json::from_str(&self.key_summary)?,
            current_drivers: serde_json::from_str(&self.current_drivers)?,
            future_catalysts: serde_json::from_str(&self.future_catalysts)?,
        };

        Ok(InsightRecord {
            id,
            user_id,
            symbol: self.stock_code,
            display_name: self.stock_name,
            market,
            timeframe,
            fields,
            current_price: self.current_price,
            price_change_1d: self.price_change_1d,
            price_change_1w: self.price_change_1w,
            price_change_1m: self.price_change_1m,
            model: self.ai_model,
            processing_time_ms: u64::try_from(self.processing_time_ms).unwrap_or_default(),
            created_at,
        })
    }
}

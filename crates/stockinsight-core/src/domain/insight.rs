use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Market, UserId, UtcDateTime};
use crate::ValidationError;

/// Investment horizon requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Short,
    Mid,
    Long,
}

impl Timeframe {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "mid" => Ok(Self::Mid),
            "long" => Ok(Self::Long),
            _ => Err(ValidationError::InvalidTimeframe {
                value: input.to_owned(),
            }),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Mid => "mid",
            Self::Long => "long",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "short term (1-3 months)",
            Self::Mid => "mid term (3-12 months)",
            Self::Long => "long term (1 year+)",
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace('-', "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Case and whitespace tolerant match (`"Strong Buy"` is `StrongBuy`).
    pub fn parse_normalized(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "strong_buy" => Some(Self::StrongBuy),
            "buy" => Some(Self::Buy),
            "hold" => Some(Self::Hold),
            "sell" => Some(Self::Sell),
            "strong_sell" => Some(Self::StrongSell),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "strong_buy",
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Sell => "sell",
            Self::StrongSell => "strong_sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse_normalized(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Neutral,
    Bearish,
}

impl Sentiment {
    pub fn parse_normalized(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "bullish" => Some(Self::Bullish),
            "neutral" => Some(Self::Neutral),
            "bearish" => Some(Self::Bearish),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::Bearish => "bearish",
        }
    }
}

macro_rules! text_section {
    ($(#[$meta:meta])* $name:ident { $($field:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(
                #[serde(rename = $key)]
                pub $field: Option<String>,
            )+
        }

        impl $name {
            pub const FIELDS: &'static [&'static str] = &[$($key),+];

            /// Every field set to the same placeholder text.
            pub fn filled(text: &str) -> Self {
                Self {
                    $($field: Some(text.to_owned()),)+
                }
            }

            /// Overlays string values key by key. Unknown keys and non-string
            /// values leave the current field untouched.
            pub fn overlay(&mut self, object: &Map<String, Value>) {
                $(
                    if let Some(Value::String(text)) = object.get($key) {
                        self.$field = Some(text.clone());
                    }
                )+
            }
        }
    };
}

text_section!(
    /// Risk breakdown by source of risk.
    RiskAnalysis {
        volatility => "volatility",
        company_specific => "company_specific",
        industry => "industry",
        macro_risk => "macro",
        liquidity => "liquidity",
        regulatory => "regulatory",
    }
);

text_section!(
    /// Recent price and volume behaviour.
    MarketOverview {
        price_movement => "price_movement",
        volume_trend => "volume_trend",
        support_resistance => "support_resistance",
        relative_performance => "relative_performance",
    }
);

text_section!(
    SentimentDetails {
        overall => "overall",
        social_media => "social_media",
        options_activity => "options_activity",
        insider_trading => "insider_trading",
        institutional => "institutional",
        short_interest => "short_interest",
    }
);

text_section!(
    /// What is moving the price now.
    CurrentDrivers {
        news_based => "news_based",
        technical => "technical",
        fundamental => "fundamental",
    }
);

text_section!(
    FutureCatalysts {
        short_term => "short_term",
        mid_term => "mid_term",
        long_term => "long_term",
    }
);

/// Model-derived part of an insight, always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightFields {
    pub deep_research: String,
    pub recommendation: Recommendation,
    #[serde(rename = "confidence_level")]
    pub confidence: Confidence,
    pub recommendation_reason: String,
    pub risk_score: u8,
    pub risk_analysis: RiskAnalysis,
    pub market_overview: MarketOverview,
    pub market_sentiment: Sentiment,
    pub sentiment_details: SentimentDetails,
    pub key_summary: Vec<String>,
    pub current_drivers: CurrentDrivers,
    pub future_catalysts: FutureCatalysts,
}

/// Insight ready to be written; the store assigns identity and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInsight {
    pub user_id: UserId,
    pub symbol: String,
    pub display_name: String,
    pub market: Market,
    pub timeframe: Timeframe,
    pub fields: InsightFields,
    pub current_price: Option<f64>,
    pub price_change_1d: Option<f64>,
    pub price_change_1w: Option<f64>,
    pub price_change_1m: Option<f64>,
    pub model: String,
    pub processing_time_ms: u64,
}

/// Persisted insight. Append-only: nothing mutates a record after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "stock_code")]
    pub symbol: String,
    #[serde(rename = "stock_name")]
    pub display_name: String,
    pub market: Market,
    pub timeframe: Timeframe,
    #[serde(flatten)]
    pub fields: InsightFields,
    pub current_price: Option<f64>,
    pub price_change_1d: Option<f64>,
    pub price_change_1w: Option<f64>,
    pub price_change_1m: Option<f64>,
    #[serde(rename = "ai_model")]
    pub model: String,
    pub processing_time_ms: u64,
    pub created_at: UtcDateTime,
}

impl InsightRecord {
    pub fn summary(&self) -> InsightSummary {
        InsightSummary {
            id: self.id,
            symbol: self.symbol.clone(),
            display_name: self.display_name.clone(),
            market: self.market,
            timeframe: self.timeframe,
            recommendation: self.fields.recommendation,
            risk_score: self.fields.risk_score,
            current_price: self.current_price,
            created_at: self.created_at,
        }
    }
}

/// History list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSummary {
    pub id: i64,
    #[serde(rename = "stock_code")]
    pub symbol: String,
    #[serde(rename = "stock_name")]
    pub display_name: String,
    pub market: Market,
    pub timeframe: Timeframe,
    pub recommendation: Recommendation,
    pub risk_score: u8,
    pub current_price: Option<f64>,
    pub created_at: UtcDateTime,
}

/// One page of a user's history plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub total: u64,
    pub items: Vec<InsightSummary>,
}

/// History filter and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub symbol: Option<String>,
    pub limit: usize,
    pub skip: usize,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(
        symbol: Option<String>,
        limit: Option<usize>,
        skip: Option<usize>,
        max_limit: usize,
    ) -> Result<Self, ValidationError> {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        if limit == 0 || limit > max_limit {
            return Err(ValidationError::InvalidLimit {
                value: limit,
                max: max_limit,
            });
        }

        Ok(Self {
            symbol: symbol.filter(|value| !value.trim().is_empty()),
            limit,
            skip: skip.unwrap_or(0),
        })
    }
}

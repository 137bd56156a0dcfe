//! Turns free-form model output into a fully populated [`InsightFields`].
//!
//! Parsing never fails. Text without a decodable JSON object yields the
//! default structure; otherwise each top-level field is overlaid on the
//! defaults only when present and well-typed, so one malformed field never
//! discards the rest.

use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use serde_json::{Map, Value};
use stockinsight_core::{
    Confidence, CurrentDrivers, FutureCatalysts, InsightFields, MarketOverview, Recommendation,
    RiskAnalysis, Sentiment, SentimentDetails,
};

pub const DEFAULT_RISK_SCORE: u8 = 5;
pub const MIN_RISK_SCORE: u8 = 1;
pub const MAX_RISK_SCORE: u8 = 10;

const UNAVAILABLE: &str = "Analysis unavailable";
const DEFAULT_RESEARCH: &str = "The analysis response could not be processed.";
const DEFAULT_REASON: &str = "Not enough data; holding is recommended until more is known.";

/// All-default insight used as the merge base and as the fallback.
pub fn default_fields() -> InsightFields {
    InsightFields {
        deep_research: String::from(DEFAULT_RESEARCH),
        recommendation: Recommendation::Hold,
        confidence: Confidence::Low,
        recommendation_reason: String::from(DEFAULT_REASON),
        risk_score: DEFAULT_RISK_SCORE,
        risk_analysis: RiskAnalysis::filled(UNAVAILABLE),
        market_overview: MarketOverview::filled(UNAVAILABLE),
        market_sentiment: Sentiment::Neutral,
        sentiment_details: SentimentDetails::filled(UNAVAILABLE),
        key_summary: vec![String::from(DEFAULT_RESEARCH)],
        current_drivers: CurrentDrivers::filled(UNAVAILABLE),
        future_catalysts: FutureCatalysts::filled(UNAVAILABLE),
    }
}

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("valid regex"));
static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));

/// First fenced `json` block, else the outermost brace span.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(inner) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Some(inner.as_str());
    }
    BARE_OBJECT.find(text).map(|m| m.as_str())
}

/// Integer in `[1, 10]`; fractional input is truncated, anything
/// non-numeric is the default.
fn risk_score(value: &Value) -> u8 {
    let Some(number) = value.as_f64().filter(|number| number.is_finite()) else {
        return DEFAULT_RISK_SCORE;
    };
    let clamped = number
        .trunc()
        .clamp(f64::from(MIN_RISK_SCORE), f64::from(MAX_RISK_SCORE));
    clamped as u8
}

fn bullet(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn overlay(fields: &mut InsightFields, object: &Map<String, Value>) {
    if let Some(Value::String(text)) = object.get("deep_research") {
        fields.deep_research = text.clone();
    }
    if let Some(Value::String(text)) = object.get("recommendation_reason") {
        fields.recommendation_reason = text.clone();
    }

    fields.recommendation = object
        .get("recommendation")
        .and_then(Value::as_str)
        .and_then(Recommendation::parse_normalized)
        .unwrap_or(fields.recommendation);
    fields.confidence = object
        .get("confidence_level")
        .and_then(Value::as_str)
        .and_then(Confidence::parse_normalized)
        .unwrap_or(fields.confidence);
    fields.market_sentiment = object
        .get("market_sentiment")
        .and_then(Value::as_str)
        .and_then(Sentiment::parse_normalized)
        .unwrap_or(fields.market_sentiment);

    if let Some(value) = object.get("risk_score") {
        fields.risk_score = risk_score(value);
    }

    if let Some(Value::Array(items)) = object.get("key_summary") {
        fields.key_summary = items.iter().filter_map(bullet).collect();
    }

    if let Some(Value::Object(section)) = object.get("risk_analysis") {
        fields.risk_analysis.overlay(section);
    }
    if let Some(Value::Object(section)) = object.get("market_overview") {
        fields.market_overview.overlay(section);
    }
    if let Some(Value::Object(section)) = object.get("sentiment_details") {
        fields.sentiment_details.overlay(section);
    }
    if let Some(Value::Object(section)) = object.get("current_drivers") {
        fields.current_drivers.overlay(section);
    }
    if let Some(Value::Object(section)) = object.get("future_catalysts") {
        fields.future_catalysts.overlay(section);
    }
}

/// Parses raw model output. Never fails.
pub fn parse_insight(raw: &str) -> InsightFields {
    let mut fields = default_fields();

    let Some(json) = extract_json(raw) else {
        warn!("model response contains no JSON object; using defaults");
        return fields;
    };

    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(object)) => overlay(&mut fields, &object),
        Ok(_) => warn!("model response JSON is not an object; using defaults"),
        Err(error) => warn!("model response JSON is malformed ({error}); using defaults"),
    }
    fields
}

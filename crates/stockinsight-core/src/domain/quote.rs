use serde::{Deserialize, Serialize};

use crate::domain::{CanonicalSymbol, UtcDateTime};

/// Point-in-time market data for one resolved symbol.
///
/// Every field except identity and price is optional; backends report
/// different subsets and the snapshot never invents a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: CanonicalSymbol,
    pub name: String,
    pub currency: String,
    pub price: f64,
    pub change_1d: Option<f64>,
    pub change_1d_pct: Option<f64>,
    pub change_1w_pct: Option<f64>,
    pub change_1m_pct: Option<f64>,
    pub day_open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub previous_close: Option<f64>,
    pub volume: Option<u64>,
    pub avg_volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub beta: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub as_of: UtcDateTime,
}

impl QuoteSnapshot {
    /// Bare snapshot with only identity and price populated.
    pub fn new(symbol: CanonicalSymbol, price: f64, currency: impl Into<String>) -> Self {
        Self {
            name: symbol.display_name().to_owned(),
            symbol,
            currency: currency.into(),
            price,
            change_1d: None,
            change_1d_pct: None,
            change_1w_pct: None,
            change_1m_pct: None,
            day_open: None,
            day_high: None,
            day_low: None,
            previous_close: None,
            volume: None,
            avg_volume: None,
            market_cap: None,
            pe_ratio: None,
            pb_ratio: None,
            dividend_yield: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            beta: None,
            sector: None,
            industry: None,
            as_of: UtcDateTime::now(),
        }
    }

    pub fn has_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Percentage change from `reference` to `latest`; `None` when undefined.
pub fn percent_change(latest: f64, reference: f64) -> Option<f64> {
    if !latest.is_finite() || !reference.is_finite() || reference == 0.0 {
        return None;
    }
    Some((latest - reference) / reference * 100.0)
}

/// Walks a daily close series backward from the latest close.
///
/// `sessions_back = 1` compares against the previous session. Missing
/// closes (`None`) are skipped; a series too short for the window yields
/// `None`.
pub fn session_change_pct(closes: &[Option<f64>], sessions_back: usize) -> Option<f64> {
    let series: Vec<f64> = closes
        .iter()
        .filter_map(|close| close.filter(|value| value.is_finite() && *value > 0.0))
        .collect();
    let latest_index = series.len().checked_sub(1)?;
    let reference_index = latest_index.checked_sub(sessions_back)?;
    percent_change(series[latest_index], series[reference_index])
}

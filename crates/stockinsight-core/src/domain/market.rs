use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Regional instrument universe, each served by its own quote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "KR")]
    Domestic,
    #[serde(rename = "US")]
    Foreign,
}

impl Market {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domestic => "KR",
            Self::Foreign => "US",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "KR" => Some(Self::Domestic),
            "US" => Some(Self::Foreign),
            _ => None,
        }
    }

    /// Human label used in model prompts.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Domestic => "Korea",
            Self::Foreign => "United States",
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange segment an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeSegment {
    Kospi,
    Kosdaq,
    Overseas,
}

impl ExchangeSegment {
    /// Segments that make up the domestic directory, in load order.
    pub const DOMESTIC: [ExchangeSegment; 2] = [Self::Kospi, Self::Kosdaq];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kospi => "KOSPI",
            Self::Kosdaq => "KOSDAQ",
            Self::Overseas => "OVERSEAS",
        }
    }

    /// Ticker suffix the domestic quote backend expects.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Kospi => ".KS",
            Self::Kosdaq => ".KQ",
            Self::Overseas => "",
        }
    }

    pub fn from_suffix(code: &str) -> Option<Self> {
        if code.ends_with(".KS") {
            Some(Self::Kospi)
        } else if code.ends_with(".KQ") {
            Some(Self::Kosdaq)
        } else {
            None
        }
    }

    pub const fn market(self) -> Market {
        match self {
            Self::Kospi | Self::Kosdaq => Market::Domestic,
            Self::Overseas => Market::Foreign,
        }
    }
}

impl Display for ExchangeSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_round_trips_for_domestic_segments() {
        for segment in ExchangeSegment::DOMESTIC {
            let code = format!("005930{}", segment.suffix());
            assert_eq!(ExchangeSegment::from_suffix(&code), Some(segment));
            assert_eq!(segment.market(), Market::Domestic);
        }
        assert_eq!(ExchangeSegment::from_suffix("AAPL"), None);
    }

    #[test]
    fn market_serializes_as_region_code() {
        let json = serde_json::to_string(&Market::Domestic).expect("serialize");
        assert_eq!(json, "\"KR\"");
        assert_eq!(Market::parse("US"), Some(Market::Foreign));
    }
}

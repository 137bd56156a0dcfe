use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::{ExchangeSegment, Market};
use crate::ValidationError;

/// Width of a domestic listing code (`005930`).
pub const DOMESTIC_CODE_WIDTH: usize = 6;

/// Maximum accepted length of a free-text stock query.
pub const MAX_QUERY_LENGTH: usize = 100;

/// Resolved instrument identity. Immutable once produced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalSymbol {
    code: String,
    display_name: String,
    market: Market,
    exchange_segment: ExchangeSegment,
}

impl CanonicalSymbol {
    /// Domestic listing; `local_code` is the bare six-digit code.
    pub fn domestic(
        local_code: &str,
        display_name: impl Into<String>,
        segment: ExchangeSegment,
    ) -> Self {
        Self {
            code: format!("{local_code}{}", segment.suffix()),
            display_name: display_name.into(),
            market: Market::Domestic,
            exchange_segment: segment,
        }
    }

    /// Foreign ticker, taken verbatim and uppercased.
    pub fn foreign(ticker: &str, display_name: impl Into<String>) -> Self {
        Self {
            code: ticker.trim().to_uppercase(),
            display_name: display_name.into(),
            market: Market::Foreign,
            exchange_segment: ExchangeSegment::Overseas,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Code without the exchange suffix.
    pub fn local_code(&self) -> &str {
        let suffix = self.exchange_segment.suffix();
        self.code.strip_suffix(suffix).unwrap_or(&self.code)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub const fn market(&self) -> Market {
        self.market
    }

    pub const fn exchange_segment(&self) -> ExchangeSegment {
        self.exchange_segment
    }
}

impl Display for CanonicalSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

/// Trims and bounds a caller query before any resolution work.
pub fn normalize_query(input: &str) -> Result<&str, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    let len = trimmed.chars().count();
    if len > MAX_QUERY_LENGTH {
        return Err(ValidationError::QueryTooLong {
            len,
            max: MAX_QUERY_LENGTH,
        });
    }

    Ok(trimmed)
}

/// Left-pads an all-digit query to the domestic code width.
pub fn pad_domestic_code(digits: &str) -> Result<String, ValidationError> {
    if digits.len() > DOMESTIC_CODE_WIDTH {
        return Err(ValidationError::DomesticCodeTooLong {
            value: digits.to_owned(),
            max: DOMESTIC_CODE_WIDTH,
        });
    }
    Ok(format!("{digits:0>width$}", width = DOMESTIC_CODE_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_symbol_carries_segment_suffix() {
        let symbol = CanonicalSymbol::domestic("035720", "Kakao", ExchangeSegment::Kospi);
        assert_eq!(symbol.code(), "035720.KS");
        assert_eq!(symbol.local_code(), "035720");
        assert_eq!(symbol.market(), Market::Domestic);
    }

    #[test]
    fn foreign_symbol_is_uppercased() {
        let symbol = CanonicalSymbol::foreign(" brk-b ", "BRK-B");
        assert_eq!(symbol.code(), "BRK-B");
        assert_eq!(symbol.local_code(), "BRK-B");
        assert_eq!(symbol.exchange_segment(), ExchangeSegment::Overseas);
    }

    #[test]
    fn pads_short_codes_and_rejects_long_ones() {
        assert_eq!(pad_domestic_code("5930").expect("pad"), "005930");
        let err = pad_domestic_code("1234567").expect_err("must fail");
        assert!(matches!(err, ValidationError::DomesticCodeTooLong { .. }));
    }

    #[test]
    fn rejects_empty_and_oversized_queries() {
        assert_eq!(normalize_query("   "), Err(ValidationError::EmptyQuery));
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            normalize_query(&long),
            Err(ValidationError::QueryTooLong { .. })
        ));
        assert_eq!(normalize_query(" AAPL "), Ok("AAPL"));
    }
}

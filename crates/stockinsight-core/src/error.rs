use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Validation errors for caller-supplied input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("stock query cannot be empty")]
    EmptyQuery,
    #[error("stock query length {len} exceeds max {max}")]
    QueryTooLong { len: usize, max: usize },

    #[error("invalid timeframe '{value}', expected one of short, mid, long")]
    InvalidTimeframe { value: String },

    #[error("X-User-Id header is required")]
    MissingUserId,
    #[error("X-User-Id must be a hyphenated UUID v4: '{value}'")]
    InvalidUserId { value: String },

    #[error("domestic code '{value}' must be at most {max} digits")]
    DomesticCodeTooLong { value: String, max: usize },

    #[error("limit must be between 1 and {max}, got {value}")]
    InvalidLimit { value: usize, max: usize },

    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

/// Upstream failure categories reported by adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    NotFound,
    InvalidRequest,
    NotConfigured,
    Internal,
}

/// Structured error returned by quote, directory, LLM and payment adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotConfigured,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NotConfigured => "source.not_configured",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Service-level error taxonomy surfaced to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PaymentRequired(String),

    #[error("paid amount {actual} does not match expected amount {expected}; payment was cancelled")]
    PaymentAmountMismatch { expected: i64, actual: i64 },

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Persistence(String),
}

impl ServiceError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PaymentRequired(_) => "payment_required",
            Self::PaymentAmountMismatch { .. } => "payment_amount_mismatch",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Validation(_) => "validation_error",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Appends a trailing warning to free-text variants; structured variants are returned as-is.
    pub fn with_warning(self, warning: &str) -> Self {
        match self {
            Self::NotFound(message) => Self::NotFound(format!("{message} (warning: {warning})")),
            Self::PaymentRequired(message) => {
                Self::PaymentRequired(format!("{message} (warning: {warning})"))
            }
            Self::UpstreamUnavailable(message) => {
                Self::UpstreamUnavailable(format!("{message} (warning: {warning})"))
            }
            Self::Persistence(message) => {
                Self::Persistence(format!("{message} (warning: {warning})"))
            }
            other @ (Self::Validation(_) | Self::PaymentAmountMismatch { .. }) => other,
        }
    }
}

impl From<SourceError> for ServiceError {
    fn from(error: SourceError) -> Self {
        match error.kind() {
            SourceErrorKind::NotFound => Self::NotFound(error.message().to_owned()),
            _ => Self::UpstreamUnavailable(error.to_string()),
        }
    }
}

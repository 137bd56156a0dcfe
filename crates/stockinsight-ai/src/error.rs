use std::fmt::{Display, Formatter};

use stockinsight_core::{HttpError, LlmVendor, ServiceError};

/// Failure categories for one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    NotConfigured,
    InvalidApiKey,
    RateLimited,
    ModelNotFound,
    ServerError,
    Network,
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmError {
    pub vendor: LlmVendor,
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(vendor: LlmVendor, kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            vendor,
            kind,
            message: message.into(),
        }
    }

    pub fn not_configured(vendor: LlmVendor) -> Self {
        Self::new(vendor, LlmErrorKind::NotConfigured, "API key is not set")
    }

    pub fn network(vendor: LlmVendor, error: &HttpError) -> Self {
        Self::new(vendor, LlmErrorKind::Network, error.message())
    }

    pub fn invalid_response(vendor: LlmVendor, message: impl Into<String>) -> Self {
        Self::new(vendor, LlmErrorKind::InvalidResponse, message)
    }

    /// Classifies a non-success HTTP status. Only a short prefix of the body
    /// is kept.
    pub fn from_status(vendor: LlmVendor, status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => LlmErrorKind::InvalidApiKey,
            404 => LlmErrorKind::ModelNotFound,
            429 => LlmErrorKind::RateLimited,
            500..=599 => LlmErrorKind::ServerError,
            _ => LlmErrorKind::InvalidResponse,
        };
        let excerpt: String = body.chars().take(200).collect();
        Self::new(vendor, kind, format!("HTTP {status}: {excerpt}"))
    }
}

impl Display for LlmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}: {}", self.vendor.as_str(), self.kind, self.message)
    }
}

impl std::error::Error for LlmError {}

impl From<LlmError> for ServiceError {
    fn from(error: LlmError) -> Self {
        Self::UpstreamUnavailable(format!("insight generation failed: {error}"))
    }
}

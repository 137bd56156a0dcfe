use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use serde_json::json;
use stockinsight_core::{ConfigError, ServiceError, ValidationError};
use stockinsight_warehouse::WarehouseError;
use thiserror::Error;

/// Error returned by every handler; renders as
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    PaymentsUnavailable(String),
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::Service(ServiceError::Validation(error))
    }
}

impl From<WarehouseError> for ApiError {
    fn from(error: WarehouseError) -> Self {
        Self::Service(error.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Service(ServiceError::PaymentRequired(_)) => StatusCode::PAYMENT_REQUIRED,
            Self::Service(ServiceError::PaymentAmountMismatch { .. }) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::Service(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::UpstreamUnavailable(_)) => StatusCode::BAD_GATEWAY,
            Self::Service(ServiceError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PaymentsUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Service(error) => error.code(),
            Self::PaymentsUnavailable(_) => "payments_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} {}: {self}", status.as_u16(), self.code());
        } else {
            warn!("{} {}: {self}", status.as_u16(), self.code());
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

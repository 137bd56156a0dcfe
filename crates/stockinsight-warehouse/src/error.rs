use stockinsight_core::ServiceError;
use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not encode or decode a stored section: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row no longer maps onto the domain model.
    #[error("insight {id} is unreadable: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("query rejected: {0}")]
    QueryRejected(String),
}

impl From<WarehouseError> for ServiceError {
    fn from(error: WarehouseError) -> Self {
        Self::Persistence(error.to_string())
    }
}

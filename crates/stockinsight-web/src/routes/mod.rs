pub mod analysis;
pub mod health;
pub mod payment;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(analysis::routes())
        .merge(payment::routes())
        .merge(health::routes())
}

/// Runs blocking store work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, crate::error::ApiError>
where
    F: FnOnce() -> Result<T, stockinsight_warehouse::WarehouseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| {
            stockinsight_core::ServiceError::Persistence(format!("store task failed: {e}"))
        })?
        .map_err(Into::into)
}

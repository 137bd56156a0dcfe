//! # Stockinsight Web
//!
//! HTTP surface for stock insights.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/analysis/stock` | run (and persist) a new analysis |
//! | `GET /api/analysis/latest` | newest analysis for a symbol |
//! | `GET /api/analysis/history` | paginated summaries |
//! | `GET /api/analysis/search/stock` | symbol suggestions |
//! | `GET /api/analysis/:id` | one analysis |
//! | `POST /api/payment/{prepare,verify,cancel}` | payment flow |
//! | `GET /api/payment/status/:payment_id` | processor view of the caller's payment |
//! | `GET /health` | dependency snapshot |
//!
//! Every analysis and payment route requires an `X-User-Id` header holding a
//! hyphenated UUID v4; analysis reads only ever return the caller's records.

pub mod error;
pub mod identity;
pub mod pipeline;
pub mod routes;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use log::warn;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub use error::{ApiError, StartupError};
pub use identity::{CallerId, USER_ID_HEADER};
pub use pipeline::{AnalysisPipeline, AnalysisRequest};
pub use state::AppState;

/// Full application router with CORS applied.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    routes::api_router()
        .layer(cors)
        .with_state(Arc::new(state))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(USER_ID_HEADER)])
}

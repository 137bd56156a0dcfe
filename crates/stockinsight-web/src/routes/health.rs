use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// Liveness plus a snapshot of each dependency. Never calls upstream.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let directory = state.resolver.directory();
    let router = state.generator.router();

    Json(json!({
        "status": "ok",
        "directory": {
            "healthy": directory.is_healthy(),
            "fresh": directory.is_fresh(),
            "stock_count": directory.stock_count(),
        },
        "llm": {
            "primary": router.primary().as_str(),
            "providers": router.status(),
        },
        "payment": {
            "provider": state.gate.vendor().as_str(),
            "configured": state.gate.is_configured(),
            "required": state.gate.is_required(),
        },
    }))
}

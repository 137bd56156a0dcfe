use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stockinsight_core::{
    HistoryPage, HistoryQuery, InsightRecord, Market, Recommendation, ServiceError, Timeframe,
};

use crate::error::ApiError;
use crate::identity::CallerId;
use crate::pipeline::AnalysisRequest;
use crate::routes::blocking;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAnalysisBody {
    stock_code: String,
    timeframe: String,
    payment_id: Option<String>,
    order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisCreated {
    message: &'static str,
    insight_id: i64,
    stock_code: String,
    stock_name: String,
    recommendation: Recommendation,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    stock_code: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    stock_code: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    symbol: String,
    name: String,
    market: Market,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    query: String,
    results: Vec<SearchHit>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analysis/stock", post(create_analysis))
        .route("/api/analysis/latest", get(latest_analysis))
        .route("/api/analysis/history", get(analysis_history))
        .route("/api/analysis/search/stock", get(search_stock))
        .route("/api/analysis/:id", get(analysis_by_id))
}

async fn create_analysis(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(body): Json<CreateAnalysisBody>,
) -> Result<Json<AnalysisCreated>, ApiError> {
    let request = AnalysisRequest {
        stock_code: body.stock_code,
        timeframe: Timeframe::parse(&body.timeframe)?,
        payment_id: body.payment_id.filter(|id| !id.trim().is_empty()),
        order_id: body.order_id.filter(|id| !id.trim().is_empty()),
    };
    let record = state.pipeline.run(&user_id, request).await?;

    Ok(Json(AnalysisCreated {
        message: "analysis completed",
        insight_id: record.id,
        stock_code: record.symbol,
        stock_name: record.display_name,
        recommendation: record.fields.recommendation,
    }))
}

async fn latest_analysis(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Query(query): Query<LatestQuery>,
) -> Result<Json<InsightRecord>, ApiError> {
    let symbol = state.resolver.resolve(&query.stock_code).await?;
    let store = Arc::clone(&state.store);
    let lookup = symbol.code().to_owned();
    let record = blocking(move || store.latest(&user_id, &lookup)).await?;

    record.map(Json).ok_or_else(|| {
        ServiceError::NotFound(format!("no analysis found for '{}'", symbol.code())).into()
    })
}

async fn analysis_history(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryPage>, ApiError> {
    // Filter by canonical code so `005930` matches records stored as `005930.KS`.
    let stock_code = match params.stock_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            Some(state.resolver.resolve(code).await?.code().to_owned())
        }
        _ => None,
    };
    let query = HistoryQuery::new(
        stock_code,
        params.limit,
        params.skip,
        state.max_history,
    )?;
    let store = Arc::clone(&state.store);
    let page = blocking(move || store.history(&user_id, &query)).await?;
    Ok(Json(page))
}

async fn search_stock(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>, ApiError> {
    let symbols = state.resolver.search(&query.query).await?;
    let results = symbols
        .into_iter()
        .map(|symbol| SearchHit {
            symbol: symbol.code().to_owned(),
            name: symbol.display_name().to_owned(),
            market: symbol.market(),
        })
        .collect();

    Ok(Json(SearchResults {
        query: query.query,
        results,
    }))
}

async fn analysis_by_id(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> Result<Json<InsightRecord>, ApiError> {
    let store = Arc::clone(&state.store);
    let record = blocking(move || store.find(&user_id, id)).await?;

    record
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("analysis {id} not found")).into())
}

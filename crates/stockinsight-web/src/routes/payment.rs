use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stockinsight_core::{Timeframe, ValidationError};
use stockinsight_payment::{CancelRequest, Checkout, PaymentRecord, VerifiedPayment};

use crate::error::ApiError;
use crate::identity::CallerId;
use crate::state::AppState;

const DEFAULT_CANCEL_REASON: &str = "refund for a service error";

#[derive(Debug, Deserialize)]
pub struct PrepareBody {
    stock_code: String,
    timeframe: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    imp_uid: String,
    merchant_uid: String,
}

#[derive(Debug, Serialize)]
pub struct Verification {
    verified: bool,
    #[serde(flatten)]
    payment: VerifiedPayment,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    imp_uid: String,
    reason: Option<String>,
    amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Cancellation {
    success: bool,
    imp_uid: String,
    cancelled_amount: i64,
    message: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/payment/prepare", post(prepare_payment))
        .route("/api/payment/verify", post(verify_payment))
        .route("/api/payment/status/:payment_id", get(payment_status))
        .route("/api/payment/cancel", post(cancel_payment))
}

fn ensure_configured(state: &AppState) -> Result<(), ApiError> {
    if state.gate.is_configured() {
        return Ok(());
    }
    Err(ApiError::PaymentsUnavailable(format!(
        "payment processor '{}' is not configured",
        state.gate.vendor().as_str()
    )))
}

fn required(field: &'static str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field }.into());
    }
    Ok(())
}

async fn prepare_payment(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(body): Json<PrepareBody>,
) -> Result<Json<Checkout>, ApiError> {
    ensure_configured(&state)?;
    let timeframe = Timeframe::parse(&body.timeframe)?;
    let checkout = state
        .gate
        .prepare(&body.stock_code, timeframe, &user_id)
        .await?;
    Ok(Json(checkout))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(body): Json<VerifyBody>,
) -> Result<Json<Verification>, ApiError> {
    ensure_configured(&state)?;
    required("imp_uid", &body.imp_uid)?;
    required("merchant_uid", &body.merchant_uid)?;

    let payment = state
        .gate
        .verify_for_receipt(body.imp_uid.trim(), body.merchant_uid.trim(), &user_id)
        .await?;
    Ok(Json(Verification {
        verified: true,
        payment,
    }))
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError> {
    ensure_configured(&state)?;
    Ok(Json(state.gate.status(payment_id.trim(), &user_id).await?))
}

async fn cancel_payment(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(body): Json<CancelBody>,
) -> Result<Json<Cancellation>, ApiError> {
    ensure_configured(&state)?;
    required("imp_uid", &body.imp_uid)?;

    let request = CancelRequest {
        payment_id: body.imp_uid.trim().to_owned(),
        amount: body.amount,
        reason: body
            .reason
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_CANCEL_REASON)),
    };
    let outcome = state.gate.cancel(&request, &user_id).await?;

    Ok(Json(Cancellation {
        success: true,
        message: format!("cancelled {} on {}", outcome.cancelled_amount, outcome.payment_id),
        imp_uid: outcome.payment_id,
        cancelled_amount: outcome.cancelled_amount,
    }))
}

//! PortOne (iamport) v1 REST adapter.
//!
//! Every call needs a short-lived access token from `/users/getToken`; the
//! token is cached until shortly before the expiry PortOne reports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use stockinsight_core::{
    HttpAuth, HttpClient, HttpRequest, PaymentVendor, PortOneConfig, SourceError, UtcDateTime,
};
use tokio::sync::Mutex;

use crate::processor::{
    status_error, CancelOutcome, CancelRequest, Checkout, OrderDraft, PaymentProcessor,
    PaymentRecord, PaymentStatus,
};

const PORTONE_BASE_URL: &str = "https://api.iamport.kr";
const REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Refresh this long before the reported expiry.
const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// PortOne wraps every payload as `{code, message, response}`; `code != 0`
/// is a failure even on HTTP 200.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    message: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expired_at: i64,
    now: i64,
}

#[derive(Debug, Deserialize)]
struct PortOnePayment {
    imp_uid: String,
    merchant_uid: Option<String>,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    cancel_amount: i64,
    #[serde(default)]
    status: String,
    pg_provider: Option<String>,
    pay_method: Option<String>,
    #[serde(default)]
    paid_at: i64,
}

impl PortOnePayment {
    fn into_record(self) -> PaymentRecord {
        PaymentRecord {
            status: match self.status.as_str() {
                "ready" => PaymentStatus::Ready,
                "paid" => PaymentStatus::Paid,
                "cancelled" => PaymentStatus::Cancelled,
                "failed" => PaymentStatus::Failed,
                _ => PaymentStatus::Unknown,
            },
            payment_id: self.imp_uid,
            order_id: self.merchant_uid,
            amount: self.amount,
            cancelled_amount: self.cancel_amount,
            pg_provider: self.pg_provider,
            pay_method: self.pay_method,
            paid_at: UtcDateTime::from_unix_seconds(self.paid_at),
        }
    }
}

pub struct PortOneProcessor {
    http_client: Arc<dyn HttpClient>,
    config: PortOneConfig,
    base_url: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl PortOneProcessor {
    pub fn new(http_client: Arc<dyn HttpClient>, config: PortOneConfig) -> Self {
        Self {
            http_client,
            config,
            base_url: String::from(PORTONE_BASE_URL),
            token: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send<T>(&self, request: HttpRequest, what: &str) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http_client
            .execute(request.with_timeout_ms(REQUEST_TIMEOUT_MS))
            .await
            .map_err(|error| {
                SourceError::unavailable(format!("portone {what} request failed: {error}"))
            })?;

        if !response.is_success() {
            return Err(status_error(PaymentVendor::PortOne, &response));
        }

        let envelope: Envelope<T> = serde_json::from_str(&response.body).map_err(|e| {
            SourceError::internal(format!("malformed portone {what} payload: {e}"))
        })?;
        let message = envelope.message.unwrap_or_default();
        match envelope.response {
            Some(body) if envelope.code == 0 => Ok(body),
            None if envelope.code == 0 => Err(SourceError::not_found(format!(
                "portone {what} returned no data"
            ))),
            _ => Err(SourceError::invalid_request(format!(
                "portone {what} failed (code {}): {message}",
                envelope.code
            ))),
        }
    }

    async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.token.lock().await;
        if let Some((token, valid_until)) = cached.as_ref() {
            if Instant::now() < *valid_until {
                return Ok(token.clone());
            }
        }

        let request = HttpRequest::post(format!("{}/users/getToken", self.base_url)).with_json(
            &json!({
                "imp_key": self.config.api_key,
                "imp_secret": self.config.api_secret,
            }),
        );
        let token: TokenResponse = self.send(request, "token").await?;

        let lifetime = u64::try_from(token.expired_at - token.now).unwrap_or(0);
        let valid_for = Duration::from_secs(lifetime).saturating_sub(TOKEN_SAFETY_MARGIN);
        debug!("portone access token valid for {valid_for:?}");
        *cached = Some((token.access_token.clone(), Instant::now() + valid_for));
        Ok(token.access_token)
    }

    async fn authorized(&self, request: HttpRequest) -> Result<HttpRequest, SourceError> {
        let token = self.access_token().await?;
        Ok(request.with_auth(&HttpAuth::BearerToken(token)))
    }
}

#[async_trait]
impl PaymentProcessor for PortOneProcessor {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::PortOne
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
            && !self.config.api_secret.is_empty()
            && !self.config.merchant_id.is_empty()
    }

    async fn prepare(&self, draft: &OrderDraft) -> Result<Checkout, SourceError> {
        if !self.is_configured() {
            return Err(SourceError::not_configured("PortOne credentials are not set"));
        }

        // Pre-registering the amount makes PortOne refuse any other amount.
        let request = self
            .authorized(
                HttpRequest::post(format!("{}/payments/prepare", self.base_url)).with_json(
                    &json!({
                        "merchant_uid": draft.order_id,
                        "amount": draft.amount,
                    }),
                ),
            )
            .await?;
        let _: serde_json::Value = self.send(request, "prepare").await?;
        info!(
            "portone prepared {} for {} ({})",
            draft.order_id, draft.amount, draft.stock_code
        );

        Ok(Checkout {
            order_id: draft.order_id.clone(),
            amount: draft.amount,
            product_name: draft.product_name.clone(),
            merchant_id: Some(self.config.merchant_id.clone()),
            pg_provider: Some(self.config.pg_provider.clone()),
            channel_key: Some(self.config.channel_key.clone()).filter(|key| !key.is_empty()),
            checkout_url: None,
            payment_id: None,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentRecord, SourceError> {
        if !self.is_configured() {
            return Err(SourceError::not_configured("PortOne credentials are not set"));
        }

        let request = self
            .authorized(HttpRequest::get(format!(
                "{}/payments/{}",
                self.base_url, payment_id
            )))
            .await?;
        let payment: PortOnePayment = self.send(request, "payment lookup").await?;
        Ok(payment.into_record())
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        if !self.is_configured() {
            return Err(SourceError::not_configured("PortOne credentials are not set"));
        }

        let mut body = json!({
            "imp_uid": request.payment_id,
            "reason": request.reason,
        });
        if let Some(amount) = request.amount {
            body["amount"] = json!(amount);
        }

        let http_request = self
            .authorized(
                HttpRequest::post(format!("{}/payments/cancel", self.base_url)).with_json(&body),
            )
            .await?;
        let payment: PortOnePayment = self.send(http_request, "cancel").await?;
        let record = payment.into_record();
        if record.status != PaymentStatus::Cancelled && request.amount.is_none() {
            warn!(
                "portone cancel of {} left status {}",
                record.payment_id, record.status
            );
        }

        Ok(CancelOutcome {
            payment_id: record.payment_id,
            cancelled_amount: record.cancelled_amount,
        })
    }
}

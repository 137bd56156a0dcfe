//! Payment-processor capability shared by every vendor adapter.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::Serialize;
use stockinsight_core::{HttpResponse, PaymentVendor, SourceError, Timeframe, UserId, UtcDateTime};

/// Lifecycle state reported by a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Ready,
    Paid,
    Cancelled,
    Failed,
    Unknown,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the server intends to charge for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub order_id: String,
    pub amount: i64,
    pub product_name: String,
    pub stock_code: String,
    pub timeframe: Timeframe,
    pub user_id: UserId,
}

/// Client-facing data needed to start paying for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    #[serde(rename = "merchant_uid")]
    pub order_id: String,
    pub amount: i64,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Set when the processor mints the payment id up front.
    #[serde(rename = "imp_uid", skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

/// Authoritative processor view of one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    #[serde(rename = "imp_uid")]
    pub payment_id: String,
    /// The processor's echo of our order id.
    #[serde(rename = "merchant_uid")]
    pub order_id: Option<String>,
    pub amount: i64,
    pub cancelled_amount: i64,
    pub status: PaymentStatus,
    pub pg_provider: Option<String>,
    pub pay_method: Option<String>,
    pub paid_at: Option<UtcDateTime>,
}

impl PaymentRecord {
    pub fn refundable_amount(&self) -> i64 {
        (self.amount - self.cancelled_amount).max(0)
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.status == PaymentStatus::Cancelled || self.refundable_amount() == 0
    }
}

/// Cancel or refund instruction. `amount: None` cancels everything left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub payment_id: String,
    pub amount: Option<i64>,
    pub reason: String,
}

impl CancelRequest {
    pub fn full(payment_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    #[serde(rename = "imp_uid")]
    pub payment_id: String,
    pub cancelled_amount: i64,
}

/// One concrete adapter per processor, selected at startup.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn vendor(&self) -> PaymentVendor;

    fn is_configured(&self) -> bool;

    /// Registers the order with the processor. Nothing is charged.
    async fn prepare(&self, draft: &OrderDraft) -> Result<Checkout, SourceError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentRecord, SourceError>;

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError>;
}

/// Stand-in when no processor is selected; reports itself unconfigured.
pub struct DisabledProcessor;

#[async_trait]
impl PaymentProcessor for DisabledProcessor {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::Disabled
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn prepare(&self, _draft: &OrderDraft) -> Result<Checkout, SourceError> {
        Err(SourceError::not_configured("payments are disabled"))
    }

    async fn fetch_payment(&self, _payment_id: &str) -> Result<PaymentRecord, SourceError> {
        Err(SourceError::not_configured("payments are disabled"))
    }

    async fn cancel(&self, _request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        Err(SourceError::not_configured("payments are disabled"))
    }
}

/// Maps a non-success processor status to a source error.
pub(crate) fn status_error(vendor: PaymentVendor, response: &HttpResponse) -> SourceError {
    let excerpt: String = response.body.chars().take(200).collect();
    let vendor = vendor.as_str();
    match response.status {
        404 => SourceError::not_found(format!("{vendor} has no such payment")),
        401 | 403 => SourceError::not_configured(format!("{vendor} rejected the credentials")),
        429 => SourceError::rate_limited(format!("{vendor} rate limit exceeded")),
        400 | 422 => SourceError::invalid_request(format!("{vendor} rejected the request: {excerpt}")),
        status => SourceError::unavailable(format!("{vendor} returned status {status}")),
    }
}

//! Payment gate and compensator.
//!
//! `prepare` records what an order must cost, `verify` compares the
//! processor's view against that record, and `compensate` refunds a
//! verified payment whose analysis could not be delivered or whose
//! receipt expired unredeemed.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use stockinsight_core::{
    PaymentConfig, PaymentVendor, RetryConfig, ServiceError, SourceError, SourceErrorKind,
    Timeframe, UserId, UtcDateTime, ValidationError,
};
use uuid::Uuid;

use crate::ledger::{ExpectationStore, PaymentExpectation, PaymentOwners, Receipt, ReceiptBook};
use crate::processor::{
    CancelOutcome, CancelRequest, Checkout, OrderDraft, PaymentProcessor, PaymentRecord,
    PaymentStatus,
};

const AMOUNT_MISMATCH_REASON: &str = "paid amount does not match the order amount";
const RECEIPT_EXPIRED_REASON: &str = "verified payment was never redeemed";
/// How long a verified payment stays visible to its payer.
const OWNERSHIP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct PaymentGateConfig {
    pub price: i64,
    pub product_name: String,
    pub required: bool,
    pub expectation_ttl: Duration,
    /// Window for redeeming a standalone verification.
    pub receipt_ttl: Duration,
    /// Applied to retryable refund failures only.
    pub refund_retry: RetryConfig,
}

impl From<&PaymentConfig> for PaymentGateConfig {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            price: config.price,
            product_name: config.product_name.clone(),
            required: config.required,
            expectation_ttl: config.expectation_ttl,
            receipt_ttl: config.expectation_ttl,
            refund_retry: RetryConfig::exponential(config.refund_max_retries),
        }
    }
}

/// A payment the processor confirmed as paid in full for our order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedPayment {
    #[serde(rename = "imp_uid")]
    pub payment_id: String,
    #[serde(rename = "merchant_uid")]
    pub order_id: String,
    pub amount: i64,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<UtcDateTime>,
    #[serde(skip)]
    pub stock_code: String,
    #[serde(skip)]
    pub timeframe: Timeframe,
    #[serde(skip)]
    pub user_id: UserId,
}

impl VerifiedPayment {
    fn receipt(&self) -> Receipt {
        Receipt {
            payment_id: self.payment_id.clone(),
            order_id: self.order_id.clone(),
            amount: self.amount,
            stock_code: self.stock_code.clone(),
            timeframe: self.timeframe,
            user_id: self.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { amount: i64 },
    AlreadyRefunded,
}

fn mint_order_id() -> String {
    format!("insight_{}", Uuid::new_v4().simple())
}

pub struct PaymentGate {
    processor: Arc<dyn PaymentProcessor>,
    expectations: ExpectationStore,
    receipts: ReceiptBook,
    owners: PaymentOwners,
    config: PaymentGateConfig,
}

impl PaymentGate {
    pub fn new(processor: Arc<dyn PaymentProcessor>, config: PaymentGateConfig) -> Self {
        Self {
            expectations: ExpectationStore::new(config.expectation_ttl),
            receipts: ReceiptBook::new(config.receipt_ttl),
            owners: PaymentOwners::new(OWNERSHIP_TTL),
            processor,
            config,
        }
    }

    pub fn vendor(&self) -> PaymentVendor {
        self.processor.vendor()
    }

    pub fn is_configured(&self) -> bool {
        self.processor.is_configured()
    }

    /// Whether create-analysis must be paid for.
    pub fn is_required(&self) -> bool {
        self.config.required && self.is_configured()
    }

    pub fn price(&self) -> i64 {
        self.config.price
    }

    pub async fn pending_orders(&self) -> usize {
        self.expectations.pending().await
    }

    /// Registers a new order at the configured price. Nothing is charged.
    pub async fn prepare(
        &self,
        stock_code: &str,
        timeframe: Timeframe,
        user_id: &UserId,
    ) -> Result<Checkout, ServiceError> {
        let stock_code = stock_code.trim();
        if stock_code.is_empty() {
            return Err(ValidationError::EmptyField { field: "stock_code" }.into());
        }

        let draft = OrderDraft {
            order_id: mint_order_id(),
            amount: self.config.price,
            product_name: self.config.product_name.clone(),
            stock_code: stock_code.to_owned(),
            timeframe,
            user_id: user_id.clone(),
        };
        let checkout = self.processor.prepare(&draft).await?;

        self.expectations
            .save(PaymentExpectation {
                order_id: draft.order_id.clone(),
                expected_amount: draft.amount,
                stock_code: draft.stock_code,
                timeframe,
                user_id: draft.user_id,
            })
            .await;
        info!(
            "prepared order {} for {} via {}",
            draft.order_id,
            draft.amount,
            self.vendor().as_str()
        );
        Ok(checkout)
    }

    /// Verifies `payment_id` against the expectation recorded for
    /// `order_id`. The expectation is consumed only on full agreement.
    pub async fn verify(
        &self,
        payment_id: &str,
        order_id: &str,
        user_id: &UserId,
    ) -> Result<VerifiedPayment, ServiceError> {
        let Some(expectation) = self.expectations.get(order_id, user_id).await else {
            warn!("verification of {payment_id} rejected: order {order_id} is unknown or expired");
            return Err(ServiceError::PaymentRequired(format!(
                "order {order_id} is unknown or has expired"
            )));
        };

        let record = self.processor.fetch_payment(payment_id).await.map_err(|e| {
            if e.kind() == SourceErrorKind::NotFound {
                ServiceError::PaymentRequired(format!("payment {payment_id} was not found"))
            } else {
                ServiceError::from(e)
            }
        })?;

        if record.status != PaymentStatus::Paid {
            warn!("verification of {payment_id} rejected: status {}", record.status);
            return Err(ServiceError::PaymentRequired(format!(
                "payment {payment_id} is {}, not paid",
                record.status
            )));
        }

        if record.amount != expectation.expected_amount {
            error!(
                "payment {payment_id} amount {} differs from expected {}; cancelling",
                record.amount, expectation.expected_amount
            );
            let cancel = CancelRequest::full(payment_id, AMOUNT_MISMATCH_REASON);
            match self.processor.cancel(&cancel).await {
                Ok(outcome) => info!(
                    "cancelled mismatched payment {payment_id} ({} cancelled)",
                    outcome.cancelled_amount
                ),
                Err(e) => error!("automatic cancel of {payment_id} failed: {e}"),
            }
            return Err(ServiceError::PaymentAmountMismatch {
                expected: expectation.expected_amount,
                actual: record.amount,
            });
        }

        if record.order_id.as_deref() != Some(order_id) {
            warn!(
                "verification of {payment_id} rejected: processor echoed order {:?}, expected {order_id}",
                record.order_id
            );
            return Err(ServiceError::PaymentRequired(format!(
                "payment {payment_id} does not belong to order {order_id}"
            )));
        }

        let Some(expectation) = self.expectations.consume(order_id, user_id).await else {
            return Err(ServiceError::PaymentRequired(format!(
                "order {order_id} was already verified"
            )));
        };

        self.owners.record(payment_id, order_id, user_id).await;
        info!("verified payment {payment_id} for order {order_id}");
        Ok(VerifiedPayment {
            payment_id: record.payment_id,
            order_id: expectation.order_id,
            amount: record.amount,
            status: record.status,
            paid_at: record.paid_at,
            stock_code: expectation.stock_code,
            timeframe: expectation.timeframe,
            user_id: expectation.user_id,
        })
    }

    /// Standalone verification: a success leaves a one-shot receipt that a
    /// later create-analysis call redeems.
    pub async fn verify_for_receipt(
        &self,
        payment_id: &str,
        order_id: &str,
        user_id: &UserId,
    ) -> Result<VerifiedPayment, ServiceError> {
        let verified = self.verify(payment_id, order_id, user_id).await?;
        let expired = self.receipts.issue(verified.receipt()).await;
        self.refund_receipts(expired).await;
        Ok(verified)
    }

    /// Redeems a receipt. The processor must still report the payment as
    /// paid in full; anything else withdraws the receipt.
    pub async fn redeem(
        &self,
        payment_id: &str,
        user_id: &UserId,
        stock_code: &str,
        timeframe: Timeframe,
    ) -> Result<Receipt, ServiceError> {
        let unredeemable = || {
            ServiceError::PaymentRequired(format!(
                "no verified payment {payment_id} for this analysis"
            ))
        };
        let receipt = self
            .receipts
            .find(payment_id, user_id, stock_code, timeframe)
            .await
            .ok_or_else(unredeemable)?;

        let record = self.processor.fetch_payment(payment_id).await?;
        if record.status != PaymentStatus::Paid
            || record.cancelled_amount != 0
            || record.amount != receipt.amount
        {
            warn!(
                "receipt for {payment_id} withdrawn: processor reports {} with {} of {} cancelled",
                record.status, record.cancelled_amount, record.amount
            );
            self.receipts.revoke(payment_id).await;
            return Err(unredeemable());
        }

        self.receipts
            .redeem(payment_id, user_id, stock_code, timeframe)
            .await
            .ok_or_else(unredeemable)
    }

    /// Processor record for a payment the caller verified or has a live
    /// order for. Any other payment reads as not found.
    pub async fn status(
        &self,
        payment_id: &str,
        user_id: &UserId,
    ) -> Result<PaymentRecord, ServiceError> {
        self.owned_record(payment_id, user_id).await
    }

    /// Cancels the caller's own payment and withdraws any unredeemed
    /// receipt for it.
    pub async fn cancel(
        &self,
        request: &CancelRequest,
        user_id: &UserId,
    ) -> Result<CancelOutcome, ServiceError> {
        self.owned_record(&request.payment_id, user_id).await?;
        let outcome = self.processor.cancel(request).await?;
        if self.receipts.revoke(&request.payment_id).await.is_some() {
            info!("receipt for {} withdrawn by cancel", request.payment_id);
        }
        info!(
            "cancelled {} on {} ({})",
            outcome.cancelled_amount, outcome.payment_id, request.reason
        );
        Ok(outcome)
    }

    /// Refunds every receipt that expired unredeemed. Returns how many
    /// refunds went through.
    pub async fn refund_expired_receipts(&self) -> usize {
        let expired = self.receipts.take_expired().await;
        self.refund_receipts(expired).await
    }

    async fn refund_receipts(&self, receipts: Vec<Receipt>) -> usize {
        let mut refunded = 0;
        for receipt in receipts {
            match self.compensate(&receipt.payment_id, RECEIPT_EXPIRED_REASON).await {
                Ok(_) => refunded += 1,
                Err(e) => error!(
                    "refund of expired receipt {} failed: {e}",
                    receipt.payment_id
                ),
            }
        }
        refunded
    }

    async fn owned_record(
        &self,
        payment_id: &str,
        user_id: &UserId,
    ) -> Result<PaymentRecord, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("payment {payment_id} was not found"));
        let verified_by_caller = self.owners.is_owned_by(payment_id, user_id).await;

        let record = self.processor.fetch_payment(payment_id).await.map_err(|e| {
            if e.kind() == SourceErrorKind::NotFound {
                not_found()
            } else {
                ServiceError::from(e)
            }
        })?;
        if verified_by_caller {
            return Ok(record);
        }

        let ordered_by_caller = match record.order_id.as_deref() {
            Some(order_id) => self.expectations.is_owned_by(order_id, user_id).await,
            None => false,
        };
        if ordered_by_caller {
            Ok(record)
        } else {
            warn!("payment {payment_id} requested by a user who does not own it");
            Err(not_found())
        }
    }

    /// Refunds whatever is still refundable on `payment_id`. A payment that
    /// is already fully refunded is left alone.
    pub async fn compensate(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> Result<RefundOutcome, ServiceError> {
        let record = self.processor.fetch_payment(payment_id).await?;
        if record.is_fully_refunded() {
            info!("payment {payment_id} is already refunded");
            return Ok(RefundOutcome::AlreadyRefunded);
        }

        let request = CancelRequest {
            payment_id: payment_id.to_owned(),
            amount: Some(record.refundable_amount()),
            reason: reason.to_owned(),
        };
        let outcome = self.cancel_with_retry(&request).await?;
        info!(
            "refunded {} on {payment_id}: {reason}",
            record.refundable_amount()
        );
        Ok(RefundOutcome::Refunded {
            amount: outcome.cancelled_amount - record.cancelled_amount,
        })
    }

    async fn cancel_with_retry(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        let retry = &self.config.refund_retry;
        let max_retries = retry.effective_retries();
        let mut attempt = 0;

        loop {
            match self.processor.cancel(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.retryable() && attempt < max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        "refund of {} failed ({e}); retrying in {delay:?}",
                        request.payment_id
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("refund of {} failed: {e}", request.payment_id);
                    return Err(e);
                }
            }
        }
    }
}

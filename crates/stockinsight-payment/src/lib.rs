//! # Stockinsight Payment
//!
//! Pay-per-analysis: orders are priced server-side, verified against the
//! processor's authoritative record, and refunded when the paid analysis
//! cannot be delivered.
//!
//! ## Flow
//!
//! ```text
//! prepare ──▶ expectation ──▶ buyer pays ──▶ verify ──▶ analysis
//!                                              │            │
//!                             amount mismatch ─┘            └─ failure ─▶ compensate
//!                             (auto-cancel)                               (refund)
//! ```
//!
//! Exactly one processor is active per process, chosen by
//! [`PaymentVendor`](stockinsight_core::PaymentVendor):
//!
//! | Vendor | Payment id | Order echo |
//! |--------|------------|------------|
//! | PortOne v1 | `imp_uid` | `merchant_uid` |
//! | Lemon Squeezy | checkout id | checkout custom data |

mod gate;
mod lemonsqueezy;
mod ledger;
mod portone;
mod processor;

use std::sync::Arc;

use log::info;
use stockinsight_core::{HttpClient, PaymentConfig, PaymentVendor};

pub use gate::{PaymentGate, PaymentGateConfig, RefundOutcome, VerifiedPayment};
pub use ledger::{ExpectationStore, PaymentExpectation, PaymentOwners, Receipt, ReceiptBook};
pub use lemonsqueezy::LemonSqueezyProcessor;
pub use portone::PortOneProcessor;
pub use processor::{
    CancelOutcome, CancelRequest, Checkout, DisabledProcessor, OrderDraft, PaymentProcessor,
    PaymentRecord, PaymentStatus,
};

/// Builds the processor selected by `config.vendor`.
pub fn processor_from_config(
    config: &PaymentConfig,
    http_client: Arc<dyn HttpClient>,
) -> Arc<dyn PaymentProcessor> {
    let processor: Arc<dyn PaymentProcessor> = match config.vendor {
        PaymentVendor::PortOne => {
            Arc::new(PortOneProcessor::new(http_client, config.portone.clone()))
        }
        PaymentVendor::LemonSqueezy => Arc::new(LemonSqueezyProcessor::new(
            http_client,
            config.lemonsqueezy.clone(),
        )),
        PaymentVendor::Disabled => Arc::new(DisabledProcessor),
    };
    info!(
        "payment processor: {} (configured: {})",
        processor.vendor().as_str(),
        processor.is_configured()
    );
    processor
}

/// Gate over the configured processor.
pub fn gate_from_config(config: &PaymentConfig, http_client: Arc<dyn HttpClient>) -> PaymentGate {
    PaymentGate::new(
        processor_from_config(config, http_client),
        PaymentGateConfig::from(config),
    )
}

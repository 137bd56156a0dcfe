//! Create-analysis orchestration: settle payment, resolve, generate, and
//! refund when a paid analysis cannot be delivered.

use std::sync::Arc;

use log::{error, info, warn};
use stockinsight_ai::{GenerationRequest, InsightGenerator};
use stockinsight_core::domain::normalize_query;
use stockinsight_core::{InsightRecord, ServiceError, SymbolResolver, Timeframe, UserId};
use stockinsight_payment::{PaymentGate, RefundOutcome};

const REFUND_REASON: &str = "analysis could not be completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub stock_code: String,
    pub timeframe: Timeframe,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
}

/// Payment that backs one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settlement {
    payment_id: String,
}

pub struct AnalysisPipeline {
    resolver: Arc<SymbolResolver>,
    generator: Arc<InsightGenerator>,
    gate: Arc<PaymentGate>,
}

impl AnalysisPipeline {
    pub fn new(
        resolver: Arc<SymbolResolver>,
        generator: Arc<InsightGenerator>,
        gate: Arc<PaymentGate>,
    ) -> Self {
        Self {
            resolver,
            generator,
            gate,
        }
    }

    pub async fn run(
        &self,
        user_id: &UserId,
        request: AnalysisRequest,
    ) -> Result<InsightRecord, ServiceError> {
        let query = normalize_query(&request.stock_code)?.to_owned();
        let settlement = self.settle(user_id, &query, &request).await?;

        let outcome = self.analyze(user_id, &query, request.timeframe).await;
        match (outcome, settlement) {
            (Ok(record), _) => Ok(record),
            (Err(error), None) => Err(error),
            (Err(error), Some(settlement)) => Err(self.refund(&settlement, error).await),
        }
    }

    async fn analyze(
        &self,
        user_id: &UserId,
        query: &str,
        timeframe: Timeframe,
    ) -> Result<InsightRecord, ServiceError> {
        let symbol = self.resolver.resolve(query).await?;
        let record = self
            .generator
            .generate(GenerationRequest {
                symbol,
                timeframe,
                user_id: user_id.clone(),
            })
            .await?;
        info!(
            "analysis {} for {} ({}) recommends {}",
            record.id,
            record.symbol,
            record.display_name,
            record.fields.recommendation.as_str()
        );
        Ok(record)
    }

    /// Establishes the payment behind this request, if any.
    ///
    /// A `payment_id` with an `order_id` is verified inline; a bare
    /// `payment_id` must redeem a receipt from an earlier verification.
    async fn settle(
        &self,
        user_id: &UserId,
        query: &str,
        request: &AnalysisRequest,
    ) -> Result<Option<Settlement>, ServiceError> {
        let Some(payment_id) = request.payment_id.as_deref() else {
            if self.gate.is_required() {
                return Err(ServiceError::PaymentRequired(String::from(
                    "this analysis requires a verified payment",
                )));
            }
            return Ok(None);
        };

        if let Some(order_id) = request.order_id.as_deref() {
            let verified = self.gate.verify(payment_id, order_id, user_id).await?;
            let same_order = verified.stock_code.eq_ignore_ascii_case(query)
                && verified.timeframe == request.timeframe;
            if !same_order {
                warn!(
                    "payment {payment_id} was prepared for {} ({}), not {query} ({})",
                    verified.stock_code, verified.timeframe, request.timeframe
                );
                let error = ServiceError::PaymentRequired(format!(
                    "payment {payment_id} was made for a different analysis"
                ));
                return Err(self
                    .refund(&Settlement { payment_id: verified.payment_id }, error)
                    .await);
            }
            return Ok(Some(Settlement {
                payment_id: verified.payment_id,
            }));
        }

        let receipt = self
            .gate
            .redeem(payment_id, user_id, query, request.timeframe)
            .await?;
        Ok(Some(Settlement {
            payment_id: receipt.payment_id,
        }))
    }

    /// Refunds `settlement` and returns `error` for the caller, with a
    /// warning appended when the refund itself failed.
    async fn refund(&self, settlement: &Settlement, error: ServiceError) -> ServiceError {
        warn!(
            "refunding payment {} after failed analysis: {error}",
            settlement.payment_id
        );
        match self.gate.compensate(&settlement.payment_id, REFUND_REASON).await {
            Ok(RefundOutcome::Refunded { amount }) => {
                info!("refunded {amount} on {}", settlement.payment_id);
                error
            }
            Ok(RefundOutcome::AlreadyRefunded) => error,
            Err(refund_error) => {
                error!(
                    "refund of {} failed: {refund_error}",
                    settlement.payment_id
                );
                error.with_warning(&format!(
                    "automatic refund of payment {} failed: {refund_error}",
                    settlement.payment_id
                ))
            }
        }
    }
}

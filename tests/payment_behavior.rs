//! Behavior-driven tests for the payment gate and compensation
//!
//! These tests verify how paid analyses are verified against the processor,
//! how tampering is contained, and how failures are refunded.

use stockinsight_core::{ServiceError, Timeframe};
use stockinsight_payment::{CancelRequest, RefundOutcome};
use stockinsight_tests::{user, Harness, ALICE, BOB, PRICE};
use stockinsight_web::AnalysisRequest;

async fn prepared(harness: &Harness, code: &str, owner: &str) -> String {
    harness
        .gate
        .prepare(code, Timeframe::Mid, &user(owner))
        .await
        .expect("prepare")
        .order_id
}

fn receipt_request(code: &str, payment_id: &str) -> AnalysisRequest {
    AnalysisRequest {
        stock_code: code.to_owned(),
        timeframe: Timeframe::Mid,
        payment_id: Some(payment_id.to_owned()),
        order_id: None,
    }
}

async fn verified(harness: &Harness, code: &str, payment_id: &str) {
    let order_id = prepared(harness, code, ALICE).await;
    harness.processor.pay(payment_id, &order_id, PRICE);
    harness
        .gate
        .verify_for_receipt(payment_id, &order_id, &user(ALICE))
        .await
        .expect("verified");
}

fn paid_request(code: &str, payment_id: &str, order_id: &str) -> AnalysisRequest {
    AnalysisRequest {
        stock_code: code.to_owned(),
        timeframe: Timeframe::Mid,
        payment_id: Some(payment_id.to_owned()),
        order_id: Some(order_id.to_owned()),
    }
}

// =============================================================================
// Payment: Verification
// =============================================================================

#[tokio::test]
async fn when_processor_reports_a_different_amount_the_payment_is_cancelled() {
    // Given: An order expected at the configured price
    let harness = Harness::new(true);
    let order_id = prepared(&harness, "AAPL", ALICE).await;

    // When: The processor says the buyer paid one unit less
    harness.processor.pay("imp_tampered", &order_id, PRICE - 1);
    let result = harness
        .gate
        .verify("imp_tampered", &order_id, &user(ALICE))
        .await;

    // Then: Verification is rejected as a mismatch...
    assert_eq!(
        result.expect_err("mismatch"),
        ServiceError::PaymentAmountMismatch {
            expected: PRICE,
            actual: PRICE - 1,
        }
    );

    // ...and a full cancellation was already issued for that payment
    let cancels = harness.processor.cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].payment_id, "imp_tampered");
    assert_eq!(cancels[0].amount, None);
}

#[tokio::test]
async fn an_order_can_only_be_verified_once() {
    // Given: A paid order
    let harness = Harness::new(true);
    let order_id = prepared(&harness, "AAPL", ALICE).await;
    harness.processor.pay("imp_once", &order_id, PRICE);

    // When: The same order is verified twice
    let first = harness.gate.verify("imp_once", &order_id, &user(ALICE)).await;
    let replay = harness.gate.verify("imp_once", &order_id, &user(ALICE)).await;

    // Then: The replay finds no expectation
    assert!(first.is_ok());
    assert_eq!(replay.expect_err("replay").code(), "payment_required");
}

#[tokio::test]
async fn another_users_order_reads_as_unknown() {
    // Given: Alice's paid order
    let harness = Harness::new(true);
    let order_id = prepared(&harness, "AAPL", ALICE).await;
    harness.processor.pay("imp_alice", &order_id, PRICE);

    // When: Bob tries to verify it
    let result = harness.gate.verify("imp_alice", &order_id, &user(BOB)).await;

    // Then: He is told payment is required, and Alice can still verify
    assert_eq!(result.expect_err("foreign order").code(), "payment_required");
    assert!(harness
        .gate
        .verify("imp_alice", &order_id, &user(ALICE))
        .await
        .is_ok());
}

#[tokio::test]
async fn a_payment_echoing_another_order_is_rejected_without_cancel() {
    // Given: Two orders, and a payment made against the first
    let harness = Harness::new(true);
    let first = prepared(&harness, "AAPL", ALICE).await;
    let second = prepared(&harness, "AAPL", ALICE).await;
    harness.processor.pay("imp_first", &first, PRICE);

    // When: That payment is presented for the second order
    let result = harness.gate.verify("imp_first", &second, &user(ALICE)).await;

    // Then: It is rejected, nothing is cancelled, and the second order survives
    assert_eq!(result.expect_err("wrong order").code(), "payment_required");
    assert!(harness.processor.cancels().is_empty());
    assert_eq!(harness.gate.pending_orders().await, 2);
}

// =============================================================================
// Payment: Compensation
// =============================================================================

#[tokio::test]
async fn when_paid_analysis_hits_not_found_exactly_one_refund_is_issued() {
    // Given: A verified payment for a ticker no backend can quote
    let harness = Harness::new(true);
    let state = harness.state();
    let order_id = prepared(&harness, "NOPE", ALICE).await;
    harness.processor.pay("imp_refund", &order_id, PRICE);

    // When: The analysis runs with that payment
    let error = state
        .pipeline
        .run(&user(ALICE), paid_request("NOPE", "imp_refund", &order_id))
        .await
        .expect_err("no data");

    // Then: The caller sees not-found and exactly one refund went out for the
    // verified payment id, for the full amount
    assert_eq!(error.code(), "not_found");
    let cancels = harness.processor.cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].payment_id, "imp_refund");
    assert_eq!(cancels[0].amount, Some(PRICE));
    let payment = harness.processor.payment("imp_refund").expect("payment");
    assert_eq!(payment.cancelled_amount, PRICE);
}

#[tokio::test]
async fn compensating_a_refunded_payment_is_a_no_op() {
    // Given: A payment that was already refunded once
    let harness = Harness::new(true);
    let order_id = prepared(&harness, "AAPL", ALICE).await;
    harness.processor.pay("imp_twice", &order_id, PRICE);
    let first = harness
        .gate
        .compensate("imp_twice", "first")
        .await
        .expect("refund");

    // When: Compensation is invoked again
    let second = harness
        .gate
        .compensate("imp_twice", "second")
        .await
        .expect("no-op");

    // Then: Only the first call reached the processor
    assert_eq!(first, RefundOutcome::Refunded { amount: PRICE });
    assert_eq!(second, RefundOutcome::AlreadyRefunded);
    assert_eq!(harness.processor.cancels().len(), 1);
}

#[tokio::test]
async fn successful_paid_analysis_keeps_the_payment() {
    // Given: A verified payment for a quotable ticker
    let harness = Harness::new(true);
    let state = harness.state();
    let order_id = prepared(&harness, "AAPL", ALICE).await;
    harness.processor.pay("imp_kept", &order_id, PRICE);

    // When: The analysis succeeds
    let record = state
        .pipeline
        .run(&user(ALICE), paid_request("AAPL", "imp_kept", &order_id))
        .await
        .expect("analysis");

    // Then: No refund was issued
    assert_eq!(record.symbol, "AAPL");
    assert!(harness.processor.cancels().is_empty());
}

// =============================================================================
// Payment: Receipts
// =============================================================================

#[tokio::test]
async fn when_a_verified_payment_is_cancelled_its_receipt_buys_nothing() {
    // Given: Alice verified a payment and holds its receipt
    let harness = Harness::new(true);
    let state = harness.state();
    verified(&harness, "AAPL", "imp_cancelled").await;

    // When: She cancels the payment, then asks for the analysis with it
    harness
        .gate
        .cancel(&CancelRequest::full("imp_cancelled", "changed my mind"), &user(ALICE))
        .await
        .expect("cancel");
    let result = state
        .pipeline
        .run(&user(ALICE), receipt_request("AAPL", "imp_cancelled"))
        .await;

    // Then: Payment is required again and no model call was made
    assert_eq!(result.expect_err("refunded").code(), "payment_required");
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn a_receipt_for_a_payment_refunded_at_the_processor_is_refused() {
    // Given: A receipt whose payment was refunded without going through cancel
    let harness = Harness::new(true);
    let state = harness.state();
    verified(&harness, "AAPL", "imp_refunded").await;
    harness
        .gate
        .compensate("imp_refunded", "refunded by support")
        .await
        .expect("refund");

    // When: The receipt is redeemed
    let result = state
        .pipeline
        .run(&user(ALICE), receipt_request("AAPL", "imp_refunded"))
        .await;

    // Then: The processor's view wins
    assert_eq!(result.expect_err("refunded").code(), "payment_required");
    assert_eq!(harness.processor.cancels().len(), 1);
}

#[tokio::test]
async fn another_user_can_neither_read_nor_cancel_a_payment() {
    // Given: Alice's verified payment
    let harness = Harness::new(true);
    let state = harness.state();
    verified(&harness, "AAPL", "imp_alice").await;

    // When: Bob asks for its status and tries to cancel it
    let status = harness.gate.status("imp_alice", &user(BOB)).await;
    let cancel = harness
        .gate
        .cancel(&CancelRequest::full("imp_alice", "not mine"), &user(BOB))
        .await;

    // Then: Both read as not found and nothing reached the processor...
    assert_eq!(status.expect_err("foreign").code(), "not_found");
    assert_eq!(cancel.expect_err("foreign").code(), "not_found");
    assert!(harness.processor.cancels().is_empty());

    // ...and Alice's receipt still buys her analysis
    let record = state
        .pipeline
        .run(&user(ALICE), receipt_request("AAPL", "imp_alice"))
        .await
        .expect("analysis");
    assert_eq!(record.symbol, "AAPL");
}

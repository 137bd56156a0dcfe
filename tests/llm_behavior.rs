//! Behavior-driven tests for model routing and response validation
//!
//! These tests verify how provider failures are contained and how model
//! output of any quality becomes a complete insight.

use std::time::Duration;

use stockinsight_ai::{parse_insight, LlmErrorKind, LlmProvider, LlmRouter};
use stockinsight_core::{CircuitBreakerConfig, Confidence, LlmVendor, Recommendation};
use stockinsight_tests::{Arc, ScriptedModel};

fn router(
    primary: &Arc<ScriptedModel>,
    fallback: &Arc<ScriptedModel>,
    breaker: CircuitBreakerConfig,
) -> LlmRouter {
    let providers: Vec<Arc<dyn LlmProvider>> = vec![primary.clone(), fallback.clone()];
    LlmRouter::new(LlmVendor::OpenAi, providers, breaker)
}

// =============================================================================
// Router: Failover
// =============================================================================

#[tokio::test]
async fn when_primary_fails_the_fallback_answers_once() {
    // Given: A failing primary and a healthy fallback
    let primary = Arc::new(ScriptedModel::new(
        LlmVendor::OpenAi,
        vec![Err(LlmErrorKind::ServerError)],
    ));
    let fallback = Arc::new(ScriptedModel::bullish(LlmVendor::Anthropic));
    let router = router(&primary, &fallback, CircuitBreakerConfig::default());

    // When: A completion is requested
    let completion = router.complete("system", "user").await.expect("fallback");

    // Then: Each provider was called exactly once and the fallback's model is reported
    assert_eq!(completion.vendor, LlmVendor::Anthropic);
    assert_eq!(completion.model, "claude-scripted");
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn when_both_providers_fail_there_is_no_second_round() {
    // Given: Two failing providers
    let primary = Arc::new(ScriptedModel::new(
        LlmVendor::OpenAi,
        vec![Err(LlmErrorKind::RateLimited)],
    ));
    let fallback = Arc::new(ScriptedModel::new(
        LlmVendor::Anthropic,
        vec![Err(LlmErrorKind::Network)],
    ));
    let router = router(&primary, &fallback, CircuitBreakerConfig::default());

    // When: A completion is requested
    let error = router.complete("system", "user").await.expect_err("both down");

    // Then: The last provider's error surfaces after one attempt each
    assert_eq!(error.vendor, LlmVendor::Anthropic);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn an_open_primary_circuit_is_skipped_until_recovery() {
    // Given: A breaker that opens after two failures
    let primary = Arc::new(ScriptedModel::new(
        LlmVendor::OpenAi,
        vec![Err(LlmErrorKind::ServerError), Err(LlmErrorKind::ServerError)],
    ));
    let fallback = Arc::new(ScriptedModel::bullish(LlmVendor::Anthropic));
    let router = router(
        &primary,
        &fallback,
        CircuitBreakerConfig::new(2, Duration::from_secs(300)),
    );

    // When: Enough calls fail on the primary to open its circuit
    router.complete("s", "u").await.expect("fallback");
    router.complete("s", "u").await.expect("fallback");
    let before = primary.calls();
    router.complete("s", "u").await.expect("fallback");

    // Then: The third call goes straight to the fallback
    assert_eq!(before, 2);
    assert_eq!(primary.calls(), 2);
    assert_eq!(fallback.calls(), 3);
    let status = router.status();
    assert_eq!(status[0].circuit, "open");
}

// =============================================================================
// Response Validator
// =============================================================================

#[test]
fn empty_and_non_json_output_yield_complete_defaults() {
    for raw in ["", "no json here", "{\"unrelated\": true}", "[1, 2, 3]"] {
        let fields = parse_insight(raw);
        assert_eq!(fields.recommendation, Recommendation::Hold, "input {raw:?}");
        assert_eq!(fields.risk_score, 5, "input {raw:?}");
        assert_eq!(fields.confidence, Confidence::Low, "input {raw:?}");
        assert!(!fields.deep_research.is_empty());
        assert!(!fields.recommendation_reason.is_empty());
    }
}

#[test]
fn risk_score_is_clamped_or_defaulted() {
    assert_eq!(parse_insight(r#"{"risk_score": 15}"#).risk_score, 10);
    assert_eq!(parse_insight(r#"{"risk_score": 0}"#).risk_score, 1);
    assert_eq!(parse_insight(r#"{"risk_score": "abc"}"#).risk_score, 5);
    assert_eq!(parse_insight(r#"{"risk_score": null}"#).risk_score, 5);
}

#[test]
fn unknown_recommendation_defaults_without_dropping_other_fields() {
    let fields = parse_insight(
        r#"{"recommendation": "maybe", "risk_score": 8, "confidence_level": "high",
            "key_summary": ["margin pressure", "new product cycle"]}"#,
    );

    assert_eq!(fields.recommendation, Recommendation::Hold);
    assert_eq!(fields.risk_score, 8);
    assert_eq!(fields.confidence, Confidence::High);
    assert_eq!(fields.key_summary.len(), 2);
}

#[test]
fn json_wrapped_in_prose_or_fences_is_still_read() {
    let fenced = "Here you go:\n```json\n{\"recommendation\": \"Strong Sell\"}\n```";
    assert_eq!(
        parse_insight(fenced).recommendation,
        Recommendation::StrongSell
    );
}

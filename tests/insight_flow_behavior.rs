//! Behavior-driven tests for the insight lifecycle over HTTP
//!
//! These tests drive the full router in-process: identity check, symbol
//! resolution, generation, persistence and user-scoped reads.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use stockinsight_tests::{Harness, ALICE, BOB};
use stockinsight_web::app;
use tower::ServiceExt;

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    user: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", user);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn analyze(app: &Router, user: &str, code: &str, timeframe: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/analysis/stock",
        user,
        Some(json!({"stock_code": code, "timeframe": timeframe})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "analysis of {code} failed: {body}");
    body
}

// =============================================================================
// Insight Flow: Creation
// =============================================================================

#[tokio::test]
async fn when_user_analyzes_a_domestic_code_it_is_stored_with_its_suffix() {
    // Given: A server with a populated market directory
    let harness = Harness::new(false);
    let app = app(harness.state());

    // When: The user asks for a bare six-digit code
    let created = analyze(&app, ALICE, "005930", "long").await;

    // Then: The stored insight uses the canonical KOSPI code
    assert_eq!(created["stock_code"], "005930.KS");
    assert_eq!(created["stock_name"], "Samsung Electronics");
    assert_eq!(created["recommendation"], "buy");

    let id = created["insight_id"].as_i64().expect("id");
    let (status, record) = call(&app, "GET", &format!("/api/analysis/{id}"), ALICE, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["market"], "KR");
    assert_eq!(record["timeframe"], "long");
    assert_eq!(record["confidence_level"], "high");
    assert_eq!(record["current_price"], 71_500.0);
    assert_eq!(record["ai_model"], "gpt-scripted");

    // And: The bare code finds it again as the latest analysis
    let (status, latest) =
        call(&app, "GET", "/api/analysis/latest?stock_code=005930", ALICE, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], id);
}

#[tokio::test]
async fn when_model_output_is_garbage_the_insight_still_has_every_field() {
    // Given: A model that answers with prose instead of JSON
    let model = stockinsight_tests::ScriptedModel::new(
        stockinsight_core::LlmVendor::OpenAi,
        vec![Ok("I think it will probably go up.")],
    );
    let harness = Harness::with_model(false, model);
    let app = app(harness.state());

    // When: An analysis runs
    let created = analyze(&app, ALICE, "AAPL", "short").await;

    // Then: Defaults fill every section
    let id = created["insight_id"].as_i64().expect("id");
    let (_, record) = call(&app, "GET", &format!("/api/analysis/{id}"), ALICE, None).await;
    assert_eq!(record["recommendation"], "hold");
    assert_eq!(record["risk_score"], 5);
    for section in [
        "risk_analysis",
        "market_overview",
        "sentiment_details",
        "current_drivers",
        "future_catalysts",
    ] {
        assert!(record[section].is_object(), "{section} should be populated");
    }
    assert!(record["key_summary"].is_array());
}

// =============================================================================
// Insight Flow: User Isolation
// =============================================================================

#[tokio::test]
async fn history_for_one_user_never_contains_another_users_records() {
    // Given: Two users with interleaved analyses
    let harness = Harness::new(false);
    let app = app(harness.state());
    for round in 0..3 {
        analyze(&app, ALICE, "AAPL", "mid").await;
        analyze(&app, BOB, "MSFT", "mid").await;
        if round % 2 == 0 {
            analyze(&app, BOB, "AAPL", "short").await;
        }
    }

    // When: Each user pages through their history with every window size
    for (user, expected_total) in [(ALICE, 3), (BOB, 5)] {
        for limit in 1..=4 {
            for skip in 0..=5 {
                let (status, page) = call(
                    &app,
                    "GET",
                    &format!("/api/analysis/history?limit={limit}&skip={skip}"),
                    user,
                    None,
                )
                .await;

                // Then: Only their own records appear, and the total is theirs
                assert_eq!(status, StatusCode::OK);
                assert_eq!(page["total"], expected_total);
                let items = page["items"].as_array().expect("items");
                assert!(items.len() <= limit);
                for item in items {
                    let id = item["id"].as_i64().expect("id");
                    let (status, record) =
                        call(&app, "GET", &format!("/api/analysis/{id}"), user, None).await;
                    assert_eq!(status, StatusCode::OK);
                    assert_eq!(record["user_id"], user);
                }
            }
        }
    }
}

#[tokio::test]
async fn latest_is_scoped_to_the_caller() {
    // Given: Only Bob has analyzed MSFT
    let harness = Harness::new(false);
    let app = app(harness.state());
    analyze(&app, BOB, "MSFT", "mid").await;

    // When: Alice asks for the latest MSFT analysis
    let (status, body) =
        call(&app, "GET", "/api/analysis/latest?stock_code=MSFT", ALICE, None).await;

    // Then: She sees nothing
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn history_can_be_filtered_by_symbol_newest_first() {
    // Given: Several analyses across symbols
    let harness = Harness::new(false);
    let app = app(harness.state());
    let first = analyze(&app, ALICE, "AAPL", "short").await;
    analyze(&app, ALICE, "MSFT", "short").await;
    let second = analyze(&app, ALICE, "AAPL", "long").await;

    // When: History is filtered to AAPL
    let (_, page) =
        call(&app, "GET", "/api/analysis/history?stock_code=AAPL", ALICE, None).await;

    // Then: Both AAPL runs appear, newest first
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["id"], second["insight_id"]);
    assert_eq!(page["items"][1]["id"], first["insight_id"]);
}

// =============================================================================
// Insight Flow: Rejections
// =============================================================================

#[tokio::test]
async fn malformed_identity_is_rejected_before_any_work() {
    // Given: A server
    let harness = Harness::new(false);
    let app = app(harness.state());

    // When: A request carries a v1 UUID instead of v4
    let (status, body) = call(
        &app,
        "POST",
        "/api/analysis/stock",
        "3f2b8c1e-9d4a-1f6b-8a2c-1e5d7f9b0c3a",
        Some(json!({"stock_code": "AAPL", "timeframe": "mid"})),
    )
    .await;

    // Then: It is rejected and nothing upstream was touched
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(harness.foreign_quotes.calls(), 0);
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn unknown_symbol_reports_not_found_without_calling_the_model() {
    // Given: A ticker no quote backend knows
    let harness = Harness::new(false);
    let app = app(harness.state());

    // When: It is analyzed
    let (status, body) = call(
        &app,
        "POST",
        "/api/analysis/stock",
        ALICE,
        Some(json!({"stock_code": "NOPE", "timeframe": "mid"})),
    )
    .await;

    // Then: Not found, and the model was never invoked
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(harness.model.calls(), 0);
}

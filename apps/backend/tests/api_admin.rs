//! Admin API tests for progress records.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use sqlx::PgPool;

use common::fixtures;
use common::TestContext;

/// Test moving a practicing card to review by hand.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_adjust_learning_record(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("adjust");
    let a = ctx.create_card("Pattern matching", &[]).await;
    ctx.add_question(a, "Is match exhaustive?").await;

    ctx.next(&username, "learning").await;
    ctx.complete("learning", &username, a).await;
    let record_id = ctx.learning_records(&username).await[0]["id"].as_i64().unwrap();

    let response = ctx
        .server
        .put(&format!("/api/learning-records/{record_id}"))
        .json(&json!({ "status": "mastered", "queue": "review", "practice_attempts": 4 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "mastered");
    assert_eq!(body["queue"], "review");
    assert_eq!(body["practice_attempts"], 4);
    assert!(body["next_review_at"].is_string());

    // The practice pointer went with the record.
    assert!(ctx.next(&username, "practice").await.is_null());
    let dashboard = ctx.dashboard(&username).await;
    assert_eq!(dashboard["queue_stats"]["review_queue"], 1);
    assert_eq!(dashboard["user_stats"]["total_mastered_cards"], 0);
}

/// Test invalid record edits are rejected.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_invalid_record_adjustment(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("invalid");
    let a = ctx.create_card("Modules", &[]).await;
    ctx.next(&username, "learning").await;
    let record_id = ctx.learning_records(&username).await[0]["id"].as_i64().unwrap();

    let response = ctx
        .server
        .put(&format!("/api/learning-records/{record_id}"))
        .json(&json!({ "queue": "review" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = ctx
        .server
        .put("/api/learning-records/999999")
        .json(&json!({ "review_count": 1 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let records = ctx.learning_records(&username).await;
    assert_eq!(records[0]["card_id"], json!(a));
    assert_eq!(records[0]["status"], "not_learned");
}

/// Test deleting a record puts the card back in front of the learner.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_delete_learning_record(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("reset");
    let a = ctx.create_card("Errors", &[]).await;
    ctx.add_question(a, "What does ? do?").await;

    ctx.next(&username, "learning").await;
    ctx.complete("learning", &username, a).await;
    let record_id = ctx.learning_records(&username).await[0]["id"].as_i64().unwrap();

    let response = ctx.server.delete(&format!("/api/learning-records/{record_id}")).await;
    response.assert_status(StatusCode::NO_CONTENT);

    assert!(ctx.learning_records(&username).await.as_array().unwrap().is_empty());
    assert!(ctx.next(&username, "practice").await.is_null());

    let card = ctx.next(&username, "learning").await;
    assert_eq!(card["id"], json!(a));
    assert_eq!(card["status"], "not_learned");

    let response = ctx.server.delete(&format!("/api/learning-records/{record_id}")).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

//! Scheduler API tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use common::fixtures;
use common::TestContext;

fn card_id(card: &Value) -> Uuid {
    card["id"].as_str().unwrap().parse().unwrap()
}

/// Test an empty catalog yields no card and registers the learner.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_next_with_no_cards(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("empty");

    let card = ctx.next(&username, "learning").await;
    assert!(card.is_null());

    let response = ctx.server.get("/api/users").await;
    response.assert_status_ok();
    let users: Value = response.json();
    assert_eq!(users[0]["username"], username.as_str());
}

/// Test learning, practice, mastery and a correct review.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_full_learning_cycle(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("cycle");
    let a = ctx.create_card("Ownership", &[]).await;
    let q1 = ctx.add_question(a, "Who owns a moved value?").await;
    let q2 = ctx.add_question(a, "When is a value dropped?").await;

    let card = ctx.next(&username, "learning").await;
    assert_eq!(card_id(&card), a);
    assert_eq!(card["status"], "not_learned");
    assert_eq!(card["queue"], "learning");
    assert_eq!(card["total_questions"], 2);

    // Polling again returns the same card.
    let again = ctx.next(&username, "learning").await;
    assert_eq!(card_id(&again), a);

    let body = ctx.complete("learning", &username, a).await;
    assert_eq!(body["outcome"], json!({ "status": "applied" }));
    assert_eq!(body["next_action"], "practice");
    assert_eq!(body["total_learned_cards"], 1);

    let card = ctx.next(&username, "practice").await;
    assert_eq!(card_id(&card), a);
    assert_eq!(card["status"], "learning");

    let answer = ctx.answer(&username, q1, true).await;
    assert_eq!(answer["attempt"], json!({ "status": "applied" }));

    // Only one of two questions answered: still practicing.
    let body = ctx.complete("practice", &username, a).await;
    assert_eq!(body["next_action"], "practice");
    assert_eq!(body["total_mastered_cards"], 0);

    ctx.answer(&username, q2, false).await;
    ctx.answer(&username, q2, true).await;
    let body = ctx.complete("practice", &username, a).await;
    assert_eq!(body["next_action"], "review");
    assert_eq!(body["total_mastered_cards"], 1);

    // Not due until tomorrow.
    assert!(ctx.next(&username, "review").await.is_null());

    let dashboard = ctx.dashboard(&username).await;
    assert_eq!(dashboard["queue_stats"]["review_queue"], 1);
    assert_eq!(dashboard["queue_stats"]["due_review"], 0);
    assert_eq!(dashboard["status_stats"]["mastered"], 1);

    let response = ctx
        .server
        .post("/api/scheduler/complete-review")
        .json(&fixtures::review_request(&username, a, true))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["next_action"], "review");

    let response = ctx
        .server
        .get("/api/learning-records")
        .add_query_param("username", &username)
        .await;
    response.assert_status_ok();
    let records: Value = response.json();
    assert_eq!(records[0]["card_title"], "Ownership");
    assert_eq!(records[0]["review_interval_days"], 2);
    assert_eq!(records[0]["review_count"], 1);
    assert_eq!(records[0]["total_attempts"], 3);
    assert_eq!(records[0]["practice_correct_count"], 2);
}

/// Test a failed review sends the card back to learning.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_failed_review_returns_to_learning(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("regress");
    let a = ctx.create_card("Lifetimes", &[]).await;

    ctx.next(&username, "learning").await;
    let body = ctx.complete("learning", &username, a).await;
    // No questions: mastered straight away.
    assert_eq!(body["next_action"], "review");

    let response = ctx
        .server
        .post("/api/scheduler/complete-review")
        .json(&fixtures::review_request(&username, a, false))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["next_action"], "learning");

    let card = ctx.next(&username, "learning").await;
    assert_eq!(card_id(&card), a);
    assert_eq!(card["status"], "learning");
    assert_eq!(card["queue"], "learning");
}

/// Test review correctness defaults to true.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_review_defaults_to_correct(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("default");
    let a = ctx.create_card("Traits", &[]).await;

    ctx.next(&username, "learning").await;
    ctx.complete("learning", &username, a).await;

    let body = ctx.complete("review", &username, a).await;
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["outcome"]["status"], "applied");
}

/// Test prerequisites gate the learning queue.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_prerequisites_unlock_after_mastery(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("gate");
    let basics = ctx.create_card("Basics", &[]).await;
    let q = ctx.add_question(basics, "What is a binding?").await;
    let advanced = ctx.create_card("Advanced", &[basics]).await;

    let card = ctx.next(&username, "learning").await;
    assert_eq!(card_id(&card), basics);
    ctx.complete("learning", &username, basics).await;

    assert!(ctx.next(&username, "learning").await.is_null());

    ctx.answer(&username, q, true).await;
    ctx.complete("practice", &username, basics).await;

    let card = ctx.next(&username, "learning").await;
    assert_eq!(card_id(&card), advanced);
    assert_eq!(card["prerequisites"], json!([basics]));
}

/// Test completing a phase out of order is reported as skipped.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_wrong_queue_completion_is_skipped(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("skip");
    let a = ctx.create_card("Closures", &[]).await;
    ctx.add_question(a, "What does move do?").await;
    ctx.next(&username, "learning").await;

    let body = ctx.complete("practice", &username, a).await;
    assert_eq!(
        body["outcome"],
        json!({
            "status": "skipped",
            "reason": { "kind": "wrong_queue", "expected": "practice", "actual": "learning" }
        })
    );
    assert_eq!(body["total_mastered_cards"], 0);

    let dashboard = ctx.dashboard(&username).await;
    assert_eq!(dashboard["status_stats"]["not_learned"], 1);
}

/// Test unknown learners, cards and records are 404s.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_not_found_errors(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("missing");
    let a = ctx.create_card("Macros", &[]).await;

    let response = ctx
        .server
        .post("/api/scheduler/complete-learning")
        .json(&fixtures::complete_request(&username, a))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "not_found");

    // Learner exists now, but has no record for an unknown card.
    ctx.next(&username, "review").await;
    let response = ctx
        .server
        .post("/api/scheduler/complete-learning")
        .json(&fixtures::complete_request(&username, Uuid::new_v4()))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    // Known card the learner never started.
    let response = ctx
        .server
        .post("/api/scheduler/complete-learning")
        .json(&fixtures::complete_request(&username, a))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = ctx
        .server
        .get("/api/scheduler/dashboard")
        .add_query_param("username", "nobody")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

/// Test daily goal validation and persistence.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_daily_goal(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("goal");
    ctx.next(&username, "learning").await;

    let dashboard = ctx.dashboard(&username).await;
    assert_eq!(dashboard["user_stats"]["daily_goal"], 5);

    let response = ctx
        .server
        .put("/api/scheduler/daily-goal")
        .json(&fixtures::daily_goal_request(&username, 0))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = ctx
        .server
        .put("/api/scheduler/daily-goal")
        .json(&fixtures::daily_goal_request(&username, 12))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["daily_goal"], 12);

    let dashboard = ctx.dashboard(&username).await;
    assert_eq!(dashboard["user_stats"]["daily_goal"], 12);
}

/// Test answers on untracked cards are stored but not counted.
#[sqlx::test]
#[ignore = "requires database"]
async fn test_answer_on_untracked_card(pool: PgPool) {
    let ctx = TestContext::new(pool);
    let username = fixtures::username("early");
    let a = ctx.create_card("Iterators", &[]).await;
    let q = ctx.add_question(a, "What does next return?").await;
    ctx.next(&username, "review").await;

    let body = ctx.answer(&username, q, true).await;
    assert_eq!(
        body["attempt"],
        json!({ "status": "skipped", "reason": { "kind": "not_tracked" } })
    );
    assert_eq!(body["card_id"], json!(a));
}

//! Common test utilities and fixtures for integration tests.
//!
//! Each test gets its own migrated database from `#[sqlx::test]`, so cards
//! created by one test never show up in another learner's queues.
//!
//! # Requirements
//! Integration tests require a PostgreSQL server the DATABASE_URL user can
//! create databases on.

pub mod fixtures;

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use learning_backend::db::Database;
use learning_backend::{router, AppState};

/// Test context wrapping a per-test database and the full router.
pub struct TestContext {
    pub db: Arc<Database>,
    pub server: TestServer,
}

impl TestContext {
    pub fn new(pool: PgPool) -> Self {
        let state = AppState::new(Database::from_pool(pool));
        let db = state.db.clone();
        let server = TestServer::new(router(state)).expect("Failed to start test server");

        Self { db, server }
    }

    /// Create a card through the API and return its id.
    pub async fn create_card(&self, title: &str, prerequisites: &[Uuid]) -> Uuid {
        let response = self
            .server
            .post("/api/cards")
            .json(&fixtures::create_card_request(title, prerequisites))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Add a question to a card and return its id.
    pub async fn add_question(&self, card_id: Uuid, content: &str) -> i64 {
        let response = self
            .server
            .post(&format!("/api/cards/{card_id}/questions"))
            .json(&fixtures::question_request(content))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        body["id"].as_i64().unwrap()
    }

    /// Ask the scheduler for the next card of `queue`.
    pub async fn next(&self, username: &str, queue: &str) -> Value {
        let response = self
            .server
            .post("/api/scheduler/next")
            .json(&fixtures::next_request(username, queue))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        body["card"].clone()
    }

    /// Complete a phase and return the response body.
    pub async fn complete(&self, phase: &str, username: &str, card_id: Uuid) -> Value {
        let response = self
            .server
            .post(&format!("/api/scheduler/complete-{phase}"))
            .json(&fixtures::complete_request(username, card_id))
            .await;
        response.assert_status_ok();
        response.json()
    }

    pub async fn answer(&self, username: &str, question_id: i64, is_correct: bool) -> Value {
        let response = self
            .server
            .post("/api/answers")
            .json(&fixtures::answer_request(username, question_id, is_correct))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    pub async fn dashboard(&self, username: &str) -> Value {
        let response = self
            .server
            .get("/api/scheduler/dashboard")
            .add_query_param("username", username)
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Admin listing of a learner's progress records.
    pub async fn learning_records(&self, username: &str) -> Value {
        let response = self
            .server
            .get("/api/learning-records")
            .add_query_param("username", username)
            .await;
        response.assert_status_ok();
        response.json()
    }
}

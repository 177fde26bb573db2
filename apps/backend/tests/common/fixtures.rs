//! Request bodies for integration tests.

use serde_json::json;
use uuid::Uuid;

pub fn create_card_request(title: &str, prerequisites: &[Uuid]) -> serde_json::Value {
    json!({
        "title": title,
        "content": format!("All about {title}."),
        "prerequisites": prerequisites,
    })
}

pub fn question_request(content: &str) -> serde_json::Value {
    json!({
        "content": content,
        "question_type": "short_answer",
        "correct_answer": "42",
    })
}

pub fn choice_question_request(content: &str, options: &[&str], position: i32) -> serde_json::Value {
    json!({
        "content": content,
        "question_type": "choice",
        "options": options,
        "correct_answer": options.first(),
        "position": position,
    })
}

pub fn next_request(username: &str, queue: &str) -> serde_json::Value {
    json!({ "username": username, "queue": queue })
}

pub fn complete_request(username: &str, card_id: Uuid) -> serde_json::Value {
    json!({ "username": username, "card_id": card_id })
}

pub fn review_request(username: &str, card_id: Uuid, is_correct: bool) -> serde_json::Value {
    json!({ "username": username, "card_id": card_id, "is_correct": is_correct })
}

pub fn answer_request(username: &str, question_id: i64, is_correct: bool) -> serde_json::Value {
    json!({
        "username": username,
        "question_id": question_id,
        "answer": if is_correct { "42" } else { "41" },
        "is_correct": is_correct,
    })
}

pub fn daily_goal_request(username: &str, daily_goal: i64) -> serde_json::Value {
    json!({ "username": username, "daily_goal": daily_goal })
}

pub fn prerequisites_request(prerequisites: &[Uuid]) -> serde_json::Value {
    json!({ "prerequisites": prerequisites })
}

/// Unique username so learners never collide.
pub fn username(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().to_string()[..8])
}

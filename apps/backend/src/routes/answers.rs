//! Answer submission

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::require_learner;
use crate::AppState;

/// POST /api/answers
///
/// Grading happens upstream; this stores the graded answer and counts the
/// attempt against the learner's progress on the question's card.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<SubmitAnswerResponse>)> {
    let learner = require_learner(&state, &request.username).await?;

    let question = state
        .db
        .get_question(request.question_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("question {}", request.question_id)))?;

    let answer_id = state
        .db
        .insert_answer(learner.id, question.id, &request.answer, request.is_correct)
        .await?;

    let attempt = state
        .scheduler
        .record_attempt(learner.id, question.card_id, request.is_correct, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitAnswerResponse {
            answer_id,
            card_id: question.card_id,
            is_correct: request.is_correct,
            attempt,
        }),
    ))
}

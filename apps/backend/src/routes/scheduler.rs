//! Scheduler endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use learning_core::{Card, ProgressStore, UserId};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::require_learner;
use crate::AppState;

/// POST /api/scheduler/next
pub async fn next(
    State(state): State<AppState>,
    Json(request): Json<NextCardRequest>,
) -> Result<Json<NextCardResponse>> {
    let learner = state.db.get_or_create_learner(&request.username).await?;

    let card = state
        .scheduler
        .next_card(learner.id, request.queue, Utc::now())
        .await?;

    let card = match card {
        Some(card) => Some(card_view(&state, learner.id, card).await?),
        None => None,
    };

    Ok(Json(NextCardResponse { card }))
}

/// Attach the learner's progress to a scheduled card.
async fn card_view(state: &AppState, user: UserId, card: Card) -> Result<CardView> {
    let store = state.scheduler.store();
    let record = store
        .find_record(user, card.id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("card {} was scheduled without a progress record", card.id)))?;

    Ok(CardView {
        total_questions: store.count_questions(card.id).await?,
        correct_answers: store.count_correct_answers(user, card.id).await?,
        status: record.status(),
        queue: record.queue(),
        id: card.id,
        title: card.title,
        content: card.content,
        prerequisites: card.prerequisites,
    })
}

/// POST /api/scheduler/complete-learning
pub async fn complete_learning(
    State(state): State<AppState>,
    Json(request): Json<CompleteCardRequest>,
) -> Result<Json<CompleteLearningResponse>> {
    let learner = require_learner(&state, &request.username).await?;

    let completion = state
        .scheduler
        .complete_learning(learner.id, request.card_id, Utc::now())
        .await?;

    Ok(Json(CompleteLearningResponse {
        outcome: completion.outcome,
        next_action: completion.next_action,
        total_learned_cards: completion.total_learned_cards,
    }))
}

/// POST /api/scheduler/complete-practice
pub async fn complete_practice(
    State(state): State<AppState>,
    Json(request): Json<CompleteCardRequest>,
) -> Result<Json<CompletePracticeResponse>> {
    let learner = require_learner(&state, &request.username).await?;

    let completion = state
        .scheduler
        .complete_practice(learner.id, request.card_id, Utc::now())
        .await?;

    Ok(Json(CompletePracticeResponse {
        outcome: completion.outcome,
        next_action: completion.next_action,
        total_mastered_cards: completion.total_mastered_cards,
    }))
}

/// POST /api/scheduler/complete-review
pub async fn complete_review(
    State(state): State<AppState>,
    Json(request): Json<CompleteReviewRequest>,
) -> Result<Json<CompleteReviewResponse>> {
    let learner = require_learner(&state, &request.username).await?;

    let completion = state
        .scheduler
        .complete_review(learner.id, request.card_id, request.is_correct, Utc::now())
        .await?;

    Ok(Json(CompleteReviewResponse {
        outcome: completion.outcome,
        is_correct: request.is_correct,
        next_action: completion.next_action,
    }))
}

/// GET /api/scheduler/dashboard?username=
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Dashboard>> {
    let learner = require_learner(&state, &query.username).await?;
    let dashboard = state.scheduler.dashboard(learner.id, Utc::now()).await?;
    Ok(Json(dashboard))
}

/// PUT /api/scheduler/daily-goal
pub async fn set_daily_goal(
    State(state): State<AppState>,
    Json(request): Json<DailyGoalRequest>,
) -> Result<Json<DailyGoalResponse>> {
    let learner = require_learner(&state, &request.username).await?;

    let scheduler_state = state
        .scheduler
        .set_daily_goal(learner.id, request.daily_goal, Utc::now())
        .await?;

    Ok(Json(DailyGoalResponse {
        daily_goal: scheduler_state.daily_goal,
    }))
}

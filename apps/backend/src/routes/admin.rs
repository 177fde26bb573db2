//! Administration endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::AppState;

/// GET /api/learning-records?username=
pub async fn learning_records(
    State(state): State<AppState>,
    Query(query): Query<LearningRecordsQuery>,
) -> Result<Json<Vec<LearningRecordRow>>> {
    let records = state
        .db
        .list_learning_records(query.username.as_deref())
        .await?;
    Ok(Json(records))
}

/// PUT /api/learning-records/:id
///
/// Goes through the scheduler so the learner's cached cards stay consistent.
pub async fn update_learning_record(
    State(state): State<AppState>,
    Path(record_id): Path<i64>,
    Json(adjustment): Json<RecordAdjustment>,
) -> Result<Json<LearningRecordRow>> {
    let row = find_learning_record(&state, record_id).await?;

    state
        .scheduler
        .adjust_record(row.record.learner_id, row.record.card_id, &adjustment, Utc::now())
        .await?;

    Ok(Json(find_learning_record(&state, record_id).await?))
}

/// DELETE /api/learning-records/:id
pub async fn delete_learning_record(
    State(state): State<AppState>,
    Path(record_id): Path<i64>,
) -> Result<StatusCode> {
    let row = find_learning_record(&state, record_id).await?;

    state
        .scheduler
        .remove_record(row.record.learner_id, row.record.card_id, Utc::now())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users
pub async fn users(State(state): State<AppState>) -> Result<Json<Vec<Learner>>> {
    Ok(Json(state.db.list_learners().await?))
}

async fn find_learning_record(state: &AppState, record_id: i64) -> Result<LearningRecordRow> {
    state
        .db
        .get_learning_record(record_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("learning record {record_id}")))
}

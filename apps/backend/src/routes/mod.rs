//! HTTP handlers

pub mod admin;
pub mod answers;
pub mod cards;
pub mod scheduler;

use crate::error::{ApiError, Result};
use crate::models::Learner;
use crate::AppState;

/// Look up a learner that must already exist.
pub(crate) async fn require_learner(state: &AppState, username: &str) -> Result<Learner> {
    state
        .db
        .find_learner(username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("learner {username}")))
}

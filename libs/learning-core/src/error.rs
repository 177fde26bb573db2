//! Error types for learning-core.

use thiserror::Error;

use crate::types::{CardId, UserId};

/// Result type alias using SchedulerError.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("card not found: {0}")]
    CardNotFound(CardId),

    #[error("no progress record for card {card} of user {user}")]
    RecordNotFound { user: UserId, card: CardId },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Opaque failure reported by a storage backend.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreError(Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wrap any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(err.into())
    }
}

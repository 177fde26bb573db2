//! Storage contract consumed by the scheduler.
//!
//! The scheduler never persists anything on its own; every read and write
//! goes through a [`ProgressStore`]. Implementations decide how records are
//! kept (PostgreSQL in the backend, [`crate::MemoryStore`] in tests).

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    Card, CardId, Placement, ProgressRecord, ProgressStatus, QueueKind, SchedulerState, UserId,
};

/// Result type alias for storage calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sort order for record queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// Ascending record id.
    #[default]
    Created,
    /// Earliest `next_review_at` first, then ascending record id.
    DueDate,
}

/// Filter for progress record queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub user: Option<UserId>,
    pub queue: Option<QueueKind>,
    /// Empty means any status.
    pub statuses: Vec<ProgressStatus>,
    /// Only records with `next_review_at <= due_before`.
    pub due_before: Option<DateTime<Utc>>,
    pub order: RecordOrder,
}

impl RecordFilter {
    pub fn for_user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Default::default()
        }
    }

    pub fn in_queue(mut self, queue: QueueKind) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_status(mut self, status: ProgressStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn due_before(mut self, at: DateTime<Utc>) -> Self {
        self.due_before = Some(at);
        self
    }

    pub fn ordered_by(mut self, order: RecordOrder) -> Self {
        self.order = order;
        self
    }

    /// Check a single record against the filter (ordering aside).
    pub fn matches(&self, record: &ProgressRecord) -> bool {
        self.user.map_or(true, |user| record.user_id == user)
            && self.queue.map_or(true, |queue| record.queue() == queue)
            && (self.statuses.is_empty() || self.statuses.contains(&record.status()))
            && self.due_before.map_or(true, |at| record.is_due(at))
    }
}

/// Persistence collaborator for the scheduler.
///
/// Every method may fail with an opaque [`StoreError`]; the scheduler
/// propagates it without retrying.
pub trait ProgressStore: Send + Sync {
    fn find_card(&self, id: CardId) -> impl Future<Output = StoreResult<Option<Card>>> + Send;

    /// Cards the user has no progress record for, oldest first.
    fn untracked_cards(&self, user: UserId) -> impl Future<Output = StoreResult<Vec<Card>>> + Send;

    fn find_record(
        &self,
        user: UserId,
        card: CardId,
    ) -> impl Future<Output = StoreResult<Option<ProgressRecord>>> + Send;

    /// Create the record for (user, card). If one already exists it is
    /// returned unchanged, keeping the pair unique.
    fn create_record(
        &self,
        user: UserId,
        card: CardId,
        placement: Placement,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<ProgressRecord>> + Send;

    fn query_records(
        &self,
        filter: &RecordFilter,
    ) -> impl Future<Output = StoreResult<Vec<ProgressRecord>>> + Send;

    fn count_records(&self, filter: &RecordFilter) -> impl Future<Output = StoreResult<u64>> + Send;

    fn save_record(&self, record: &ProgressRecord) -> impl Future<Output = StoreResult<()>> + Send;

    fn count_questions(&self, card: CardId) -> impl Future<Output = StoreResult<u32>> + Send;

    /// Distinct questions of `card` the user has answered correctly at least once.
    fn count_correct_answers(
        &self,
        user: UserId,
        card: CardId,
    ) -> impl Future<Output = StoreResult<u32>> + Send;

    fn find_state(
        &self,
        user: UserId,
    ) -> impl Future<Output = StoreResult<Option<SchedulerState>>> + Send;

    fn save_state(&self, state: &SchedulerState) -> impl Future<Output = StoreResult<()>> + Send;

    /// Persist a record and its owner's scheduler state together. Either
    /// both writes land or neither does.
    fn save_progress(
        &self,
        record: &ProgressRecord,
        state: &SchedulerState,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete a record and save its owner's scheduler state together.
    fn delete_progress(
        &self,
        record: &ProgressRecord,
        state: &SchedulerState,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

//! Core learning scheduler shared by the backend and its tests.
//!
//! Provides:
//! - Shared types (Card, Question, ProgressRecord, SchedulerState, etc.)
//! - Content graph unlock predicate and prerequisite cycle detection
//! - Mastery evaluation from question/answer counts
//! - The three-queue scheduler (learning, practice, review)
//! - The storage contract the scheduler consumes, plus an in-memory store

pub mod error;
pub mod graph;
pub mod locks;
pub mod mastery;
pub mod memory;
pub mod scheduler;
pub mod store;
pub mod types;

pub use error::{Result, SchedulerError, StoreError};
pub use graph::{find_cycle, is_unlocked};
pub use mastery::is_card_mastered;
pub use memory::MemoryStore;
pub use scheduler::Scheduler;
pub use store::{ProgressStore, RecordFilter, RecordOrder, StoreResult};
pub use types::{
    Card, CardId, Completion, CompletionOutcome, Dashboard, Placement, ProgressRecord,
    ProgressStatus, Question, QuestionType, QueueKind, QueueStats, RecordAdjustment,
    RecordSnapshot, SchedulerState, SkipReason, StatusStats, UserId, UserStats,
};

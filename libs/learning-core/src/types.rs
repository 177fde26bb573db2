//! Core types for the learning scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

pub type CardId = Uuid;
pub type UserId = Uuid;

/// Review interval assigned to a freshly mastered card.
pub const INITIAL_REVIEW_INTERVAL_DAYS: u32 = 1;

/// Ceiling for the doubling review interval.
pub const MAX_REVIEW_INTERVAL_DAYS: u32 = 180;

/// Daily goal given to a new scheduler state.
pub const DEFAULT_DAILY_GOAL: u32 = 5;

/// Mastery status of one card for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotLearned,
    Learning,
    Mastered,
}

impl ProgressStatus {
    /// Get the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLearned => "not_learned",
            Self::Learning => "learning",
            Self::Mastered => "mastered",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_learned" => Some(Self::NotLearned),
            "learning" => Some(Self::Learning),
            "mastered" => Some(Self::Mastered),
            _ => None,
        }
    }
}

/// Pipeline stage that currently owns a card for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Learning,
    Practice,
    Review,
}

impl QueueKind {
    /// Get the queue name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Practice => "practice",
            Self::Review => "review",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "learning" => Some(Self::Learning),
            "practice" => Some(Self::Practice),
            "review" => Some(Self::Review),
            _ => None,
        }
    }
}

/// Kind of question attached to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Choice,
    ShortAnswer,
    Code,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Choice => "choice",
            Self::ShortAnswer => "short_answer",
            Self::Code => "code",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "choice" => Some(Self::Choice),
            "short_answer" => Some(Self::ShortAnswer),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Unit of learning content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    pub content: String,
    /// Cards that must be mastered before this one unlocks.
    pub prerequisites: Vec<CardId>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Create a card with a fresh id and no prerequisites.
    pub fn new(title: impl Into<String>, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            prerequisites: Vec::new(),
            created_at,
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<CardId>) -> Self {
        self.prerequisites = prerequisites;
        self
    }
}

/// Question attached to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub card_id: CardId,
    pub content: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    /// Browsing order within the card.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A (status, queue) pair that a progress record may occupy.
///
/// Only four pairs are reachable:
/// - not learned, in the learning queue (first exposure pending)
/// - learning, in the learning queue (sent back after a failed review)
/// - learning, in the practice queue
/// - mastered, in the review queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    status: ProgressStatus,
    queue: QueueKind,
}

impl Placement {
    pub const UNSEEN: Placement = Placement {
        status: ProgressStatus::NotLearned,
        queue: QueueKind::Learning,
    };
    pub const RELEARNING: Placement = Placement {
        status: ProgressStatus::Learning,
        queue: QueueKind::Learning,
    };
    pub const PRACTICING: Placement = Placement {
        status: ProgressStatus::Learning,
        queue: QueueKind::Practice,
    };
    pub const REVIEWING: Placement = Placement {
        status: ProgressStatus::Mastered,
        queue: QueueKind::Review,
    };

    /// Validate a (status, queue) pair.
    pub fn new(status: ProgressStatus, queue: QueueKind) -> Result<Self> {
        use ProgressStatus::*;
        use QueueKind as Q;

        match (status, queue) {
            (NotLearned, Q::Learning)
            | (Learning, Q::Learning)
            | (Learning, Q::Practice)
            | (Mastered, Q::Review) => Ok(Self { status, queue }),
            _ => Err(SchedulerError::Validation(format!(
                "status {} cannot sit in the {} queue",
                status.as_str(),
                queue.as_str()
            ))),
        }
    }

    pub fn status(self) -> ProgressStatus {
        self.status
    }

    pub fn queue(self) -> QueueKind {
        self.queue
    }
}

/// Per (user, card) progress.
///
/// Status, queue, mastery time and review due date only change through the
/// transition methods, so `queue == Review`, `status == Mastered` and
/// `next_review_at.is_some()` always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    /// Store-assigned, increasing with creation order.
    pub id: i64,
    pub user_id: UserId,
    pub card_id: CardId,
    placement: Placement,
    pub first_learned_at: Option<DateTime<Utc>>,
    mastered_at: Option<DateTime<Utc>>,
    pub review_count: u32,
    review_interval_days: u32,
    next_review_at: Option<DateTime<Utc>>,
    pub practice_attempts: u32,
    pub practice_correct_count: u32,
    pub total_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Flat, unvalidated view of a progress record for storage backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub id: i64,
    pub user_id: UserId,
    pub card_id: CardId,
    pub status: ProgressStatus,
    pub queue: QueueKind,
    pub first_learned_at: Option<DateTime<Utc>>,
    pub mastered_at: Option<DateTime<Utc>>,
    pub review_count: u32,
    pub review_interval_days: u32,
    pub next_review_at: Option<DateTime<Utc>>,
    pub practice_attempts: u32,
    pub practice_correct_count: u32,
    pub total_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Create a fresh record. Records enter review only by being mastered,
    /// so `Placement::REVIEWING` is rejected here.
    pub fn new(
        id: i64,
        user_id: UserId,
        card_id: CardId,
        placement: Placement,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if placement == Placement::REVIEWING {
            return Err(SchedulerError::Validation(
                "a new progress record cannot start in the review queue".to_string(),
            ));
        }

        Ok(Self {
            id,
            user_id,
            card_id,
            placement,
            first_learned_at: None,
            mastered_at: None,
            review_count: 0,
            review_interval_days: INITIAL_REVIEW_INTERVAL_DAYS,
            next_review_at: None,
            practice_attempts: 0,
            practice_correct_count: 0,
            total_attempts: 0,
            created_at: now,
            last_accessed_at: now,
        })
    }

    /// Rebuild a record from stored fields, rejecting inconsistent rows.
    pub fn from_snapshot(snapshot: RecordSnapshot) -> Result<Self> {
        let placement = Placement::new(snapshot.status, snapshot.queue)?;
        let mastered = snapshot.status == ProgressStatus::Mastered;

        if mastered != snapshot.next_review_at.is_some() {
            return Err(SchedulerError::Validation(format!(
                "record {} has status {} but next_review_at is {}",
                snapshot.id,
                snapshot.status.as_str(),
                if snapshot.next_review_at.is_some() { "set" } else { "empty" }
            )));
        }
        if mastered != snapshot.mastered_at.is_some() {
            return Err(SchedulerError::Validation(format!(
                "record {} has status {} but mastered_at is {}",
                snapshot.id,
                snapshot.status.as_str(),
                if snapshot.mastered_at.is_some() { "set" } else { "empty" }
            )));
        }
        if !(INITIAL_REVIEW_INTERVAL_DAYS..=MAX_REVIEW_INTERVAL_DAYS)
            .contains(&snapshot.review_interval_days)
        {
            return Err(SchedulerError::Validation(format!(
                "record {} has review interval {} outside 1..=180 days",
                snapshot.id, snapshot.review_interval_days
            )));
        }

        Ok(Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            card_id: snapshot.card_id,
            placement,
            first_learned_at: snapshot.first_learned_at,
            mastered_at: snapshot.mastered_at,
            review_count: snapshot.review_count,
            review_interval_days: snapshot.review_interval_days,
            next_review_at: snapshot.next_review_at,
            practice_attempts: snapshot.practice_attempts,
            practice_correct_count: snapshot.practice_correct_count,
            total_attempts: snapshot.total_attempts,
            created_at: snapshot.created_at,
            last_accessed_at: snapshot.last_accessed_at,
        })
    }

    /// Flatten for persistence.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            id: self.id,
            user_id: self.user_id,
            card_id: self.card_id,
            status: self.status(),
            queue: self.queue(),
            first_learned_at: self.first_learned_at,
            mastered_at: self.mastered_at,
            review_count: self.review_count,
            review_interval_days: self.review_interval_days,
            next_review_at: self.next_review_at,
            practice_attempts: self.practice_attempts,
            practice_correct_count: self.practice_correct_count,
            total_attempts: self.total_attempts,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn status(&self) -> ProgressStatus {
        self.placement.status()
    }

    pub fn queue(&self) -> QueueKind {
        self.placement.queue()
    }

    pub fn mastered_at(&self) -> Option<DateTime<Utc>> {
        self.mastered_at
    }

    pub fn next_review_at(&self) -> Option<DateTime<Utc>> {
        self.next_review_at
    }

    pub fn review_interval_days(&self) -> u32 {
        self.review_interval_days
    }

    /// Whether the card is in review and its due date has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|due| due <= now)
    }

    /// First exposure finished. Content-only cards are mastered on the spot.
    pub(crate) fn complete_learning(&mut self, question_count: u32, now: DateTime<Utc>) {
        if self.status() == ProgressStatus::NotLearned {
            self.first_learned_at = Some(now);
        }

        if question_count == 0 {
            self.master(now);
        } else {
            self.placement = Placement::PRACTICING;
        }
    }

    pub(crate) fn master(&mut self, now: DateTime<Utc>) {
        self.placement = Placement::REVIEWING;
        self.mastered_at = Some(now);
        self.next_review_at = Some(now + Duration::days(i64::from(self.review_interval_days)));
    }

    pub(crate) fn complete_review(&mut self, is_correct: bool, now: DateTime<Utc>) {
        self.review_count += 1;

        if is_correct {
            self.review_interval_days = (self.review_interval_days * 2).min(MAX_REVIEW_INTERVAL_DAYS);
            self.next_review_at = Some(now + Duration::days(i64::from(self.review_interval_days)));
        } else {
            self.placement = Placement::RELEARNING;
            self.mastered_at = None;
            self.next_review_at = None;
            self.review_interval_days = INITIAL_REVIEW_INTERVAL_DAYS;
        }
    }

    pub(crate) fn record_attempt(&mut self, is_correct: bool) {
        self.total_attempts += 1;
        if self.queue() == QueueKind::Practice {
            self.practice_attempts += 1;
            if is_correct {
                self.practice_correct_count += 1;
            }
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    /// Apply an administrative edit. Nothing changes if the edit is invalid.
    pub(crate) fn adjust(&mut self, adjustment: &RecordAdjustment, now: DateTime<Utc>) -> Result<()> {
        let placement = Placement::new(
            adjustment.status.unwrap_or(self.status()),
            adjustment.queue.unwrap_or(self.queue()),
        )?;
        let practice_attempts = adjustment.practice_attempts.unwrap_or(self.practice_attempts);
        let practice_correct_count = adjustment
            .practice_correct_count
            .unwrap_or(self.practice_correct_count);

        if practice_correct_count > practice_attempts {
            return Err(SchedulerError::Validation(format!(
                "practice_correct_count {practice_correct_count} exceeds practice_attempts {practice_attempts}"
            )));
        }

        self.relocate(placement, now);
        if let Some(review_count) = adjustment.review_count {
            self.review_count = review_count;
        }
        self.practice_attempts = practice_attempts;
        self.practice_correct_count = practice_correct_count;
        Ok(())
    }

    /// Entering review stamps mastery and a due date; leaving it clears both
    /// and resets the interval.
    fn relocate(&mut self, placement: Placement, now: DateTime<Utc>) {
        if placement == self.placement {
            return;
        }
        if placement.status() != ProgressStatus::NotLearned {
            self.first_learned_at.get_or_insert(now);
        }

        if placement == Placement::REVIEWING {
            self.master(now);
            return;
        }
        if self.placement == Placement::REVIEWING {
            self.review_interval_days = INITIAL_REVIEW_INTERVAL_DAYS;
        }
        self.placement = placement;
        self.mastered_at = None;
        self.next_review_at = None;
    }
}

/// Hand edit of a progress record. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAdjustment {
    pub status: Option<ProgressStatus>,
    pub queue: Option<QueueKind>,
    pub review_count: Option<u32>,
    pub practice_attempts: Option<u32>,
    pub practice_correct_count: Option<u32>,
}

/// Per-user scheduler singleton.
///
/// The current-card fields are identifiers only; the scheduler re-reads the
/// record behind them before trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub user_id: UserId,
    pub current_learning_card: Option<CardId>,
    pub current_practice_card: Option<CardId>,
    pub total_learned_cards: u32,
    pub total_mastered_cards: u32,
    pub daily_goal: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchedulerState {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_learning_card: None,
            current_practice_card: None,
            total_learned_cards: 0,
            total_mastered_cards: 0,
            daily_goal: DEFAULT_DAILY_GOAL,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check a requested daily goal; it must be a positive count.
    pub fn validate_daily_goal(goal: i64) -> Result<u32> {
        match u32::try_from(goal) {
            Ok(goal) if goal > 0 => Ok(goal),
            _ => Err(SchedulerError::Validation(format!(
                "daily goal must be a positive number, got {goal}"
            ))),
        }
    }
}

/// Why a completion call left the record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The record is not in the queue the completion belongs to.
    WrongQueue { expected: QueueKind, actual: QueueKind },
    /// The user has no progress record for the card.
    NotTracked,
}

/// Result of applying a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Applied,
    Skipped { reason: SkipReason },
}

impl CompletionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// What a completion call reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub outcome: CompletionOutcome,
    /// Queue the learner should visit next.
    pub next_action: QueueKind,
    pub total_learned_cards: u32,
    pub total_mastered_cards: u32,
}

impl Completion {
    pub(crate) fn new(outcome: CompletionOutcome, next_action: QueueKind, state: &SchedulerState) -> Self {
        Self {
            outcome,
            next_action,
            total_learned_cards: state.total_learned_cards,
            total_mastered_cards: state.total_mastered_cards,
        }
    }
}

/// Aggregate counters kept on the scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_learned_cards: u32,
    pub total_mastered_cards: u32,
    pub daily_goal: u32,
}

/// Record counts per queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub learning_queue: u64,
    pub practice_queue: u64,
    pub review_queue: u64,
    pub due_review: u64,
}

/// Record counts per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusStats {
    pub not_learned: u64,
    pub learning: u64,
    pub mastered: u64,
}

/// Learner overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub user_stats: UserStats,
    pub queue_stats: QueueStats,
    pub status_stats: StatusStats,
}

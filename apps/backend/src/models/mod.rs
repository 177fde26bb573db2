//! Database models and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub use learning_core::{
    Card, CompletionOutcome, Dashboard, ProgressRecord, ProgressStatus, Question, QuestionType,
    QueueKind, RecordAdjustment, RecordSnapshot, SchedulerError, SchedulerState,
};

// === Database Entity Types ===

/// Learner identified by username
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Learner {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Card stored in PostgreSQL, with its prerequisite ids aggregated
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbCard {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub prerequisites: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbCard {
    /// Convert to learning-core Card
    pub fn to_core_card(&self) -> Card {
        Card {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            prerequisites: self.prerequisites.clone(),
            created_at: self.created_at,
        }
    }
}

/// Question stored in PostgreSQL
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbQuestion {
    pub id: i64,
    pub card_id: Uuid,
    pub content: String,
    pub question_type: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl DbQuestion {
    /// Convert to learning-core Question
    pub fn to_core_question(&self) -> Question {
        Question {
            id: self.id,
            card_id: self.card_id,
            content: self.content.clone(),
            question_type: QuestionType::parse(&self.question_type).unwrap_or(QuestionType::ShortAnswer),
            options: self.options.clone(),
            correct_answer: self.correct_answer.clone(),
            position: self.position,
            created_at: self.created_at,
        }
    }
}

/// Progress record row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbProgressRecord {
    pub id: i64,
    pub learner_id: Uuid,
    pub card_id: Uuid,
    pub status: String,
    pub queue: String,
    pub first_learned_at: Option<DateTime<Utc>>,
    pub mastered_at: Option<DateTime<Utc>>,
    pub review_count: i32,
    pub review_interval_days: i32,
    pub next_review_at: Option<DateTime<Utc>>,
    pub practice_attempts: i32,
    pub practice_correct_count: i32,
    pub total_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl DbProgressRecord {
    /// Convert to learning-core ProgressRecord, rejecting rows in an impossible state
    pub fn to_core_record(&self) -> Result<ProgressRecord, SchedulerError> {
        let status = ProgressStatus::parse(&self.status).ok_or_else(|| {
            SchedulerError::Validation(format!("record {} has unknown status {}", self.id, self.status))
        })?;
        let queue = QueueKind::parse(&self.queue).ok_or_else(|| {
            SchedulerError::Validation(format!("record {} has unknown queue {}", self.id, self.queue))
        })?;

        ProgressRecord::from_snapshot(RecordSnapshot {
            id: self.id,
            user_id: self.learner_id,
            card_id: self.card_id,
            status,
            queue,
            first_learned_at: self.first_learned_at,
            mastered_at: self.mastered_at,
            review_count: self.review_count as u32,
            review_interval_days: self.review_interval_days as u32,
            next_review_at: self.next_review_at,
            practice_attempts: self.practice_attempts as u32,
            practice_correct_count: self.practice_correct_count as u32,
            total_attempts: self.total_attempts as u32,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        })
    }
}

/// Scheduler state row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbSchedulerState {
    pub learner_id: Uuid,
    pub current_learning_card: Option<Uuid>,
    pub current_practice_card: Option<Uuid>,
    pub total_learned_cards: i32,
    pub total_mastered_cards: i32,
    pub daily_goal: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbSchedulerState {
    pub fn to_core_state(&self) -> SchedulerState {
        SchedulerState {
            user_id: self.learner_id,
            current_learning_card: self.current_learning_card,
            current_practice_card: self.current_practice_card,
            total_learned_cards: self.total_learned_cards as u32,
            total_mastered_cards: self.total_mastered_cards as u32,
            daily_goal: self.daily_goal as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Progress record joined with its learner and card, for admin listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LearningRecordRow {
    pub username: String,
    pub card_title: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: DbProgressRecord,
}

/// Node and edge counts for the dependency view
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DependencyNode {
    pub id: Uuid,
    pub title: String,
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEdge {
    /// The prerequisite
    pub from: Uuid,
    /// The card that depends on it
    pub to: Uuid,
}

// === API Request/Response Types ===

fn default_true() -> bool {
    true
}

fn default_question_type() -> QuestionType {
    QuestionType::ShortAnswer
}

/// Request for the next card of a queue
#[derive(Debug, Clone, Deserialize)]
pub struct NextCardRequest {
    pub username: String,
    pub queue: QueueKind,
}

/// Card as presented to a learner, with their progress on it
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub status: ProgressStatus,
    pub queue: QueueKind,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub prerequisites: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextCardResponse {
    pub card: Option<CardView>,
}

/// Request body for complete-learning and complete-practice
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteCardRequest {
    pub username: String,
    pub card_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteReviewRequest {
    pub username: String,
    pub card_id: Uuid,
    #[serde(default = "default_true")]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteLearningResponse {
    pub outcome: CompletionOutcome,
    pub next_action: QueueKind,
    pub total_learned_cards: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletePracticeResponse {
    pub outcome: CompletionOutcome,
    pub next_action: QueueKind,
    pub total_mastered_cards: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteReviewResponse {
    pub outcome: CompletionOutcome,
    pub is_correct: bool,
    pub next_action: QueueKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearningRecordsQuery {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyGoalRequest {
    pub username: String,
    pub daily_goal: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyGoalResponse {
    pub daily_goal: u32,
}

/// Body for creating a card or replacing its title, content and prerequisites
#[derive(Debug, Clone, Deserialize)]
pub struct CardRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub prerequisites: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPrerequisitesRequest {
    pub prerequisites: Vec<Uuid>,
}

/// Card with its questions in display order
#[derive(Debug, Clone, Serialize)]
pub struct CardDetailResponse {
    #[serde(flatten)]
    pub card: Card,
    pub questions: Vec<Question>,
}

/// Body for adding or editing a question
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    pub content: String,
    #[serde(default = "default_question_type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    /// Appended after the card's last question when absent (kept as is on edit)
    pub position: Option<i32>,
}

/// Step through a card's questions by position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    First,
    Next,
    Prev,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationQuery {
    pub direction: NavDirection,
    /// Question to step from; required for `next` and `prev`
    pub question_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraphResponse {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
}

/// A graded answer; grading happens outside this service
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    pub username: String,
    pub question_id: i64,
    #[serde(default)]
    pub answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswerResponse {
    pub answer_id: i64,
    pub card_id: Uuid,
    pub is_correct: bool,
    pub attempt: CompletionOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn row(status: &str, queue: &str, next_review_at: Option<DateTime<Utc>>) -> DbProgressRecord {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        DbProgressRecord {
            id: 7,
            learner_id: Uuid::new_v4(),
            card_id: Uuid::new_v4(),
            status: status.to_string(),
            queue: queue.to_string(),
            first_learned_at: Some(now),
            mastered_at: next_review_at.map(|_| now),
            review_count: 2,
            review_interval_days: 4,
            next_review_at,
            practice_attempts: 3,
            practice_correct_count: 2,
            total_attempts: 5,
            created_at: now,
            last_accessed_at: now,
        }
    }

    #[test]
    fn test_mastered_row_converts() {
        let due = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        let record = row("mastered", "review", Some(due)).to_core_record().unwrap();

        assert_eq!(record.status(), ProgressStatus::Mastered);
        assert_eq!(record.queue(), QueueKind::Review);
        assert_eq!(record.review_interval_days(), 4);
        assert_eq!(record.next_review_at(), Some(due));
        assert_eq!(record.total_attempts, 5);
    }

    #[test]
    fn test_impossible_pair_is_rejected() {
        let err = row("not_learned", "review", None).to_core_record().unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = row("archived", "learning", None).to_core_record().unwrap_err();
        assert!(err.to_string().contains("unknown status archived"));
    }

    #[test]
    fn test_complete_review_defaults_to_correct() {
        let request: CompleteReviewRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "card_id": Uuid::nil(),
        }))
        .unwrap();
        assert!(request.is_correct);
    }

    #[test]
    fn test_record_adjustment_fields_are_optional() {
        let adjustment: RecordAdjustment =
            serde_json::from_value(serde_json::json!({ "queue": "practice", "review_count": 0 })).unwrap();
        assert_eq!(
            adjustment,
            RecordAdjustment {
                queue: Some(QueueKind::Practice),
                review_count: Some(0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_question_type_defaults_to_short_answer() {
        let request: QuestionRequest =
            serde_json::from_value(serde_json::json!({ "content": "What is 2 + 2?" })).unwrap();
        assert_eq!(request.question_type, QuestionType::ShortAnswer);
        assert_eq!(request.position, None);
    }
}

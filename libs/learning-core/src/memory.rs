//! In-memory [`ProgressStore`].
//!
//! Holds cards, questions, answers, records and scheduler states behind a
//! single mutex, so `save_progress` is trivially atomic. Writes can be made
//! to fail on demand to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{ProgressStore, RecordFilter, RecordOrder, StoreResult};
use crate::types::{
    Card, CardId, Placement, ProgressRecord, Question, QuestionType, SchedulerState, UserId,
};

#[derive(Debug, Clone)]
struct Answer {
    user: UserId,
    question_id: i64,
    is_correct: bool,
}

#[derive(Default)]
struct Inner {
    cards: Vec<Card>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    records: Vec<ProgressRecord>,
    states: HashMap<UserId, SchedulerState>,
    next_record_id: i64,
    next_question_id: i64,
}

/// Store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("memory store rejected the write"));
        }
        Ok(())
    }

    /// Make every following write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert_card(&self, card: Card) -> StoreResult<()> {
        let mut inner = self.inner()?;
        inner.cards.retain(|c| c.id != card.id);
        inner.cards.push(card);
        Ok(())
    }

    /// Attach a short-answer question to `card` and return its id.
    pub fn add_question(&self, card: CardId, content: &str, now: DateTime<Utc>) -> StoreResult<i64> {
        let mut inner = self.inner()?;
        inner.next_question_id += 1;
        let id = inner.next_question_id;
        let position = inner.questions.iter().filter(|q| q.card_id == card).count() as i32 + 1;

        inner.questions.push(Question {
            id,
            card_id: card,
            content: content.to_string(),
            question_type: QuestionType::ShortAnswer,
            options: Vec::new(),
            correct_answer: String::new(),
            position,
            created_at: now,
        });
        Ok(id)
    }

    /// Questions of `card` in display order.
    pub fn questions(&self, card: CardId) -> StoreResult<Vec<Question>> {
        let inner = self.inner()?;
        let mut questions: Vec<Question> = inner
            .questions
            .iter()
            .filter(|q| q.card_id == card)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.position, q.id));
        Ok(questions)
    }

    /// Record a graded answer.
    pub fn record_answer(&self, user: UserId, question_id: i64, is_correct: bool) -> StoreResult<()> {
        self.inner()?.answers.push(Answer {
            user,
            question_id,
            is_correct,
        });
        Ok(())
    }

    /// Drop a progress record without telling the scheduler.
    pub fn delete_record(&self, user: UserId, card: CardId) -> StoreResult<bool> {
        let mut inner = self.inner()?;
        let before = inner.records.len();
        inner.records.retain(|r| !(r.user_id == user && r.card_id == card));
        Ok(inner.records.len() != before)
    }
}

fn replace_record(inner: &mut Inner, record: &ProgressRecord) -> StoreResult<()> {
    let slot = inner
        .records
        .iter_mut()
        .find(|r| r.id == record.id)
        .ok_or_else(|| StoreError::backend(format!("progress record {} does not exist", record.id)))?;
    *slot = record.clone();
    Ok(())
}

impl ProgressStore for MemoryStore {
    async fn find_card(&self, id: CardId) -> StoreResult<Option<Card>> {
        Ok(self.inner()?.cards.iter().find(|c| c.id == id).cloned())
    }

    async fn untracked_cards(&self, user: UserId) -> StoreResult<Vec<Card>> {
        let inner = self.inner()?;
        let tracked: HashSet<CardId> = inner
            .records
            .iter()
            .filter(|r| r.user_id == user)
            .map(|r| r.card_id)
            .collect();

        let mut cards: Vec<Card> = inner
            .cards
            .iter()
            .filter(|c| !tracked.contains(&c.id))
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cards)
    }

    async fn find_record(&self, user: UserId, card: CardId) -> StoreResult<Option<ProgressRecord>> {
        Ok(self
            .inner()?
            .records
            .iter()
            .find(|r| r.user_id == user && r.card_id == card)
            .cloned())
    }

    async fn create_record(
        &self,
        user: UserId,
        card: CardId,
        placement: Placement,
        now: DateTime<Utc>,
    ) -> StoreResult<ProgressRecord> {
        self.check_writable()?;
        let mut inner = self.inner()?;

        if let Some(existing) = inner.records.iter().find(|r| r.user_id == user && r.card_id == card) {
            return Ok(existing.clone());
        }

        inner.next_record_id += 1;
        let record = ProgressRecord::new(inner.next_record_id, user, card, placement, now)
            .map_err(StoreError::backend)?;
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn query_records(&self, filter: &RecordFilter) -> StoreResult<Vec<ProgressRecord>> {
        let inner = self.inner()?;
        let mut records: Vec<ProgressRecord> = inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        match filter.order {
            RecordOrder::Created => records.sort_by_key(|r| r.id),
            RecordOrder::DueDate => records.sort_by(|a, b| {
                a.next_review_at()
                    .cmp(&b.next_review_at())
                    .then(a.id.cmp(&b.id))
            }),
        }
        Ok(records)
    }

    async fn count_records(&self, filter: &RecordFilter) -> StoreResult<u64> {
        let inner = self.inner()?;
        Ok(inner.records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn save_record(&self, record: &ProgressRecord) -> StoreResult<()> {
        self.check_writable()?;
        replace_record(&mut *self.inner()?, record)
    }

    async fn count_questions(&self, card: CardId) -> StoreResult<u32> {
        let inner = self.inner()?;
        Ok(inner.questions.iter().filter(|q| q.card_id == card).count() as u32)
    }

    async fn count_correct_answers(&self, user: UserId, card: CardId) -> StoreResult<u32> {
        let inner = self.inner()?;
        let card_questions: HashSet<i64> = inner
            .questions
            .iter()
            .filter(|q| q.card_id == card)
            .map(|q| q.id)
            .collect();

        let correct: HashSet<i64> = inner
            .answers
            .iter()
            .filter(|a| a.user == user && a.is_correct && card_questions.contains(&a.question_id))
            .map(|a| a.question_id)
            .collect();
        Ok(correct.len() as u32)
    }

    async fn find_state(&self, user: UserId) -> StoreResult<Option<SchedulerState>> {
        Ok(self.inner()?.states.get(&user).cloned())
    }

    async fn save_state(&self, state: &SchedulerState) -> StoreResult<()> {
        self.check_writable()?;
        self.inner()?.states.insert(state.user_id, state.clone());
        Ok(())
    }

    async fn save_progress(&self, record: &ProgressRecord, state: &SchedulerState) -> StoreResult<()> {
        self.check_writable()?;
        let mut inner = self.inner()?;
        replace_record(&mut inner, record)?;
        inner.states.insert(state.user_id, state.clone());
        Ok(())
    }

    async fn delete_progress(&self, record: &ProgressRecord, state: &SchedulerState) -> StoreResult<()> {
        self.check_writable()?;
        let mut inner = self.inner()?;
        let index = inner
            .records
            .iter()
            .position(|r| r.id == record.id)
            .ok_or_else(|| StoreError::backend(format!("progress record {} does not exist", record.id)))?;
        inner.records.remove(index);
        inner.states.insert(state.user_id, state.clone());
        Ok(())
    }
}

//! Three-queue learning scheduler.
//!
//! ```text
//! NOT_LEARNED --learn--> LEARNING (practice queue) --all questions correct--> MASTERED (review queue)
//! MASTERED --review ok--> MASTERED, interval doubled (max 180 days)
//! MASTERED --review failed--> LEARNING (learning queue), interval reset to 1
//! ```
//!
//! Every public operation holds the user's lock for its whole duration, so
//! completions for one user never interleave and the cached current-card
//! pointers are only touched by one operation at a time.

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};
use crate::graph;
use crate::locks::UserLocks;
use crate::mastery;
use crate::store::{ProgressStore, RecordFilter, RecordOrder};
use crate::types::{
    Card, CardId, Completion, CompletionOutcome, Dashboard, Placement, ProgressRecord,
    ProgressStatus, QueueKind, QueueStats, RecordAdjustment, SchedulerState, SkipReason,
    StatusStats, UserId, UserStats,
};

/// Scheduler over a progress store.
pub struct Scheduler<S> {
    store: S,
    locks: UserLocks,
}

impl<S: ProgressStore> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
        }
    }

    /// The underlying store, for read-only lookups by the host.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pick the next card for `queue`, or `None` when nothing is available.
    pub async fn next_card(&self, user: UserId, queue: QueueKind, now: DateTime<Utc>) -> Result<Option<Card>> {
        match queue {
            QueueKind::Learning => self.next_learning_card(user, now).await,
            QueueKind::Practice => self.next_practice_card(user, now).await,
            QueueKind::Review => self.next_review_card(user, now).await,
        }
    }

    /// Next card to read for the first time (or again after a failed review).
    ///
    /// Re-polling without completing returns the same card.
    pub async fn next_learning_card(&self, user: UserId, now: DateTime<Utc>) -> Result<Option<Card>> {
        let _guard = self.locks.lock(user).await;
        let mut state = self.load_state(user, now).await?;

        if let Some(card_id) = state.current_learning_card {
            match self.store.find_card(card_id).await? {
                Some(card) => {
                    // Locked again: keep the pointer and look for something else.
                    if graph::is_unlocked(&self.store, &card, user).await? {
                        let record = self.store.find_record(user, card_id).await?;
                        if record.is_some_and(|r| r.queue() == QueueKind::Learning) {
                            return Ok(Some(card));
                        }
                        tracing::debug!(%user, card = %card_id, "cached learning card left the learning queue");
                        self.set_learning_pointer(&mut state, None, now).await?;
                    }
                }
                None => self.set_learning_pointer(&mut state, None, now).await?,
            }
        }

        let filter = RecordFilter::for_user(user)
            .in_queue(QueueKind::Learning)
            .with_status(ProgressStatus::NotLearned)
            .with_status(ProgressStatus::Learning);

        for record in self.store.query_records(&filter).await? {
            let Some(card) = self.store.find_card(record.card_id).await? else {
                continue;
            };
            if graph::is_unlocked(&self.store, &card, user).await? {
                self.set_learning_pointer(&mut state, Some(card.id), now).await?;
                return Ok(Some(card));
            }
        }

        for card in self.store.untracked_cards(user).await? {
            if graph::is_unlocked(&self.store, &card, user).await? {
                self.store
                    .create_record(user, card.id, Placement::UNSEEN, now)
                    .await?;
                tracing::info!(%user, card = %card.id, "started tracking card");
                self.set_learning_pointer(&mut state, Some(card.id), now).await?;
                return Ok(Some(card));
            }
        }

        tracing::debug!(%user, "no learning card available");
        Ok(None)
    }

    /// Next card to practice. The practice queue is worked one card at a
    /// time, so a cached card is returned as long as it still exists.
    pub async fn next_practice_card(&self, user: UserId, now: DateTime<Utc>) -> Result<Option<Card>> {
        let _guard = self.locks.lock(user).await;
        let mut state = self.load_state(user, now).await?;

        if let Some(card_id) = state.current_practice_card {
            if let Some(card) = self.store.find_card(card_id).await? {
                return Ok(Some(card));
            }
            state.current_practice_card = None;
            state.updated_at = now;
            self.store.save_state(&state).await?;
        }

        let filter = RecordFilter::for_user(user)
            .in_queue(QueueKind::Practice)
            .with_status(ProgressStatus::Learning);

        for record in self.store.query_records(&filter).await? {
            if let Some(card) = self.store.find_card(record.card_id).await? {
                state.current_practice_card = Some(card.id);
                state.updated_at = now;
                self.store.save_state(&state).await?;
                return Ok(Some(card));
            }
        }

        Ok(None)
    }

    /// Earliest-due mastered card, ties broken by record creation order.
    /// Nothing is cached; every call looks again.
    pub async fn next_review_card(&self, user: UserId, now: DateTime<Utc>) -> Result<Option<Card>> {
        let _guard = self.locks.lock(user).await;

        let filter = RecordFilter::for_user(user)
            .in_queue(QueueKind::Review)
            .with_status(ProgressStatus::Mastered)
            .due_before(now)
            .ordered_by(RecordOrder::DueDate);

        for record in self.store.query_records(&filter).await? {
            if let Some(card) = self.store.find_card(record.card_id).await? {
                return Ok(Some(card));
            }
        }

        Ok(None)
    }

    /// The user finished reading `card`.
    pub async fn complete_learning(&self, user: UserId, card: CardId, now: DateTime<Utc>) -> Result<Completion> {
        let _guard = self.locks.lock(user).await;
        let mut record = self.tracked_record(user, card).await?;
        let mut state = self.load_state(user, now).await?;

        if let Some(reason) = expect_queue(&record, QueueKind::Learning) {
            return Ok(skipped(user, card, reason, QueueKind::Practice, &state));
        }

        let question_count = self.store.count_questions(card).await?;
        record.complete_learning(question_count, now);

        if record.status() == ProgressStatus::Learning {
            state.total_learned_cards += 1;
            state.current_practice_card = Some(card);
            state.current_learning_card = None;
        }

        self.persist(&mut record, &mut state, now).await?;
        tracing::info!(%user, %card, status = record.status().as_str(), "learning completed");

        let next_action = match record.status() {
            ProgressStatus::Mastered => QueueKind::Review,
            _ => QueueKind::Practice,
        };
        Ok(Completion::new(CompletionOutcome::Applied, next_action, &state))
    }

    /// The user finished a practice round on `card`; master it if every
    /// question has now been answered correctly.
    pub async fn complete_practice(&self, user: UserId, card: CardId, now: DateTime<Utc>) -> Result<Completion> {
        let _guard = self.locks.lock(user).await;
        let mut record = self.tracked_record(user, card).await?;
        let mut state = self.load_state(user, now).await?;

        if let Some(reason) = expect_queue(&record, QueueKind::Practice) {
            let next_action = practice_next_action(&state);
            return Ok(skipped(user, card, reason, next_action, &state));
        }

        if mastery::evaluate(&self.store, card, user).await? {
            record.master(now);
            state.total_mastered_cards += 1;
            state.current_practice_card = None;
            release_pointer(&mut state.current_learning_card, card);
            tracing::info!(%user, %card, "card mastered");
        }

        self.persist(&mut record, &mut state, now).await?;
        Ok(Completion::new(
            CompletionOutcome::Applied,
            practice_next_action(&state),
            &state,
        ))
    }

    /// The user reviewed `card`; correctness is decided by the caller.
    pub async fn complete_review(
        &self,
        user: UserId,
        card: CardId,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        let _guard = self.locks.lock(user).await;
        let mut record = self.tracked_record(user, card).await?;
        let mut state = self.load_state(user, now).await?;

        let next_action = if is_correct {
            QueueKind::Review
        } else {
            QueueKind::Learning
        };

        if let Some(reason) = expect_queue(&record, QueueKind::Review) {
            return Ok(skipped(user, card, reason, next_action, &state));
        }

        record.complete_review(is_correct, now);
        if !is_correct && state.current_learning_card != Some(card) {
            state.current_learning_card = Some(card);
        }

        self.persist(&mut record, &mut state, now).await?;
        tracing::info!(
            %user,
            %card,
            is_correct,
            interval_days = record.review_interval_days(),
            "review completed"
        );

        Ok(Completion::new(CompletionOutcome::Applied, next_action, &state))
    }

    /// Count an answered question towards the record's attempt counters.
    pub async fn record_attempt(
        &self,
        user: UserId,
        card: CardId,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        let _guard = self.locks.lock(user).await;

        let Some(mut record) = self.store.find_record(user, card).await? else {
            tracing::debug!(%user, %card, "attempt on untracked card");
            return Ok(CompletionOutcome::Skipped {
                reason: SkipReason::NotTracked,
            });
        };

        record.record_attempt(is_correct);
        record.touch(now);
        self.store.save_record(&record).await?;
        Ok(CompletionOutcome::Applied)
    }

    /// Queue, status and aggregate counts for `user`.
    pub async fn dashboard(&self, user: UserId, now: DateTime<Utc>) -> Result<Dashboard> {
        let _guard = self.locks.lock(user).await;
        let state = self.load_state(user, now).await?;

        let count = |filter: RecordFilter| async move { self.store.count_records(&filter).await };
        let mine = || RecordFilter::for_user(user);

        let queue_stats = QueueStats {
            learning_queue: count(mine().in_queue(QueueKind::Learning)).await?,
            practice_queue: count(mine().in_queue(QueueKind::Practice)).await?,
            review_queue: count(mine().in_queue(QueueKind::Review)).await?,
            due_review: count(mine().in_queue(QueueKind::Review).due_before(now)).await?,
        };
        let status_stats = StatusStats {
            not_learned: count(mine().with_status(ProgressStatus::NotLearned)).await?,
            learning: count(mine().with_status(ProgressStatus::Learning)).await?,
            mastered: count(mine().with_status(ProgressStatus::Mastered)).await?,
        };

        Ok(Dashboard {
            user_stats: UserStats {
                total_learned_cards: state.total_learned_cards,
                total_mastered_cards: state.total_mastered_cards,
                daily_goal: state.daily_goal,
            },
            queue_stats,
            status_stats,
        })
    }

    /// Change the user's daily goal. Must be positive.
    pub async fn set_daily_goal(&self, user: UserId, goal: i64, now: DateTime<Utc>) -> Result<SchedulerState> {
        let goal = SchedulerState::validate_daily_goal(goal)?;

        let _guard = self.locks.lock(user).await;
        let mut state = self.load_state(user, now).await?;
        state.daily_goal = goal;
        state.updated_at = now;
        self.store.save_state(&state).await?;
        Ok(state)
    }

    /// Edit a record by hand. Cached pointers to the card are dropped when
    /// the record leaves their queue; the aggregate counters are not touched.
    pub async fn adjust_record(
        &self,
        user: UserId,
        card: CardId,
        adjustment: &RecordAdjustment,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord> {
        let _guard = self.locks.lock(user).await;
        let mut record = self.tracked_record(user, card).await?;
        let mut state = self.load_state(user, now).await?;

        record.adjust(adjustment, now)?;
        if record.queue() != QueueKind::Learning {
            release_pointer(&mut state.current_learning_card, card);
        }
        if record.queue() != QueueKind::Practice {
            release_pointer(&mut state.current_practice_card, card);
        }

        self.persist(&mut record, &mut state, now).await?;
        tracing::info!(
            %user,
            %card,
            status = record.status().as_str(),
            queue = record.queue().as_str(),
            "progress record adjusted"
        );
        Ok(record)
    }

    /// Delete a record by hand. The card is untracked again and comes back
    /// through the learning queue like any new card.
    pub async fn remove_record(&self, user: UserId, card: CardId, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.locks.lock(user).await;
        let record = self.tracked_record(user, card).await?;
        let mut state = self.load_state(user, now).await?;

        release_pointer(&mut state.current_learning_card, card);
        release_pointer(&mut state.current_practice_card, card);
        state.updated_at = now;

        self.store.delete_progress(&record, &state).await?;
        tracing::info!(%user, %card, "progress record removed");
        Ok(())
    }

    /// Get-or-create the user's scheduler state.
    async fn load_state(&self, user: UserId, now: DateTime<Utc>) -> Result<SchedulerState> {
        if let Some(state) = self.store.find_state(user).await? {
            return Ok(state);
        }

        let state = SchedulerState::new(user, now);
        self.store.save_state(&state).await?;
        tracing::info!(%user, "created scheduler state");
        Ok(state)
    }

    async fn tracked_record(&self, user: UserId, card: CardId) -> Result<ProgressRecord> {
        if self.store.find_card(card).await?.is_none() {
            return Err(SchedulerError::CardNotFound(card));
        }
        self.store
            .find_record(user, card)
            .await?
            .ok_or(SchedulerError::RecordNotFound { user, card })
    }

    async fn set_learning_pointer(
        &self,
        state: &mut SchedulerState,
        card: Option<CardId>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if state.current_learning_card == card {
            return Ok(());
        }
        state.current_learning_card = card;
        state.updated_at = now;
        self.store.save_state(state).await?;
        Ok(())
    }

    async fn persist(
        &self,
        record: &mut ProgressRecord,
        state: &mut SchedulerState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        record.touch(now);
        state.updated_at = now;
        self.store.save_progress(record, state).await?;
        Ok(())
    }
}

fn expect_queue(record: &ProgressRecord, expected: QueueKind) -> Option<SkipReason> {
    let actual = record.queue();
    (actual != expected).then_some(SkipReason::WrongQueue { expected, actual })
}

fn release_pointer(pointer: &mut Option<CardId>, card: CardId) {
    if *pointer == Some(card) {
        *pointer = None;
    }
}

fn practice_next_action(state: &SchedulerState) -> QueueKind {
    if state.current_practice_card.is_none() {
        QueueKind::Review
    } else {
        QueueKind::Practice
    }
}

fn skipped(
    user: UserId,
    card: CardId,
    reason: SkipReason,
    next_action: QueueKind,
    state: &SchedulerState,
) -> Completion {
    tracing::warn!(%user, %card, ?reason, "completion skipped");
    Completion::new(CompletionOutcome::Skipped { reason }, next_action, state)
}

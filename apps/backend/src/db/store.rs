//! PostgreSQL-backed [`ProgressStore`] for the scheduler.

use chrono::{DateTime, Utc};
use learning_core::{
    Card, CardId, Placement, ProgressRecord, ProgressStore, RecordFilter, RecordOrder,
    SchedulerState, StoreError, StoreResult, UserId,
};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};

use super::{Database, CARD_SELECT};
use crate::models::{DbCard, DbProgressRecord, DbSchedulerState};

const RECORD_COLUMNS: &str = "id, learner_id, card_id, status, queue, first_learned_at, mastered_at, \
     review_count, review_interval_days, next_review_at, practice_attempts, \
     practice_correct_count, total_attempts, created_at, last_accessed_at";

const STATE_COLUMNS: &str = "learner_id, current_learning_card, current_practice_card, \
     total_learned_cards, total_mastered_cards, daily_goal, created_at, updated_at";

fn to_record(row: DbProgressRecord) -> StoreResult<ProgressRecord> {
    row.to_core_record().map_err(StoreError::backend)
}

/// Append the WHERE clause for `filter`.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) {
    builder.push(" WHERE TRUE");

    if let Some(user) = filter.user {
        builder.push(" AND learner_id = ").push_bind(user);
    }
    if let Some(queue) = filter.queue {
        builder.push(" AND queue = ").push_bind(queue.as_str());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
        builder.push(" AND status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(at) = filter.due_before {
        builder.push(" AND next_review_at <= ").push_bind(at);
    }
}

async fn fetch_record(pool: &PgPool, user: UserId, card: CardId) -> StoreResult<Option<ProgressRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM progress_records WHERE learner_id = $1 AND card_id = $2");
    let row = sqlx::query_as::<_, DbProgressRecord>(&sql)
        .bind(user)
        .bind(card)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::backend)?;

    row.map(to_record).transpose()
}

async fn update_record<'e, E>(executor: E, record: &ProgressRecord) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    let snapshot = record.snapshot();
    let result = sqlx::query(
        r#"
        UPDATE progress_records
        SET status = $2, queue = $3, first_learned_at = $4, mastered_at = $5,
            review_count = $6, review_interval_days = $7, next_review_at = $8,
            practice_attempts = $9, practice_correct_count = $10, total_attempts = $11,
            last_accessed_at = $12
        WHERE id = $1
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.status.as_str())
    .bind(snapshot.queue.as_str())
    .bind(snapshot.first_learned_at)
    .bind(snapshot.mastered_at)
    .bind(snapshot.review_count as i32)
    .bind(snapshot.review_interval_days as i32)
    .bind(snapshot.next_review_at)
    .bind(snapshot.practice_attempts as i32)
    .bind(snapshot.practice_correct_count as i32)
    .bind(snapshot.total_attempts as i32)
    .bind(snapshot.last_accessed_at)
    .execute(executor)
    .await
    .map_err(StoreError::backend)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::backend(format!("progress record {} does not exist", record.id)));
    }
    Ok(())
}

async fn upsert_state<'e, E>(executor: E, state: &SchedulerState) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO scheduler_states
            (learner_id, current_learning_card, current_practice_card,
             total_learned_cards, total_mastered_cards, daily_goal, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (learner_id) DO UPDATE SET
            current_learning_card = EXCLUDED.current_learning_card,
            current_practice_card = EXCLUDED.current_practice_card,
            total_learned_cards = EXCLUDED.total_learned_cards,
            total_mastered_cards = EXCLUDED.total_mastered_cards,
            daily_goal = EXCLUDED.daily_goal,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(state.user_id)
    .bind(state.current_learning_card)
    .bind(state.current_practice_card)
    .bind(state.total_learned_cards as i32)
    .bind(state.total_mastered_cards as i32)
    .bind(state.daily_goal as i32)
    .bind(state.created_at)
    .bind(state.updated_at)
    .execute(executor)
    .await
    .map_err(StoreError::backend)?;

    Ok(())
}

impl ProgressStore for Database {
    async fn find_card(&self, id: CardId) -> StoreResult<Option<Card>> {
        let sql = format!("{CARD_SELECT} WHERE c.id = $1");
        let card = sqlx::query_as::<_, DbCard>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::backend)?;

        Ok(card.map(|c| c.to_core_card()))
    }

    async fn untracked_cards(&self, user: UserId) -> StoreResult<Vec<Card>> {
        let sql = format!(
            r#"{CARD_SELECT}
            WHERE NOT EXISTS (
                SELECT 1 FROM progress_records r
                WHERE r.card_id = c.id AND r.learner_id = $1
            )
            ORDER BY c.created_at, c.id"#
        );
        let cards = sqlx::query_as::<_, DbCard>(&sql)
            .bind(user)
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::backend)?;

        Ok(cards.iter().map(DbCard::to_core_card).collect())
    }

    async fn find_record(&self, user: UserId, card: CardId) -> StoreResult<Option<ProgressRecord>> {
        fetch_record(self.pool(), user, card).await
    }

    async fn create_record(
        &self,
        user: UserId,
        card: CardId,
        placement: Placement,
        now: DateTime<Utc>,
    ) -> StoreResult<ProgressRecord> {
        // Validates the placement; the id is assigned by the insert.
        let draft = ProgressRecord::new(0, user, card, placement, now).map_err(StoreError::backend)?;
        let sql = format!(
            r#"
            INSERT INTO progress_records (learner_id, card_id, status, queue, created_at, last_accessed_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (learner_id, card_id) DO NOTHING
            RETURNING {RECORD_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, DbProgressRecord>(&sql)
            .bind(user)
            .bind(card)
            .bind(draft.status().as_str())
            .bind(draft.queue().as_str())
            .bind(now)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::backend)?;

        match inserted {
            Some(row) => to_record(row),
            None => fetch_record(self.pool(), user, card)
                .await?
                .ok_or_else(|| StoreError::backend(format!("progress record for card {card} disappeared"))),
        }
    }

    async fn query_records(&self, filter: &RecordFilter) -> StoreResult<Vec<ProgressRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM progress_records"));
        push_filter(&mut builder, filter);
        builder.push(match filter.order {
            RecordOrder::Created => " ORDER BY id",
            RecordOrder::DueDate => " ORDER BY next_review_at, id",
        });

        let rows = builder
            .build_query_as::<DbProgressRecord>()
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::backend)?;

        rows.into_iter().map(to_record).collect()
    }

    async fn count_records(&self, filter: &RecordFilter) -> StoreResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM progress_records");
        push_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(StoreError::backend)?;

        Ok(count as u64)
    }

    async fn save_record(&self, record: &ProgressRecord) -> StoreResult<()> {
        update_record(self.pool(), record).await
    }

    async fn count_questions(&self, card: CardId) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE card_id = $1")
            .bind(card)
            .fetch_one(self.pool())
            .await
            .map_err(StoreError::backend)?;

        Ok(count as u32)
    }

    async fn count_correct_answers(&self, user: UserId, card: CardId) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT a.question_id)
            FROM answer_records a
            JOIN questions q ON q.id = a.question_id
            WHERE a.learner_id = $1 AND q.card_id = $2 AND a.is_correct
            "#,
        )
        .bind(user)
        .bind(card)
        .fetch_one(self.pool())
        .await
        .map_err(StoreError::backend)?;

        Ok(count as u32)
    }

    async fn find_state(&self, user: UserId) -> StoreResult<Option<SchedulerState>> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM scheduler_states WHERE learner_id = $1");
        let row = sqlx::query_as::<_, DbSchedulerState>(&sql)
            .bind(user)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::backend)?;

        Ok(row.map(|s| s.to_core_state()))
    }

    async fn save_state(&self, state: &SchedulerState) -> StoreResult<()> {
        upsert_state(self.pool(), state).await
    }

    async fn save_progress(&self, record: &ProgressRecord, state: &SchedulerState) -> StoreResult<()> {
        let mut tx = self.pool().begin().await.map_err(StoreError::backend)?;
        update_record(&mut *tx, record).await?;
        upsert_state(&mut *tx, state).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn delete_progress(&self, record: &ProgressRecord, state: &SchedulerState) -> StoreResult<()> {
        let mut tx = self.pool().begin().await.map_err(StoreError::backend)?;

        let result = sqlx::query("DELETE FROM progress_records WHERE id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::backend(format!("progress record {} does not exist", record.id)));
        }

        upsert_state(&mut *tx, state).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }
}

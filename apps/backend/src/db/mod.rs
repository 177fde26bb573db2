//! PostgreSQL database operations

mod store;

use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;

/// Card columns with prerequisite ids aggregated into an array.
pub(crate) const CARD_SELECT: &str = r#"
    SELECT c.id, c.title, c.content, c.created_at, c.updated_at,
           ARRAY(
               SELECT p.prerequisite_id FROM card_prerequisites p
               WHERE p.card_id = c.id
               ORDER BY p.prerequisite_id
           ) AS prerequisites
    FROM cards c
"#;

const QUESTION_COLUMNS: &str =
    "id, card_id, content, question_type, options, correct_answer, position, created_at";

const LEARNING_RECORD_SELECT: &str = r#"
    SELECT l.username, c.title AS card_title,
           r.id, r.learner_id, r.card_id, r.status, r.queue,
           r.first_learned_at, r.mastered_at, r.review_count, r.review_interval_days,
           r.next_review_at, r.practice_attempts, r.practice_correct_count,
           r.total_attempts, r.created_at, r.last_accessed_at
    FROM progress_records r
    JOIN learners l ON l.id = r.learner_id
    JOIN cards c ON c.id = r.card_id
"#;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === Learner Repository ===

    /// Get a learner by username, creating it on first sight
    pub async fn get_or_create_learner(&self, username: &str) -> Result<Learner> {
        let learner = sqlx::query_as::<_, Learner>(
            r#"
            INSERT INTO learners (id, username)
            VALUES ($1, $2)
            ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
            RETURNING id, username, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(learner)
    }

    pub async fn find_learner(&self, username: &str) -> Result<Option<Learner>> {
        let learner = sqlx::query_as::<_, Learner>(
            r#"
            SELECT id, username, created_at
            FROM learners
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(learner)
    }

    pub async fn list_learners(&self) -> Result<Vec<Learner>> {
        let learners = sqlx::query_as::<_, Learner>(
            r#"
            SELECT id, username, created_at
            FROM learners
            ORDER BY created_at, username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(learners)
    }

    // === Card Repository ===

    /// List all cards, oldest first
    pub async fn list_cards(&self) -> Result<Vec<DbCard>> {
        let sql = format!("{CARD_SELECT} ORDER BY c.created_at, c.id");
        let cards = sqlx::query_as::<_, DbCard>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(cards)
    }

    /// Get card by ID
    pub async fn get_card(&self, card_id: Uuid) -> Result<Option<DbCard>> {
        let sql = format!("{CARD_SELECT} WHERE c.id = $1");
        let card = sqlx::query_as::<_, DbCard>(&sql)
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    /// Which of `ids` exist as cards
    pub async fn existing_card_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM cards WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(found)
    }

    /// Create a card together with its prerequisite edges
    pub async fn create_card(&self, request: &CardRequest) -> Result<DbCard> {
        let card_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cards (id, title, content)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(card_id)
        .bind(&request.title)
        .bind(&request.content)
        .execute(&mut *tx)
        .await?;

        insert_prerequisites(&mut tx, card_id, &request.prerequisites).await?;
        tx.commit().await?;

        self.get_card(card_id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("card {card_id} vanished after insert")))
    }

    /// Replace the prerequisite set of a card
    pub async fn set_prerequisites(&self, card_id: Uuid, prerequisites: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM card_prerequisites WHERE card_id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?;

        insert_prerequisites(&mut tx, card_id, prerequisites).await?;

        sqlx::query("UPDATE cards SET updated_at = NOW() WHERE id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace a card's title, content and prerequisites. `None` if the card does not exist.
    pub async fn update_card(&self, card_id: Uuid, request: &CardRequest) -> Result<Option<DbCard>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE cards
            SET title = $2, content = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(card_id)
        .bind(&request.title)
        .bind(&request.content)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM card_prerequisites WHERE card_id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?;
        insert_prerequisites(&mut tx, card_id, &request.prerequisites).await?;
        tx.commit().await?;

        self.get_card(card_id).await
    }

    /// Delete a card. Questions, answers, edges and progress records go with it.
    pub async fn delete_card(&self, card_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(card_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every prerequisite edge in the content graph
    pub async fn prerequisite_edges(&self) -> Result<Vec<DependencyEdge>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT prerequisite_id, card_id
            FROM card_prerequisites
            ORDER BY prerequisite_id, card_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(from, to)| DependencyEdge { from, to })
            .collect())
    }

    /// Cards with their question counts, for the dependency view
    pub async fn dependency_nodes(&self) -> Result<Vec<DependencyNode>> {
        let nodes = sqlx::query_as::<_, DependencyNode>(
            r#"
            SELECT c.id, c.title, COUNT(q.id) AS question_count
            FROM cards c
            LEFT JOIN questions q ON q.card_id = c.id
            GROUP BY c.id, c.title, c.created_at
            ORDER BY c.created_at, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    // === Question Repository ===

    pub async fn create_question(&self, card_id: Uuid, request: &QuestionRequest) -> Result<DbQuestion> {
        let sql = format!(
            r#"
            INSERT INTO questions (card_id, content, question_type, options, correct_answer, position)
            VALUES ($1, $2, $3, $4, $5,
                    COALESCE($6, (SELECT COALESCE(MAX(position), 0) + 1 FROM questions WHERE card_id = $1)))
            RETURNING {QUESTION_COLUMNS}
            "#
        );

        let question = sqlx::query_as::<_, DbQuestion>(&sql)
            .bind(card_id)
            .bind(&request.content)
            .bind(request.question_type.as_str())
            .bind(&request.options)
            .bind(&request.correct_answer)
            .bind(request.position)
            .fetch_one(&self.pool)
            .await?;

        Ok(question)
    }

    /// Questions of a card in display order
    pub async fn list_questions(&self, card_id: Uuid) -> Result<Vec<DbQuestion>> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE card_id = $1 ORDER BY position, id");
        let questions = sqlx::query_as::<_, DbQuestion>(&sql)
            .bind(card_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(questions)
    }

    pub async fn get_question(&self, question_id: i64) -> Result<Option<DbQuestion>> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let question = sqlx::query_as::<_, DbQuestion>(&sql)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(question)
    }

    pub async fn update_question(
        &self,
        card_id: Uuid,
        question_id: i64,
        request: &QuestionRequest,
    ) -> Result<Option<DbQuestion>> {
        let sql = format!(
            r#"
            UPDATE questions
            SET content = $3, question_type = $4, options = $5, correct_answer = $6,
                position = COALESCE($7, position)
            WHERE id = $1 AND card_id = $2
            RETURNING {QUESTION_COLUMNS}
            "#
        );

        let question = sqlx::query_as::<_, DbQuestion>(&sql)
            .bind(question_id)
            .bind(card_id)
            .bind(&request.content)
            .bind(request.question_type.as_str())
            .bind(&request.options)
            .bind(&request.correct_answer)
            .bind(request.position)
            .fetch_optional(&self.pool)
            .await?;

        Ok(question)
    }

    pub async fn delete_question(&self, card_id: Uuid, question_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1 AND card_id = $2")
            .bind(question_id)
            .bind(card_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The question next to `from` in display order, or the first one when `from` is `None`
    pub async fn adjacent_question(
        &self,
        card_id: Uuid,
        from: Option<&DbQuestion>,
        direction: NavDirection,
    ) -> Result<Option<DbQuestion>> {
        let condition = match direction {
            NavDirection::First => "TRUE",
            NavDirection::Next => "(position, id) > ($2, $3)",
            NavDirection::Prev => "(position, id) < ($2, $3)",
        };
        let order = match direction {
            NavDirection::Prev => "position DESC, id DESC",
            NavDirection::First | NavDirection::Next => "position, id",
        };
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE card_id = $1 AND {condition} ORDER BY {order} LIMIT 1"
        );

        let mut query = sqlx::query_as::<_, DbQuestion>(&sql).bind(card_id);
        if direction != NavDirection::First {
            let from = from.ok_or_else(|| {
                ApiError::BadRequest("question_id is required to step through questions".to_string())
            })?;
            query = query.bind(from.position).bind(from.id);
        }

        Ok(query.fetch_optional(&self.pool).await?)
    }

    // === Answer Repository ===

    /// Store a graded answer and return its id
    pub async fn insert_answer(
        &self,
        learner_id: Uuid,
        question_id: i64,
        answer: &str,
        is_correct: bool,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO answer_records (learner_id, question_id, user_answer, is_correct)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(learner_id)
        .bind(question_id)
        .bind(answer)
        .bind(is_correct)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    // === Admin Read-outs ===

    /// Progress records with learner and card names, optionally for one learner
    pub async fn list_learning_records(&self, username: Option<&str>) -> Result<Vec<LearningRecordRow>> {
        let sql = format!(
            "{LEARNING_RECORD_SELECT} WHERE $1::TEXT IS NULL OR l.username = $1 ORDER BY l.username, r.id"
        );
        let rows = sqlx::query_as::<_, LearningRecordRow>(&sql)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn get_learning_record(&self, record_id: i64) -> Result<Option<LearningRecordRow>> {
        let sql = format!("{LEARNING_RECORD_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, LearningRecordRow>(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

async fn insert_prerequisites(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    card_id: Uuid,
    prerequisites: &[Uuid],
) -> Result<()> {
    if prerequisites.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO card_prerequisites (card_id, prerequisite_id)
        SELECT $1, UNNEST($2::UUID[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(card_id)
    .bind(prerequisites)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

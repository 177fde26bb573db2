//! Content endpoints: cards, prerequisites and questions

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use learning_core::find_cycle;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::AppState;

/// GET /api/cards
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Card>>> {
    let cards = state.db.list_cards().await?;
    Ok(Json(cards.iter().map(DbCard::to_core_card).collect()))
}

/// POST /api/cards
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CardRequest>,
) -> Result<(StatusCode, Json<Card>)> {
    check_title(&request)?;

    // A new card has no dependents, so it cannot close a cycle.
    check_prerequisites_exist(&state, &request.prerequisites).await?;

    let card = state.db.create_card(&request).await?;
    tracing::info!(card = %card.id, title = %card.title, "created card");

    Ok((StatusCode::CREATED, Json(card.to_core_card())))
}

/// GET /api/cards/:id
pub async fn get(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardDetailResponse>> {
    let card = find_card(&state, card_id).await?;
    let questions = state.db.list_questions(card_id).await?;

    Ok(Json(CardDetailResponse {
        card: card.to_core_card(),
        questions: questions.iter().map(DbQuestion::to_core_question).collect(),
    }))
}

/// PUT /api/cards/:id
pub async fn update(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<CardRequest>,
) -> Result<Json<Card>> {
    find_card(&state, card_id).await?;
    check_title(&request)?;
    check_new_prerequisites(&state, card_id, &request.prerequisites).await?;

    let card = state
        .db
        .update_card(card_id, &request)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("card {card_id}")))?;
    tracing::info!(card = %card_id, "updated card");

    Ok(Json(card.to_core_card()))
}

/// DELETE /api/cards/:id
pub async fn delete(State(state): State<AppState>, Path(card_id): Path<Uuid>) -> Result<StatusCode> {
    if !state.db.delete_card(card_id).await? {
        return Err(ApiError::NotFound(format!("card {card_id}")));
    }
    tracing::info!(card = %card_id, "deleted card");

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/cards/:id/prerequisites
pub async fn set_prerequisites(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<SetPrerequisitesRequest>,
) -> Result<Json<Card>> {
    find_card(&state, card_id).await?;
    check_new_prerequisites(&state, card_id, &request.prerequisites).await?;

    state.db.set_prerequisites(card_id, &request.prerequisites).await?;
    tracing::info!(card = %card_id, count = request.prerequisites.len(), "replaced prerequisites");

    let card = find_card(&state, card_id).await?;
    Ok(Json(card.to_core_card()))
}

/// GET /api/cards/dependencies
pub async fn dependencies(State(state): State<AppState>) -> Result<Json<DependencyGraphResponse>> {
    let nodes = state.db.dependency_nodes().await?;
    let edges = state.db.prerequisite_edges().await?;
    Ok(Json(DependencyGraphResponse { nodes, edges }))
}

/// GET /api/cards/:id/questions
pub async fn list_questions(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<Vec<Question>>> {
    find_card(&state, card_id).await?;
    let questions = state.db.list_questions(card_id).await?;
    Ok(Json(questions.iter().map(DbQuestion::to_core_question).collect()))
}

/// POST /api/cards/:id/questions
pub async fn add_question(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<QuestionRequest>,
) -> Result<(StatusCode, Json<Question>)> {
    find_card(&state, card_id).await?;
    check_question(&request)?;

    let question = state.db.create_question(card_id, &request).await?;
    Ok((StatusCode::CREATED, Json(question.to_core_question())))
}

/// PUT /api/cards/:id/questions/:question_id
pub async fn update_question(
    State(state): State<AppState>,
    Path((card_id, question_id)): Path<(Uuid, i64)>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<Question>> {
    find_card(&state, card_id).await?;
    check_question(&request)?;

    let question = state
        .db
        .update_question(card_id, question_id, &request)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("question {question_id} of card {card_id}")))?;

    Ok(Json(question.to_core_question()))
}

/// DELETE /api/cards/:id/questions/:question_id
pub async fn delete_question(
    State(state): State<AppState>,
    Path((card_id, question_id)): Path<(Uuid, i64)>,
) -> Result<StatusCode> {
    if !state.db.delete_question(card_id, question_id).await? {
        return Err(ApiError::NotFound(format!("question {question_id} of card {card_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/cards/:id/navigation?direction=first|next|prev&question_id=
pub async fn navigate(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Query(query): Query<NavigationQuery>,
) -> Result<Json<Question>> {
    find_card(&state, card_id).await?;

    let from = match query.question_id {
        Some(question_id) => Some(
            state
                .db
                .get_question(question_id)
                .await?
                .filter(|q| q.card_id == card_id)
                .ok_or_else(|| ApiError::NotFound(format!("question {question_id} of card {card_id}")))?,
        ),
        None => None,
    };

    let question = state
        .db
        .adjacent_question(card_id, from.as_ref(), query.direction)
        .await?
        .ok_or_else(|| ApiError::NotFound("no more questions".to_string()))?;

    Ok(Json(question.to_core_question()))
}

async fn find_card(state: &AppState, card_id: Uuid) -> Result<DbCard> {
    state
        .db
        .get_card(card_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("card {card_id}")))
}

fn check_title(request: &CardRequest) -> Result<()> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    Ok(())
}

fn check_question(request: &QuestionRequest) -> Result<()> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("question content must not be empty".to_string()));
    }
    if request.question_type == QuestionType::Choice && request.options.is_empty() {
        return Err(ApiError::BadRequest("choice questions need options".to_string()));
    }
    Ok(())
}

/// Reject self-references, unknown ids and edge sets that would close a cycle.
async fn check_new_prerequisites(state: &AppState, card_id: Uuid, prerequisites: &[Uuid]) -> Result<()> {
    if prerequisites.contains(&card_id) {
        return Err(ApiError::BadRequest("a card cannot be its own prerequisite".to_string()));
    }
    check_prerequisites_exist(state, prerequisites).await?;

    let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for edge in state.db.prerequisite_edges().await? {
        graph.entry(edge.to).or_default().push(edge.from);
    }
    graph.insert(card_id, prerequisites.to_vec());

    if let Some(cycle) = find_cycle(&graph) {
        let path: Vec<String> = cycle.iter().map(Uuid::to_string).collect();
        return Err(ApiError::BadRequest(format!(
            "prerequisites would form a cycle: {}",
            path.join(" -> ")
        )));
    }
    Ok(())
}

async fn check_prerequisites_exist(state: &AppState, prerequisites: &[Uuid]) -> Result<()> {
    if prerequisites.is_empty() {
        return Ok(());
    }

    let found: HashSet<Uuid> = state
        .db
        .existing_card_ids(prerequisites)
        .await?
        .into_iter()
        .collect();

    match prerequisites.iter().find(|id| !found.contains(*id)) {
        Some(missing) => Err(ApiError::BadRequest(format!("unknown prerequisite card {missing}"))),
        None => Ok(()),
    }
}

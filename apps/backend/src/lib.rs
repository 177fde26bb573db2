pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use learning_core::Scheduler;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub scheduler: Arc<Scheduler<Database>>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            scheduler: Arc::new(Scheduler::new(db.clone())),
            db: Arc::new(db),
        }
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Scheduler routes
        .route("/api/scheduler/next", post(routes::scheduler::next))
        .route(
            "/api/scheduler/complete-learning",
            post(routes::scheduler::complete_learning),
        )
        .route(
            "/api/scheduler/complete-practice",
            post(routes::scheduler::complete_practice),
        )
        .route(
            "/api/scheduler/complete-review",
            post(routes::scheduler::complete_review),
        )
        .route("/api/scheduler/dashboard", get(routes::scheduler::dashboard))
        .route("/api/scheduler/daily-goal", put(routes::scheduler::set_daily_goal))
        // Content routes
        .route(
            "/api/cards",
            get(routes::cards::list).post(routes::cards::create),
        )
        .route("/api/cards/dependencies", get(routes::cards::dependencies))
        .route(
            "/api/cards/:id",
            get(routes::cards::get)
                .put(routes::cards::update)
                .delete(routes::cards::delete),
        )
        .route(
            "/api/cards/:id/prerequisites",
            put(routes::cards::set_prerequisites),
        )
        .route(
            "/api/cards/:id/questions",
            get(routes::cards::list_questions).post(routes::cards::add_question),
        )
        .route(
            "/api/cards/:id/questions/:question_id",
            put(routes::cards::update_question).delete(routes::cards::delete_question),
        )
        .route("/api/cards/:id/navigation", get(routes::cards::navigate))
        // Answers
        .route("/api/answers", post(routes::answers::submit))
        // Admin
        .route("/api/learning-records", get(routes::admin::learning_records))
        .route(
            "/api/learning-records/:id",
            put(routes::admin::update_learning_record).delete(routes::admin::delete_learning_record),
        )
        .route("/api/users", get(routes::admin::users))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url, config.max_connections).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    let app = router(AppState::new(db));

    let addr = config.bind_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

//! HTTP surface under `/api/v1`.
use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::errors::AgentResult;
use crate::lifecycle::Lifecycle;
use crate::perception::ScreenAnalyzer;

mod actions;
mod analyze;
mod error;
mod sessions;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
    pub analyzer: Arc<ScreenAnalyzer>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/users/consent", post(users::record_consent))
        .route("/users/consent/:user_id", get(users::get_consent))
        .route("/sessions", post(sessions::create_session).get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session).delete(sessions::delete_session))
        .route("/sessions/:id/pause", patch(sessions::pause_session))
        .route("/sessions/:id/resume", patch(sessions::resume_session))
        .route("/sessions/:id/cancel", patch(sessions::cancel_session))
        .route("/sessions/:id/complete", patch(sessions::complete_session))
        .route("/sessions/:id/fail", patch(sessions::fail_session))
        .route("/sessions/:id/actions", get(sessions::list_session_actions))
        .route("/sessions/:id/route", get(sessions::get_route).put(sessions::plan_route))
        .route("/actions", post(actions::create_action))
        .route("/actions/:id", get(actions::get_action))
        .route("/actions/:id/confirm", post(actions::confirm_action))
        .route("/actions/:id/retry", post(actions::retry_action))
        .route("/analyze/screen", post(analyze::analyze_screen));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn serve(state: AppState, config: &ServerConfig) -> AgentResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "HTTP API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::AgentResult;
use crate::lifecycle::route::PlannedStep;
use crate::lifecycle::state::{Action, Route, Session};

const DEFAULT_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: Uuid,
    pub app_name: String,
    pub task_description: String,
}

#[derive(Deserialize)]
pub struct ListSessionsQuery {
    pub user_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Deserialize)]
pub struct PlanRouteRequest {
    pub steps: Vec<PlannedStep>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> AgentResult<(StatusCode, Json<Session>)> {
    let session = state
        .lifecycle
        .create_session(req.user_id, &req.app_name, &req.task_description)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListSessionsQuery>,
) -> AgentResult<Json<Vec<Session>>> {
    Ok(Json(state.lifecycle.list_sessions(q.user_id, q.limit).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.get_session(id).await?))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AgentResult<Json<Value>> {
    state.lifecycle.delete_session(id).await?;
    Ok(Json(json!({ "message": "session deleted" })))
}

pub async fn pause_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.pause(id).await?))
}

pub async fn resume_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.resume(id).await?))
}

pub async fn cancel_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.cancel(id).await?))
}

pub async fn complete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.complete(id).await?))
}

pub async fn fail_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Session>> {
    Ok(Json(state.lifecycle.fail(id).await?))
}

pub async fn list_session_actions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<LimitQuery>,
) -> AgentResult<Json<Vec<Action>>> {
    Ok(Json(state.lifecycle.list_actions(id, q.limit).await?))
}

pub async fn get_route(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Route>> {
    Ok(Json(state.lifecycle.get_route(id).await?))
}

pub async fn plan_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PlanRouteRequest>,
) -> AgentResult<Json<Route>> {
    Ok(Json(state.lifecycle.plan_route(id, req.steps).await?))
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::AgentResult;
use crate::lifecycle::state::{Action, ActionTemplate};

/// The template fields (`action_type`, `target`, `text`, `parameters`) sit
/// next to the binding fields in the same object.
#[derive(Deserialize)]
pub struct CreateActionRequest {
    pub session_id: Uuid,
    pub step_number: u32,
    #[serde(flatten)]
    pub action: ActionTemplate,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub confirmed: bool,
}

pub async fn create_action(
    State(state): State<AppState>,
    Json(req): Json<CreateActionRequest>,
) -> AgentResult<(StatusCode, Json<Action>)> {
    let action = state
        .lifecycle
        .create_action(req.session_id, req.step_number, req.action)
        .await?;
    Ok((StatusCode::CREATED, Json(action)))
}

pub async fn get_action(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Action>> {
    Ok(Json(state.lifecycle.get_action(id).await?))
}

pub async fn confirm_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> AgentResult<Json<Action>> {
    Ok(Json(state.lifecycle.confirm_or_reject(id, req.confirmed).await?))
}

pub async fn retry_action(State(state): State<AppState>, Path(id): Path<Uuid>) -> AgentResult<Json<Action>> {
    Ok(Json(state.lifecycle.retry(id).await?))
}

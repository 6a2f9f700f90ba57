use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::AgentResult;
use crate::lifecycle::state::User;

#[derive(Deserialize)]
pub struct ConsentRequest {
    pub user_id: Uuid,
    pub consent_given: bool,
}

pub async fn record_consent(
    State(state): State<AppState>,
    Json(req): Json<ConsentRequest>,
) -> AgentResult<Json<User>> {
    let user = state.lifecycle.record_consent(req.user_id, req.consent_given).await?;
    Ok(Json(user))
}

pub async fn get_consent(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AgentResult<Json<User>> {
    Ok(Json(state.lifecycle.get_user(user_id).await?))
}

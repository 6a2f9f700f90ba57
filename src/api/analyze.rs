use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::AgentResult;
use crate::perception::screenshot::{capture_primary, decode_base64_image};
use crate::perception::RecommendationResult;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub session_id: Uuid,
    /// Base64 PNG. Captured from the primary monitor when absent.
    #[serde(default)]
    pub screenshot: Option<String>,
    /// Defaults to the session's task description.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: RecommendationResult,
    pub payment_screen: bool,
}

pub async fn analyze_screen(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> AgentResult<Json<AnalyzeResponse>> {
    let session = state.lifecycle.get_session(req.session_id).await?;
    let image = match req.screenshot.as_deref() {
        Some(encoded) => decode_base64_image(encoded)?,
        None => capture_primary().await?.image_bytes,
    };
    let context = req.context.unwrap_or(session.task_description);

    tracing::info!(session_id = %session.id, image_bytes = image.len(), "analyzing screen");
    let (result, payment_screen) = tokio::join!(
        state.analyzer.analyze_screen(&image, Some(context.as_str())),
        state.analyzer.detect_payment_screen(&image),
    );
    Ok(Json(AnalyzeResponse {
        result: result?,
        payment_screen,
    }))
}

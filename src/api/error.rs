use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::AgentError;

impl AgentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::NotFound { .. } => StatusCode::NOT_FOUND,
            AgentError::InvalidTransition(_) | AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_analysis_failure() {
            format!("could not understand the screen: {self}")
        } else {
            self.to_string()
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (AgentError::not_found("session", "x"), StatusCode::NOT_FOUND),
            (AgentError::InvalidTransition("x".into()), StatusCode::BAD_REQUEST),
            (AgentError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AgentError::malformed("x", "raw"), StatusCode::INTERNAL_SERVER_ERROR),
            (AgentError::UnknownActionKind("drag".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AgentError::ExecutionFailure("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AgentError::LlmProvider("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }
}

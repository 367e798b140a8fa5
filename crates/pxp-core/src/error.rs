//! Error kinds for the agent runtime and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::auth::UNAUTHORIZED_MESSAGE;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{UNAUTHORIZED_MESSAGE}")]
    Unauthorized,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Unknown form type: {0}")]
    UnknownFormType(String),
    #[error("{0}")]
    Model(String),
    #[error("{0}")]
    Internal(String),
}

impl From<pxp_llm::LlmError> for AgentError {
    fn from(e: pxp_llm::LlmError) -> Self {
        match e {
            pxp_llm::LlmError::Timeout => AgentError::Model(e.to_string()),
            other => AgentError::Model(format!("AI service error: {}", other)),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::Internal(e.to_string())
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::Unauthorized => StatusCode::UNAUTHORIZED,
            AgentError::InvalidArgument(_)
            | AgentError::UnknownTool(_)
            | AgentError::UnknownFormType(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::Model(_) => StatusCode::BAD_GATEWAY,
            AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_keeps_its_user_facing_message() {
        let err = AgentError::from(pxp_llm::LlmError::Timeout);
        assert_eq!(err.to_string(), "AI service timeout, please try again");
    }

    #[test]
    fn unknown_form_type_message() {
        let err = AgentError::UnknownFormType("badge_creation".to_string());
        assert_eq!(err.to_string(), "Unknown form type: badge_creation");
    }
}

//! Axum HTTP handlers: chat messages, conversations and direct research.

pub mod conversations;
pub mod message;
pub mod research;
pub mod upload;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::ResearchError;
use crate::state::AppState;

pub type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/api/message", post(message::send_message))
        .route("/api/research", post(research::research))
        .route("/api/upload", post(upload::upload_document))
        .with_state(state)
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Unwrap a JSON body, reporting malformed or mistyped input (an unknown
/// `mode`, say) as 400 like any other invalid input.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| error_response(ResearchError::InvalidInput(rejection.body_text())))
}

/// Map a pipeline failure to a status the caller can tell apart from an
/// answer.
pub fn error_response(err: ResearchError) -> ApiError {
    let status = match &err {
        ResearchError::InvalidInput(_) => return (StatusCode::BAD_REQUEST, err.to_string()),
        ResearchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ResearchError::Search(_) | ResearchError::Generation(_) | ResearchError::Rerank(_) => {
            StatusCode::BAD_GATEWAY
        }
        ResearchError::Configuration(_) | ResearchError::Cancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, format!("Processing failed: {err}"))
}

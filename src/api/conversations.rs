use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::json_body;
use crate::models::{ConversationCreateRequest, ConversationListQuery};
use crate::state::AppState;

/// GET /api/conversations?user_id=...
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Json<serde_json::Value> {
    let conversations = state.store.list_conversations(&query.user_id);
    Json(serde_json::json!({ "conversations": conversations }))
}

/// POST /api/conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    payload: Result<Json<ConversationCreateRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let req = json_body(payload)?;
    if req.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id is required".to_string()));
    }
    let conversation_id = state.store.create_conversation(&req.user_id, None);
    tracing::debug!(user_id = %req.user_id, %conversation_id, "Conversation created");
    Ok(Json(serde_json::json!({ "conversation_id": conversation_id })))
}

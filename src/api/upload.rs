use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::Json;

use crate::api::ApiError;

/// POST /api/upload — acknowledge a document upload. The contents are read
/// and discarded; nothing is stored.
pub async fn upload_document(mut multipart: Multipart) -> Result<Json<serde_json::Value>, ApiError> {
    let mut user_id = None;
    let mut conversation_id = None;
    let mut filename = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => user_id = Some(field.text().await.map_err(multipart_error)?),
            "conversation_id" => conversation_id = Some(field.text().await.map_err(multipart_error)?),
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let size = field.bytes().await.map_err(multipart_error)?.len();
                tracing::debug!(?file_name, size, "Upload body received");
                filename = file_name.filter(|f| !f.is_empty());
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("No file provided"))?;
    let user_id = user_id.ok_or_else(|| bad_request("user_id is required"))?;
    let conversation_id = conversation_id.ok_or_else(|| bad_request("conversation_id is required"))?;

    tracing::info!(%user_id, %conversation_id, %filename, "Received upload");
    Ok(Json(serde_json::json!({
        "status": "ok",
        "message": format!("Uploaded: {filename}"),
    })))
}

fn multipart_error(err: MultipartError) -> ApiError {
    (err.status(), err.body_text())
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, message.to_string())
}

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;

use crate::api::{error_response, json_body, ApiError};
use crate::error::ResearchError;
use crate::models::{ResearchContext, ResearchRequest};
use crate::research::ResearchOptions;
use crate::state::AppState;

/// POST /api/research — run Deep Research and return every intermediate
/// result alongside the answer.
pub async fn research(
    State(state): State<AppState>,
    payload: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchContext>, ApiError> {
    let req = json_body(payload)?;
    let options = request_options(&state, &req).map_err(error_response)?;

    let _permit = state
        .research_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            error_response(ResearchError::Configuration(
                "Research service is shutting down".to_string(),
            ))
        })?;

    let cancel = CancellationToken::new();
    let _abort_on_drop = cancel.clone().drop_guard();

    let research = state.deep_research(options).map_err(error_response)?;
    let context = research.run(&req.query, &cancel).await.map_err(|e| {
        tracing::error!(error = %e, "Deep research failed");
        error_response(e)
    })?;
    Ok(Json(context))
}

/// Configured options with the request's overrides applied, rejected
/// before any work is queued if a count is out of range.
fn request_options(state: &AppState, req: &ResearchRequest) -> Result<ResearchOptions, ResearchError> {
    let mut options = ResearchOptions::from(&state.config.research);
    if let Some(n) = req.reformulations {
        options.reformulations = n;
    }
    if let Some(k) = req.topk_context {
        options.topk_context = k;
    }
    options.validate()?;
    Ok(options)
}

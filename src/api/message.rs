use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;

use crate::api::{error_response, json_body, ApiError};
use crate::error::ResearchError;
use crate::guard::CallGuard;
use crate::llm::title::{fallback_title, generate_title};
use crate::llm::Generator;
use crate::models::{ChatMessage, ChatMode, MessageRequest, MessageResponse, SearchHit};
use crate::research::ResearchOptions;
use crate::state::AppState;

const WEB_SEARCH_RESULTS: usize = 5;
const DEEP_RESEARCH_PREFIX: &str = "[Deep Research Mode] ";

/// POST /api/message — one chat turn in chat, web search or deep research mode.
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    // ── Step 1: Validate ─────────────────────────────────
    let req = json_body(payload)?;
    req.validate().map_err(error_response)?;

    // ── Step 2: Resolve conversation, log the user turn ──
    let conversation_id = state
        .store
        .ensure_conversation(&req.user_id, Some(&req.conversation_id));
    if conversation_id != req.conversation_id {
        tracing::info!(
            requested = %req.conversation_id,
            %conversation_id,
            "Started a new conversation"
        );
    }

    let user_content = match req.mode {
        ChatMode::DeepResearch => format!("{DEEP_RESEARCH_PREFIX}{}", req.prompt),
        _ => req.prompt.clone(),
    };
    state
        .store
        .append_message(&req.user_id, &conversation_id, "user", &user_content);

    // Dropping the handler future (client went away) cancels in-flight calls.
    let cancel = CancellationToken::new();
    let _abort_on_drop = cancel.clone().drop_guard();
    let guard = CallGuard::new(state.config.research.call_timeout(), cancel.clone());

    let generator = state.models.generator(&req.model, req.temperature);
    let title = resolve_title(&state, generator.as_ref(), &req, &conversation_id, &guard).await;

    // ── Step 3: Produce the reply ────────────────────────
    let started = Instant::now();
    let reply = match req.mode {
        ChatMode::Chat => guard.run("generate", generator.generate(&req.prompt)).await,
        ChatMode::WebSearch => web_search_reply(&state, generator.as_ref(), &req.prompt, &guard).await,
        ChatMode::DeepResearch => deep_research_reply(&state, &req.prompt, &cancel).await,
    };
    let reply = reply.map_err(|e| {
        tracing::error!(mode = ?req.mode, error = %e, "Processing failed");
        error_response(e)
    })?;
    let generation_time = started.elapsed().as_secs_f64();

    // ── Step 4: Log the assistant turn, respond ──────────
    state
        .store
        .append_message(&req.user_id, &conversation_id, "assistant", &reply);

    let conversations = state.store.list_conversations(&req.user_id);
    let conversation_title = title.unwrap_or_else(|| fallback_title(&req.prompt));

    tracing::info!(
        mode = ?req.mode,
        model = %req.model,
        generation_time,
        "Message answered"
    );

    Ok(Json(MessageResponse {
        assistant: ChatMessage {
            role: "assistant".to_string(),
            content: reply,
        },
        generation_time,
        model: req.model,
        temperature: req.temperature,
        mode: req.mode,
        conversation_id,
        conversation_title,
        conversations,
    }))
}

/// Keep an existing title; otherwise title the conversation from its first
/// turn. Deep research asks the model and falls back to the prompt.
async fn resolve_title(
    state: &AppState,
    generator: &dyn Generator,
    req: &MessageRequest,
    conversation_id: &str,
    guard: &CallGuard,
) -> Option<String> {
    let existing = state.store.get_conversation(&req.user_id, conversation_id)?;
    if let Some(title) = existing.title {
        return Some(title);
    }

    let title = match req.mode {
        ChatMode::DeepResearch => {
            let history = state.store.chat_history(&req.user_id, conversation_id);
            match guard.run("title", generate_title(generator, &history)).await {
                Ok(title) => title,
                Err(e) => {
                    tracing::warn!(error = %e, "Title generation failed, using prompt");
                    fallback_title(&req.prompt)
                }
            }
        }
        _ => fallback_title(&req.prompt),
    };

    state
        .store
        .rename_conversation(&req.user_id, conversation_id, &title);
    Some(title)
}

async fn web_search_reply(
    state: &AppState,
    generator: &dyn Generator,
    prompt: &str,
    guard: &CallGuard,
) -> Result<String, ResearchError> {
    let web_search = state.web_search()?;
    let hits = guard
        .run("search", web_search.search(prompt, WEB_SEARCH_RESULTS))
        .await?;
    tracing::debug!(hits = hits.len(), "Web search results collected");

    let enhanced = build_web_search_prompt(prompt, &hits);
    guard.run("generate", generator.generate(&enhanced)).await
}

async fn deep_research_reply(
    state: &AppState,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<String, ResearchError> {
    let _permit = state
        .research_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ResearchError::Configuration("Research service is shutting down".to_string()))?;

    let research = state.deep_research(ResearchOptions::from(&state.config.research))?;
    let context = research.run(prompt, cancel).await?;
    Ok(context.answer)
}

/// One line per hit: `- <title>: <content>`.
pub fn format_search_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            let title = if hit.title.trim().is_empty() {
                "Untitled"
            } else {
                hit.title.as_str()
            };
            format!("- {title}: {}", hit.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_web_search_prompt(prompt: &str, hits: &[SearchHit]) -> String {
    format!(
        "{prompt}\n\nHere are some relevant search results:\n{}",
        format_search_results(hits)
    )
}

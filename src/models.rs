use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

/// A single web search result, in provider-ranked order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    /// Free-text snippet. May be empty and may repeat across hits.
    pub content: String,
    pub source_url: Option<String>,
}

/// A candidate passage with its relevance to the original query.
///
/// Scores are only comparable within one reranking call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredPassage {
    pub content: String,
    pub score: f32,
}

/// Everything one Deep Research run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchContext {
    pub query: String,
    pub reformulations: Vec<String>,
    /// Top-K passages in rank order.
    pub passages: Vec<ScoredPassage>,
    /// The passages joined with newlines, as injected into the prompt.
    pub context: String,
    pub answer: String,
}

// ─── Chat surface ────────────────────────────────────────

pub const AVAILABLE_MODELS: [&str; 3] = ["qwen2.5:1.5b", "llama3.2:3b", "mistral"];
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Chat,
    WebSearch,
    DeepResearch,
}

/// POST /api/message request
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub mode: ChatMode,
}

fn default_model() -> String {
    AVAILABLE_MODELS[0].to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl MessageRequest {
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.prompt.trim().is_empty() {
            return Err(ResearchError::InvalidInput("Prompt is required".to_string()));
        }
        if !AVAILABLE_MODELS.contains(&self.model.as_str()) {
            return Err(ResearchError::InvalidInput(
                "Unsupported model selection".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ResearchError::InvalidInput(
                "Temperature must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A message as kept in the conversation log
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
}

/// POST /api/message response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub assistant: ChatMessage,
    /// Seconds spent producing the reply
    pub generation_time: f64,
    pub model: String,
    pub temperature: f32,
    pub mode: ChatMode,
    pub conversation_id: String,
    pub conversation_title: String,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationCreateRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationListQuery {
    pub user_id: String,
}

/// POST /api/research request
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    pub reformulations: Option<usize>,
    pub topk_context: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str, temperature: f32) -> MessageRequest {
        MessageRequest {
            user_id: "u1".into(),
            conversation_id: "c1".into(),
            prompt: "hello".into(),
            model: model.into(),
            temperature,
            mode: ChatMode::Chat,
        }
    }

    #[test]
    fn test_chat_mode_serializes_to_snake_case() {
        let json = serde_json::to_value(ChatMode::DeepResearch).unwrap();
        assert_eq!(json, "deep_research");
        let mode: ChatMode = serde_json::from_str("\"web_search\"").unwrap();
        assert_eq!(mode, ChatMode::WebSearch);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result = serde_json::from_str::<ChatMode>("\"telepathy\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_message_request_defaults() {
        let req: MessageRequest = serde_json::from_str(
            r#"{"user_id":"u","conversation_id":"c","prompt":"hi"}"#,
        )
        .unwrap();
        assert_eq!(req.model, "qwen2.5:1.5b");
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(req.mode, ChatMode::Chat);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let err = request("gpt-17", 0.5).validate().unwrap_err();
        assert!(matches!(err, ResearchError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        assert!(request("mistral", 1.5).validate().is_err());
        assert!(request("mistral", -0.1).validate().is_err());
        assert!(request("mistral", 1.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        let mut req = request("mistral", 0.2);
        req.prompt = "  ".into();
        assert!(req.validate().is_err());
    }
}

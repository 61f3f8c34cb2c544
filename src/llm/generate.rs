use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::ResearchError;

/// Opaque text-completion service: one prompt in, one completion out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ResearchError>;
}

/// Hands out generators bound to a model and sampling temperature.
pub trait GeneratorFactory: Send + Sync {
    fn generator(&self, model: &str, temperature: f32) -> Arc<dyn Generator>;
}

/// Factory for generators backed by the configured Ollama or
/// OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

impl GeneratorFactory for LlmClient {
    fn generator(&self, model: &str, temperature: f32) -> Arc<dyn Generator> {
        Arc::new(LlmGenerator {
            client: self.client.clone(),
            config: self.config.clone(),
            model: model.to_string(),
            temperature,
        })
    }
}

pub struct LlmGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    model: String,
    temperature: f32,
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ResearchError> {
        let result = match self.config.provider.as_str() {
            "ollama" => self.call_ollama(prompt).await,
            "openai" => self.call_openai(prompt).await,
            other => {
                return Err(ResearchError::Configuration(format!(
                    "Unknown LLM provider: {other}"
                )))
            }
        };

        result.map_err(|e| ResearchError::Generation(format!("{e:#}")))
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

fn user_message(prompt: &str) -> Vec<Message> {
    vec![Message {
        role: "user".to_string(),
        content: prompt.to_string(),
    }]
}

impl LlmGenerator {
    async fn call_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));

        let req = OllamaChatRequest {
            model: &self.model,
            messages: user_message(prompt),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama chat API returned {status}: {body}");
        }

        let body: OllamaChatResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama chat response")?;
        Ok(body.message.content)
    }

    async fn call_openai(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let req = OpenAiChatRequest {
            model: &self.model,
            messages: user_message(prompt),
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .context("Failed to call OpenAI chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API returned {status}: {body}");
        }

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI chat API returned no choices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_request_carries_temperature() {
        let req = OllamaChatRequest {
            model: "qwen2.5:1.5b",
            messages: user_message("hi"),
            stream: false,
            options: OllamaOptions { temperature: 0.6 },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "qwen2.5:1.5b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_openai_response_without_content_parses() {
        let body: OpenAiChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(body.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_configuration_error() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        let factory = LlmClient::new(reqwest::Client::new(), config);
        let err = factory
            .generator("mistral", 0.1)
            .generate("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Configuration(_)));
    }
}

//! Yes/no relevance classification via an OpenAI-compatible
//! `/v1/completions` endpoint with `logprobs`.
//!
//! One request carries the whole batch of prompts. The reply's next-token
//! distribution at the terminal position gives the "yes" and "no" logits.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::RerankerConfig;
use crate::error::ResearchError;

/// Log-probability assigned when a token is absent from the top-k list.
const MISSING_LOGPROB: f32 = -100.0;

/// How many alternatives to request at the terminal position.
const TOP_LOGPROBS: u32 = 20;

/// Terminal-position scores of the two answer tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YesNoLogits {
    pub yes: f32,
    pub no: f32,
}

impl YesNoLogits {
    /// `softmax([no, yes])[yes]`, which reduces to a sigmoid of the margin.
    pub fn probability_yes(&self) -> f32 {
        let p = sigmoid(self.yes - self.no);
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A model used as a binary relevance classifier.
#[async_trait]
pub trait YesNoClassifier: Send + Sync {
    /// One forward pass over the batch; output is parallel to `prompts`.
    async fn classify(&self, prompts: &[String]) -> Result<Vec<YesNoLogits>, ResearchError>;
}

pub struct CompletionClassifier {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: std::time::Duration,
}

impl CompletionClassifier {
    pub fn new(client: reqwest::Client, config: &RerankerConfig) -> Result<Self, ResearchError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            ResearchError::Configuration("RERANKER_BASE_URL is not set".to_string())
        })?;

        Ok(Self {
            client,
            url: format!("{}/v1/completions", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout: std::time::Duration::from_secs(config.timeout_secs.min(120)),
        })
    }

    async fn call(&self, prompts: &[String]) -> anyhow::Result<CompletionResponse> {
        let req = CompletionRequest {
            model: &self.model,
            prompt: prompts,
            max_tokens: 1,
            temperature: 0.0,
            logprobs: TOP_LOGPROBS,
        };

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .context("Failed to reach reranker endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Reranker returned {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse reranker response")
    }
}

#[async_trait]
impl YesNoClassifier for CompletionClassifier {
    async fn classify(&self, prompts: &[String]) -> Result<Vec<YesNoLogits>, ResearchError> {
        let body = self
            .call(prompts)
            .await
            .map_err(|e| ResearchError::Rerank(format!("{e:#}")))?;
        extract_logits(body, prompts.len())
    }
}

fn extract_logits(
    body: CompletionResponse,
    expected: usize,
) -> Result<Vec<YesNoLogits>, ResearchError> {
    if body.choices.len() != expected {
        return Err(ResearchError::Rerank(format!(
            "reranker returned {} choices for {expected} prompts",
            body.choices.len()
        )));
    }

    let mut choices = body.choices;
    choices.sort_by_key(|c| c.index);

    Ok(choices
        .into_iter()
        .map(|choice| {
            let top = choice
                .logprobs
                .and_then(|lp| lp.top_logprobs.into_iter().next())
                .unwrap_or_default();
            YesNoLogits {
                yes: token_logprob(&top, "yes"),
                no: token_logprob(&top, "no"),
            }
        })
        .collect())
}

/// Exact token first, then the best variant differing only in case or
/// leading whitespace.
fn token_logprob(top: &HashMap<String, f32>, token: &str) -> f32 {
    if let Some(lp) = top.get(token) {
        return *lp;
    }
    top.iter()
        .filter(|(t, _)| t.trim().eq_ignore_ascii_case(token))
        .map(|(_, lp)| *lp)
        .fold(MISSING_LOGPROB, f32::max)
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a [String],
    max_tokens: u32,
    temperature: f32,
    logprobs: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    index: usize,
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    top_logprobs: Vec<HashMap<String, f32>>,
}

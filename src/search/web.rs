//! Web search via a Tavily-compatible `POST /search` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::ResearchError;
use crate::http::{send_with_retry, RetryPolicy};
use crate::models::SearchHit;

/// Issues one query to a search provider and returns ranked hits.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// At most `limit` hits in provider-ranked order, unfiltered.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError>;
}

pub struct TavilyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    search_depth: String,
    timeout: std::time::Duration,
    retry: RetryPolicy,
}

impl TavilyClient {
    /// Fails with `Configuration` when no API key is configured, so a
    /// missing credential surfaces at startup rather than per query.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Result<Self, ResearchError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ResearchError::Configuration("TAVILY_API_KEY is not set".to_string())
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            search_depth: config.search_depth.clone(),
            timeout: config.timeout(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                initial_backoff: std::time::Duration::from_millis(config.initial_backoff_ms),
                ..RetryPolicy::default()
            },
        })
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
        if query.trim().is_empty() {
            return Err(ResearchError::InvalidInput(
                "search query must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(ResearchError::InvalidInput(
                "search limit must be positive".to_string(),
            ));
        }

        let url = format!("{}/search", self.base_url);
        let req = TavilySearchRequest {
            query,
            max_results: limit,
            search_depth: &self.search_depth,
        };

        let resp = send_with_retry(&self.retry, "web search provider", || {
            self.client
                .post(&url)
                .timeout(self.timeout)
                .bearer_auth(&self.api_key)
                .json(&req)
        })
        .await
        .map_err(|e| ResearchError::Search(format!("{e:#}")))?;

        let body: TavilySearchResponse = resp
            .json()
            .await
            .map_err(|e| ResearchError::Search(format!("Failed to parse search response: {e}")))?;

        let hits = into_hits(body, limit);
        tracing::debug!(query, hits = hits.len(), "Web search completed");
        Ok(hits)
    }
}

fn into_hits(body: TavilySearchResponse, limit: usize) -> Vec<SearchHit> {
    body.results
        .into_iter()
        .take(limit)
        .map(|r| SearchHit {
            title: r.title.unwrap_or_default(),
            content: r.content.unwrap_or_default(),
            source_url: r.url.filter(|u| !u.is_empty()),
        })
        .collect()
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> SearchConfig {
        SearchConfig {
            api_key: api_key.map(str::to_string),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_missing_key_fails_at_construction() {
        let result = TavilyClient::new(reqwest::Client::new(), &config(None));
        assert!(matches!(result, Err(ResearchError::Configuration(_))));
    }

    #[test]
    fn test_blank_key_fails_at_construction() {
        let result = TavilyClient::new(reqwest::Client::new(), &config(Some("  ")));
        assert!(matches!(result, Err(ResearchError::Configuration(_))));
    }

    #[test]
    fn test_construction_with_key() {
        let client = TavilyClient::new(reqwest::Client::new(), &config(Some("tvly-abc"))).unwrap();
        assert_eq!(client.base_url, "https://api.tavily.com");
        assert_eq!(client.retry.max_retries, 3);
    }

    #[test]
    fn test_parse_response_keeps_order_and_caps_limit() {
        let body: TavilySearchResponse = serde_json::from_str(
            r#"{"query":"q","results":[
                {"title":"A","url":"https://a.example","content":"alpha","score":0.9},
                {"title":"B","url":"","content":"beta","score":0.8},
                {"title":"C","url":"https://c.example","content":"gamma","score":0.7}
            ]}"#,
        )
        .unwrap();
        let hits = into_hits(body, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "alpha");
        assert_eq!(hits[0].source_url.as_deref(), Some("https://a.example"));
        assert_eq!(hits[1].title, "B");
        assert!(hits[1].source_url.is_none());
    }

    #[test]
    fn test_parse_response_tolerates_missing_fields() {
        let body: TavilySearchResponse =
            serde_json::from_str(r#"{"results":[{"url":"https://x.example"}]}"#).unwrap();
        let hits = into_hits(body, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "");
        assert_eq!(hits[0].content, "");
    }

    #[test]
    fn test_parse_response_without_results() {
        let body: TavilySearchResponse = serde_json::from_str("{}").unwrap();
        assert!(into_hits(body, 5).is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_invalid() {
        let client = TavilyClient::new(reqwest::Client::new(), &config(Some("k"))).unwrap();
        let err = client.search("rust", 0).await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_search_error() {
        let mut cfg = config(Some("k"));
        cfg.base_url = "http://127.0.0.1:9".into();
        cfg.max_retries = 0;
        let client = TavilyClient::new(reqwest::Client::new(), &cfg).unwrap();
        let err = client.search("rust", 3).await.unwrap_err();
        assert!(matches!(err, ResearchError::Search(_)));
    }
}

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the research pipeline and the services it calls.
///
/// Every variant is distinguishable by the caller so the HTTP layer can
/// report "processing failed" instead of inventing an answer.
#[derive(Error, Debug)]
pub enum ResearchError {
    /// Missing credential or model artifact. Raised at construction or load
    /// time and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The web search provider failed.
    #[error("Search failed: {0}")]
    Search(String),

    /// The language model failed (reformulation, synthesis or titling).
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The relevance scoring service failed.
    #[error("Reranking failed: {0}")]
    Rerank(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external call exceeded the per-call budget.
    #[error("{stage} call timed out after {limit:?}")]
    Timeout {
        stage: &'static str,
        limit: Duration,
    },

    #[error("Research request was cancelled")]
    Cancelled,
}

impl ResearchError {
    /// True for failures of an upstream service rather than of the request.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Search(_) | Self::Generation(_) | Self::Rerank(_) | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ResearchError>;

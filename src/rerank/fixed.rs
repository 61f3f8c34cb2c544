use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::RelevanceScorer;
use crate::error::ResearchError;

/// In-memory scorer with deterministic, preassigned scores.
///
/// Documents without an explicit score get the default. With a uniform
/// default it acts as a pass-through: the stable top-K then keeps retrieval
/// order, which is how the server runs when no reranker endpoint is set.
/// Calls are only kept after [`FixedScorer::recording`].
pub struct FixedScorer {
    scores: HashMap<String, f32>,
    default_score: f32,
    calls: Option<Mutex<Vec<(String, Vec<String>)>>>,
}

impl FixedScorer {
    pub fn uniform(score: f32) -> Self {
        Self {
            scores: HashMap::new(),
            default_score: score.clamp(0.0, 1.0),
            calls: None,
        }
    }

    /// Keep every call for inspection through [`FixedScorer::calls`].
    pub fn recording(mut self) -> Self {
        self.calls = Some(Mutex::new(Vec::new()));
        self
    }

    pub fn with_score(mut self, document: impl Into<String>, score: f32) -> Self {
        self.scores.insert(document.into(), score.clamp(0.0, 1.0));
        self
    }

    /// Every (query, documents) pair this scorer was asked about; empty
    /// unless recording.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .as_ref()
            .map(|calls| calls.lock().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelevanceScorer for FixedScorer {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ResearchError> {
        if let Some(calls) = &self.calls {
            calls.lock().push((query.to_string(), documents.to_vec()));
        }
        Ok(documents
            .iter()
            .map(|d| self.scores.get(d).copied().unwrap_or(self.default_score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assigned_and_default_scores() {
        let scorer = FixedScorer::uniform(0.1).with_score("b", 0.9).recording();
        let docs = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let scores = scorer.rerank("q", &docs).await.unwrap();
        assert_eq!(scores, vec![0.1, 0.9, 0.1]);
        assert_eq!(scorer.calls(), vec![("q".to_string(), docs)]);
    }

    #[tokio::test]
    async fn test_pass_through_scorer_retains_nothing() {
        let scorer = FixedScorer::uniform(1.0);
        let docs = vec!["a".to_string(), "b".to_string()];
        for _ in 0..1000 {
            scorer.rerank("q", &docs).await.unwrap();
        }
        assert!(scorer.calls().is_empty());
        assert!(scorer.calls.is_none());
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let scorer = FixedScorer::uniform(3.0).with_score("neg", -1.0);
        let scores = scorer
            .rerank("q", &["x".to_string(), "neg".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![1.0, 0.0]);
    }
}

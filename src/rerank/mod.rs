//! Relevance reranking of retrieved passages.
//!
//! [`Reranker`] turns a causal LM reranker (e.g. Qwen3-Reranker) into a
//! binary classifier: each (query, document) pair is wrapped in a chat
//! template asking for "yes" or "no", and the score is the probability of
//! "yes" at the next token. Scores are independent per document.

pub mod classifier;
pub mod fixed;
pub mod prompt;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::RerankerConfig;
use crate::error::ResearchError;
use classifier::YesNoClassifier;
use prompt::{PromptBuilder, DEFAULT_INSTRUCTION};

pub use classifier::CompletionClassifier;
pub use fixed::FixedScorer;

/// Scores documents against a query; output is parallel to the input and
/// every score lies in [0, 1].
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ResearchError>;

    /// Load any lazily initialized state ahead of the first request.
    async fn warm_up(&self) -> Result<(), ResearchError> {
        Ok(())
    }
}

pub struct Reranker {
    classifier: Arc<dyn YesNoClassifier>,
    tokenizer: String,
    max_length: usize,
    instruction: Option<String>,
    prompts: OnceCell<PromptBuilder>,
}

impl Reranker {
    pub fn new(classifier: Arc<dyn YesNoClassifier>, config: &RerankerConfig) -> Self {
        Self {
            classifier,
            tokenizer: config.tokenizer.clone(),
            max_length: config.max_length,
            instruction: config.instruction.clone(),
            prompts: OnceCell::new(),
        }
    }

    /// Whether the tokenizer state has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.prompts.initialized()
    }

    async fn prompt_builder(&self) -> Result<&PromptBuilder, ResearchError> {
        self.prompts
            .get_or_try_init(|| async {
                let tokenizer = self.tokenizer.clone();
                let max_length = self.max_length;
                let started = std::time::Instant::now();
                let builder = tokio::task::spawn_blocking(move || {
                    PromptBuilder::load(&tokenizer, max_length)
                })
                .await
                .map_err(|e| ResearchError::Configuration(format!("Tokenizer load panicked: {e}")))??;
                tracing::info!(
                    tokenizer = %self.tokenizer,
                    max_length,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Reranker tokenizer loaded"
                );
                Ok(builder)
            })
            .await
    }

    /// Score `documents` against `query` under `instruction` (the default
    /// web search instruction when None).
    pub async fn rerank_with_instruction(
        &self,
        query: &str,
        documents: &[String],
        instruction: Option<&str>,
    ) -> Result<Vec<f32>, ResearchError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let builder = self.prompt_builder().await?;
        let instruction = instruction.unwrap_or(DEFAULT_INSTRUCTION);
        let prompts: Vec<String> = documents
            .iter()
            .map(|doc| builder.build(instruction, query, doc))
            .collect();

        let logits = self.classifier.classify(&prompts).await?;
        if logits.len() != documents.len() {
            return Err(ResearchError::Rerank(format!(
                "classifier returned {} results for {} documents",
                logits.len(),
                documents.len()
            )));
        }

        let scores: Vec<f32> = logits.iter().map(|l| l.probability_yes()).collect();
        tracing::debug!(documents = documents.len(), "Reranked candidate passages");
        Ok(scores)
    }
}

#[async_trait]
impl RelevanceScorer for Reranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ResearchError> {
        self.rerank_with_instruction(query, documents, self.instruction.as_deref())
            .await
    }

    /// Load the tokenizer now instead of on the first scoring call.
    async fn warm_up(&self) -> Result<(), ResearchError> {
        self.prompt_builder().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classifier::YesNoLogits;
    use parking_lot::Mutex;

    /// Says "yes" in proportion to how often the query's first word appears
    /// in the prompt, and records every batch it sees.
    #[derive(Default)]
    struct KeywordClassifier {
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl YesNoClassifier for KeywordClassifier {
        async fn classify(&self, prompts: &[String]) -> Result<Vec<YesNoLogits>, ResearchError> {
            self.batches.lock().push(prompts.to_vec());
            Ok(prompts
                .iter()
                .map(|p| {
                    let doc = p.split("<Document>: ").nth(1).unwrap_or("");
                    let hits = doc.matches("Paris").count() as f32;
                    YesNoLogits {
                        yes: hits,
                        no: 1.0,
                    }
                })
                .collect())
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl YesNoClassifier for BrokenClassifier {
        async fn classify(&self, _prompts: &[String]) -> Result<Vec<YesNoLogits>, ResearchError> {
            Ok(vec![YesNoLogits { yes: 1.0, no: 0.0 }])
        }
    }

    fn reranker(classifier: Arc<dyn YesNoClassifier>) -> Reranker {
        Reranker::new(classifier, &RerankerConfig::default())
    }

    #[tokio::test]
    async fn test_empty_documents_skip_model_and_load() {
        let classifier = Arc::new(KeywordClassifier::default());
        let reranker = reranker(classifier.clone());

        let scores = reranker.rerank("capital of France", &[]).await.unwrap();

        assert!(scores.is_empty());
        assert!(!reranker.is_loaded());
        assert!(classifier.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_scores_parallel_to_documents_and_in_range() {
        let classifier = Arc::new(KeywordClassifier::default());
        let reranker = reranker(classifier.clone());
        let docs = vec![
            "Berlin is in Germany.".to_string(),
            "Paris is the capital of France. Paris!".to_string(),
            String::new(),
            "Paris".to_string(),
        ];

        let scores = reranker.rerank("capital of France", &docs).await.unwrap();

        assert_eq!(scores.len(), docs.len());
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(scores[1] > scores[3]);
        assert!(scores[3] > scores[0]);
        // Empty document still gets a score.
        assert_eq!(scores[2], scores[0]);
        // One batch, one forward pass.
        assert_eq!(classifier.batches.lock().len(), 1);
        assert!(reranker.is_loaded());
    }

    #[tokio::test]
    async fn test_prompts_use_original_query_and_default_instruction() {
        let classifier = Arc::new(KeywordClassifier::default());
        let reranker = reranker(classifier.clone());
        reranker
            .rerank("capital of France", &["doc".to_string()])
            .await
            .unwrap();

        let batches = classifier.batches.lock();
        let prompt = &batches[0][0];
        assert!(prompt.contains("<Query>: capital of France\n"));
        assert!(prompt.contains(DEFAULT_INSTRUCTION));
        assert!(prompt.contains("\"yes\" or \"no\""));
    }

    #[tokio::test]
    async fn test_custom_instruction() {
        let classifier = Arc::new(KeywordClassifier::default());
        let reranker = reranker(classifier.clone());
        reranker
            .rerank_with_instruction("q", &["doc".to_string()], Some("Find recipes"))
            .await
            .unwrap();
        assert!(classifier.batches.lock()[0][0].contains("<Instruct>: Find recipes\n"));
    }

    #[tokio::test]
    async fn test_state_loaded_once_across_calls() {
        let classifier = Arc::new(KeywordClassifier::default());
        let reranker = reranker(classifier.clone());
        reranker.warm_up().await.unwrap();
        assert!(reranker.is_loaded());

        for _ in 0..3 {
            reranker.rerank("q", &["Paris".to_string()]).await.unwrap();
        }
        // Empty input after load leaves the state loaded.
        reranker.rerank("q", &[]).await.unwrap();
        assert!(reranker.is_loaded());
        assert_eq!(classifier.batches.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_rerank_error() {
        let reranker = reranker(Arc::new(BrokenClassifier));
        let docs = vec!["a".to_string(), "b".to_string()];
        let err = reranker.rerank("q", &docs).await.unwrap_err();
        assert!(matches!(err, ResearchError::Rerank(_)));
    }

    #[tokio::test]
    async fn test_bad_tokenizer_fails_on_first_use() {
        let config = RerankerConfig {
            tokenizer: "nope".into(),
            ..RerankerConfig::default()
        };
        let reranker = Reranker::new(Arc::new(KeywordClassifier::default()), &config);
        // No load needed for empty input.
        assert!(reranker.rerank("q", &[]).await.unwrap().is_empty());
        let err = reranker.rerank("q", &["d".to_string()]).await.unwrap_err();
        assert!(matches!(err, ResearchError::Configuration(_)));
        assert!(!reranker.is_loaded());
    }
}

use futures_util::future::join_all;
use std::sync::Arc;

use crate::config::MAX_REFORMULATIONS;
use crate::error::ResearchError;
use crate::guard::CallGuard;
use crate::llm::generate::Generator;

/// Sampling temperature for reformulations: high enough that repeated calls
/// diverge.
pub const REFORMULATION_TEMPERATURE: f32 = 0.6;

const SYSTEM_PROMPT: &str = "You are an AI expert in reformulating user queries in order to \
provide an equivalent formulation in meaning but different in the form.\n\
Your task is to enhance user queries by generating a single reformulation to improve search results.";

/// Produces alternate phrasings of a query, one generation call each.
#[derive(Clone)]
pub struct Reformulator {
    generator: Arc<dyn Generator>,
}

impl Reformulator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Generate `count` reformulations of `query` in call order.
    ///
    /// Duplicates are kept. Any failing call fails the whole batch.
    pub async fn enhance(&self, query: &str, count: usize) -> Result<Vec<String>, ResearchError> {
        self.enhance_guarded(query, count, &CallGuard::unbounded())
            .await
    }

    pub async fn enhance_guarded(
        &self,
        query: &str,
        count: usize,
        guard: &CallGuard,
    ) -> Result<Vec<String>, ResearchError> {
        if count == 0 || count > MAX_REFORMULATIONS {
            return Err(ResearchError::InvalidInput(format!(
                "reformulation count must be between 1 and {MAX_REFORMULATIONS}"
            )));
        }

        let prompt = build_prompt(query);
        let calls = (0..count).map(|_| guard.run("reformulation", self.generator.generate(&prompt)));

        let mut reformulations = Vec::new();
        for result in join_all(calls).await {
            let text = clean_reformulation(&result?);
            if text.is_empty() {
                return Err(ResearchError::Generation(
                    "model returned an empty reformulation".to_string(),
                ));
            }
            reformulations.push(text);
        }

        tracing::debug!(?reformulations, "Query reformulated");
        Ok(reformulations)
    }
}

fn build_prompt(query: &str) -> String {
    format!("{SYSTEM_PROMPT}\nUser query: {query}")
}

/// Strip surrounding whitespace and wrapping quotes the model tends to add.
fn clean_reformulation(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replies from a script, one entry per call, and records prompts.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ResearchError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ResearchError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String, ResearchError> {
            self.prompts.lock().push(prompt.to_string());
            self.replies
                .lock()
                .pop()
                .unwrap_or_else(|| Ok("fallback phrasing".to_string()))
        }
    }

    #[tokio::test]
    async fn test_returns_exactly_count_items() {
        for count in 1..=5 {
            let generator = Scripted::new(Vec::new());
            let reformulator = Reformulator::new(generator.clone());
            let result = reformulator.enhance("rust async", count).await.unwrap();
            assert_eq!(result.len(), count);
            assert!(result.iter().all(|r| !r.is_empty()));
            assert_eq!(generator.prompts.lock().len(), count);
        }
    }

    #[tokio::test]
    async fn test_keeps_duplicates_and_order() {
        let generator = Scripted::new(vec![
            Ok("first".into()),
            Ok("same".into()),
            Ok("same".into()),
        ]);
        let reformulator = Reformulator::new(generator);
        let result = reformulator.enhance("q", 3).await.unwrap();
        assert_eq!(result, vec!["first", "same", "same"]);
    }

    #[tokio::test]
    async fn test_prompt_contains_instruction_and_query() {
        let generator = Scripted::new(Vec::new());
        let reformulator = Reformulator::new(generator.clone());
        reformulator.enhance("capital of France", 1).await.unwrap();
        let prompts = generator.prompts.lock();
        assert!(prompts[0].contains("single reformulation"));
        assert!(prompts[0].ends_with("User query: capital of France"));
    }

    #[tokio::test]
    async fn test_one_failure_fails_the_batch() {
        let generator = Scripted::new(vec![
            Ok("fine".into()),
            Err(ResearchError::Generation("model down".into())),
            Ok("also fine".into()),
        ]);
        let reformulator = Reformulator::new(generator);
        let err = reformulator.enhance("q", 3).await.unwrap_err();
        assert!(matches!(err, ResearchError::Generation(_)));
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_generation_error() {
        let generator = Scripted::new(vec![Ok("   ".into())]);
        let reformulator = Reformulator::new(generator);
        let err = reformulator.enhance("q", 1).await.unwrap_err();
        assert!(matches!(err, ResearchError::Generation(_)));
    }

    #[tokio::test]
    async fn test_zero_count_is_invalid() {
        let reformulator = Reformulator::new(Scripted::new(Vec::new()));
        let err = reformulator.enhance("q", 0).await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_count_above_limit_is_invalid_without_calls() {
        let generator = Scripted::new(Vec::new());
        let reformulator = Reformulator::new(generator.clone());
        for count in [MAX_REFORMULATIONS + 1, usize::MAX] {
            let err = reformulator.enhance("q", count).await.unwrap_err();
            assert!(matches!(err, ResearchError::InvalidInput(_)));
        }
        assert!(generator.prompts.lock().is_empty());

        let at_limit = reformulator.enhance("q", MAX_REFORMULATIONS).await.unwrap();
        assert_eq!(at_limit.len(), MAX_REFORMULATIONS);
    }

    #[test]
    fn test_clean_strips_quotes_and_whitespace() {
        assert_eq!(
            clean_reformulation("  \"What city is the capital of France?\"\n"),
            "What city is the capital of France?"
        );
        assert_eq!(clean_reformulation("plain"), "plain");
    }
}

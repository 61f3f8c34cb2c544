//! Deep Research: reformulate → search → rerank → select → synthesize.
//!
//! ```text
//!                 ┌────────────────┐
//!                 │   User Query   │
//!                 └───────┬────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │ Reformulate (LLM ×N)│  concurrent, joined in order
//!              └──────────┬──────────┘
//!           ┌─────────────┼─────────────┐
//!           ▼             ▼             ▼
//!      ┌─────────┐   ┌─────────┐   ┌─────────┐
//!      │ Search 1│   │ Search 2│   │ Search N│  concurrent, joined in order
//!      └────┬────┘   └────┬────┘   └────┬────┘
//!           └─────────────┼─────────────┘
//!                         ▼ flatten (query order, then hit order)
//!              ┌─────────────────────┐
//!              │ Rerank vs ORIGINAL  │  one batch
//!              └──────────┬──────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │ Stable top-K, join  │
//!              └──────────┬──────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │ Synthesize (LLM ×1) │
//!              └─────────────────────┘
//! ```

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{FailurePolicy, ResearchConfig, MAX_REFORMULATIONS, MAX_TOPK_CONTEXT};
use crate::error::ResearchError;
use crate::guard::CallGuard;
use crate::llm::{Generator, Reformulator};
use crate::models::{ResearchContext, ScoredPassage};
use crate::rerank::RelevanceScorer;
use crate::search::WebSearch;

/// Sampling temperature for the final answer.
pub const ANSWER_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct ResearchOptions {
    pub reformulations: usize,
    /// Hits requested per search and passages kept for the context.
    pub topk_context: usize,
    pub failure_policy: FailurePolicy,
    pub call_timeout: Option<Duration>,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        (&ResearchConfig::default()).into()
    }
}

impl ResearchOptions {
    /// Reject counts outside `1..=MAX_*` before any external call is made.
    pub fn validate(&self) -> Result<(), ResearchError> {
        if !(1..=MAX_REFORMULATIONS).contains(&self.reformulations) {
            return Err(ResearchError::InvalidInput(format!(
                "reformulations must be between 1 and {MAX_REFORMULATIONS}"
            )));
        }
        if !(1..=MAX_TOPK_CONTEXT).contains(&self.topk_context) {
            return Err(ResearchError::InvalidInput(format!(
                "topk_context must be between 1 and {MAX_TOPK_CONTEXT}"
            )));
        }
        Ok(())
    }
}

impl From<&ResearchConfig> for ResearchOptions {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            reformulations: config.reformulations,
            topk_context: config.topk_context,
            failure_policy: config.failure_policy,
            call_timeout: config.call_timeout(),
        }
    }
}

pub struct DeepResearch {
    reformulator: Reformulator,
    web_search: Arc<dyn WebSearch>,
    scorer: Arc<dyn RelevanceScorer>,
    answerer: Arc<dyn Generator>,
    options: ResearchOptions,
}

impl DeepResearch {
    pub fn new(
        reformulator: Arc<dyn Generator>,
        web_search: Arc<dyn WebSearch>,
        scorer: Arc<dyn RelevanceScorer>,
        answerer: Arc<dyn Generator>,
        options: ResearchOptions,
    ) -> Self {
        Self {
            reformulator: Reformulator::new(reformulator),
            web_search,
            scorer,
            answerer,
            options,
        }
    }

    pub fn options(&self) -> &ResearchOptions {
        &self.options
    }

    /// Run the pipeline and return the generator's answer unmodified.
    pub async fn search(&self, query: &str) -> Result<String, ResearchError> {
        self.run(query, &CancellationToken::new())
            .await
            .map(|ctx| ctx.answer)
    }

    /// Run the pipeline, keeping the intermediate results.
    ///
    /// Cancelling `cancel` aborts whichever external call is in flight.
    pub async fn run(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<ResearchContext, ResearchError> {
        if query.trim().is_empty() {
            return Err(ResearchError::InvalidInput("Query is required".to_string()));
        }
        self.options.validate()?;

        let guard = CallGuard::new(self.options.call_timeout, cancel.clone());
        let started = std::time::Instant::now();

        // ── Step 1: Reformulate ──────────────────────────────
        let reformulations = self.reformulate(query, &guard).await?;

        // ── Step 2: Retrieve (reformulations only) ───────────
        let search_queries: Vec<String> = if reformulations.is_empty() {
            vec![query.to_string()]
        } else {
            reformulations.clone()
        };
        let candidates = self.retrieve(&search_queries, &guard).await?;

        // ── Step 3: Rerank against the original query ────────
        let scores = self.score(query, &candidates, &guard).await?;

        // ── Step 4: Select ───────────────────────────────────
        let passages = match scores {
            Some(scores) => select_top_k(&candidates, &scores, self.options.topk_context),
            None => Vec::new(),
        };
        let context = build_context(&passages);

        // ── Step 5: Synthesize ───────────────────────────────
        let prompt = build_synthesis_prompt(query, &context);
        let answer = guard
            .run("synthesis", self.answerer.generate(&prompt))
            .await?;

        tracing::info!(
            reformulations = reformulations.len(),
            candidates = candidates.len(),
            passages = passages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Deep research completed"
        );

        Ok(ResearchContext {
            query: query.to_string(),
            reformulations,
            passages,
            context,
            answer,
        })
    }

    /// Empty result means "search the original query directly", which only
    /// happens under the degrade policy.
    async fn reformulate(&self, query: &str, guard: &CallGuard) -> Result<Vec<String>, ResearchError> {
        match self
            .reformulator
            .enhance_guarded(query, self.options.reformulations, guard)
            .await
        {
            Ok(reformulations) => {
                tracing::info!(?reformulations, "Query reformulated");
                Ok(reformulations)
            }
            Err(e) if self.degrades(&e) => {
                tracing::warn!(error = %e, "Reformulation failed, searching the original query");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn retrieve(&self, queries: &[String], guard: &CallGuard) -> Result<Vec<String>, ResearchError> {
        let limit = self.options.topk_context;
        let searches = queries
            .iter()
            .map(|q| guard.run("search", self.web_search.search(q, limit)));
        let results = join_all(searches).await;

        let mut candidates = Vec::new();
        for (q, result) in queries.iter().zip(results) {
            match result {
                Ok(hits) => {
                    tracing::debug!(query = %q, hits = hits.len(), "Search results collected");
                    candidates.extend(hits.into_iter().map(|h| h.content));
                }
                Err(e) if self.degrades(&e) => {
                    tracing::warn!(query = %q, error = %e, "Search failed, skipping reformulation");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(candidates)
    }

    /// `None` means scoring failed under the degrade policy.
    async fn score(
        &self,
        query: &str,
        candidates: &[String],
        guard: &CallGuard,
    ) -> Result<Option<Vec<f32>>, ResearchError> {
        let result = guard
            .run("rerank", self.scorer.rerank(query, candidates))
            .await
            .and_then(|scores| {
                if scores.len() == candidates.len() {
                    Ok(scores)
                } else {
                    Err(ResearchError::Rerank(format!(
                        "scorer returned {} scores for {} candidates",
                        scores.len(),
                        candidates.len()
                    )))
                }
            });

        match result {
            Ok(scores) => Ok(Some(scores)),
            Err(e) if self.degrades(&e) => {
                tracing::warn!(error = %e, "Reranking failed, synthesizing without web context");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn degrades(&self, err: &ResearchError) -> bool {
        self.options.failure_policy == FailurePolicy::Degrade
            && !matches!(err, ResearchError::Cancelled | ResearchError::InvalidInput(_))
    }
}

/// Highest-scoring `k` candidates, best first. Ties keep candidate order.
pub fn select_top_k(candidates: &[String], scores: &[f32], k: usize) -> Vec<ScoredPassage> {
    let mut order: Vec<usize> = (0..candidates.len().min(scores.len())).collect();
    // `sort_by` is stable, so equal scores stay in flattening order.
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    order
        .into_iter()
        .take(k)
        .map(|i| ScoredPassage {
            content: candidates[i].clone(),
            score: scores[i],
        })
        .collect()
}

pub fn build_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_synthesis_prompt(query: &str, context: &str) -> String {
    format!(
        "Using the following web search results, provide a comprehensive answer to the query: {query}\n\n\
         Web search results:\n{context}"
    )
}

//! # web-rage
//!
//! A retrieval-augmented chat assistant. Besides plain chat and single-shot
//! web search, it offers a Deep Research mode that grounds the model's
//! answer in reranked web results.
//!
//! ## Architecture
//!
//! ```text
//!                          ┌─────────────┐
//!                          │  User Query  │
//!                          └──────┬───────┘
//!                                 │
//!                                 ▼
//!                   ┌───────────────────────────┐
//!                   │   Reformulation (LLM ×3)   │
//!                   │ independent calls, t = 0.6 │
//!                   └─────────────┬─────────────┘
//!                                 │ 3 reformulations
//!            ┌────────────────────┼────────────────────┐
//!            ▼                    ▼                    ▼
//!     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!     │ Web search 1│     │ Web search 2│     │ Web search 3│
//!     │  top 5 hits │     │  top 5 hits │     │  top 5 hits │
//!     └──────┬──────┘     └──────┬──────┘     └──────┬──────┘
//!            └────────────────────┼────────────────────┘
//!                                 │ ≤ 15 candidate passages
//!                                 ▼
//!                  ┌───────────────────────────┐
//!                  │  Yes/No Reranker           │
//!                  │  scored vs ORIGINAL query  │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Stable top-5, "\n" join   │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Synthesis (LLM, t = 0.1)  │
//!                  └───────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, LLM, search, reranker and pipeline
//! - [`error`] - `ResearchError` taxonomy shared by every stage
//! - [`models`] - Shared data types: `SearchHit`, `ScoredPassage`, chat request/response types
//! - [`http`] - Retry with exponential backoff for transient upstream failures
//! - [`guard`] - Per-call timeout and request-wide cancellation
//! - [`llm::generate`] - Text generation via Ollama or OpenAI-compatible APIs
//! - [`llm::reformulate`] - Independent query reformulations
//! - [`llm::title`] - Conversation titles
//! - [`search::web`] - Tavily web search client
//! - [`rerank`] - Qwen3-style yes/no relevance classifier with token-budgeted prompts
//! - [`research`] - The Deep Research orchestrator
//! - [`store`] - In-memory conversation log
//! - [`api`] - Axum HTTP handlers for messages, conversations and research
//! - [`state`] - Shared application state wiring the services together

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod llm;
pub mod models;
pub mod rerank;
pub mod research;
pub mod search;
pub mod state;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on reformulations per request; each one is an LLM call and
/// a web search.
pub const MAX_REFORMULATIONS: usize = 10;
/// Upper bound on hits per search and passages kept (Tavily's own cap).
pub const MAX_TOPK_CONTEXT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Web search provider configuration
    pub search: SearchConfig,
    /// Yes/no relevance reranker configuration
    pub reranker: RerankerConfig,
    /// Deep Research pipeline defaults
    pub research: ResearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model used by Deep Research for reformulation and synthesis
    pub chat_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

/// Configuration for the Tavily-compatible web search API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider credential. The search client refuses to build without it.
    pub api_key: Option<String>,
    pub base_url: String,
    /// "basic" or "advanced"
    pub search_depth: String,
    pub timeout_secs: u64,
    /// Transport-level retries on 429/5xx and connection errors.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub initial_backoff_ms: u64,
}

/// Configuration for the reranker sidecar (e.g. llama-server with Qwen3-Reranker)
/// exposing an OpenAI-compatible `/v1/completions` endpoint with logprobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the completions API. If None, passages keep retrieval order.
    pub base_url: Option<String>,
    pub model: String,
    /// Token budget for the whole classification prompt.
    pub max_length: usize,
    /// BPE used for prompt budgeting: "cl100k_base" or "o200k_base".
    pub tokenizer: String,
    /// Task instruction; the built-in web search instruction when None.
    pub instruction: Option<String>,
    /// Request timeout in seconds (capped at 120).
    pub timeout_secs: u64,
    /// Load the tokenizer at startup instead of on first use.
    pub warm_up: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure before synthesis aborts the request.
    #[default]
    Strict,
    /// Fall back to direct search, skip failed searches, synthesize with
    /// whatever context survived.
    Degrade,
}

impl FailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "degrade" => Some(Self::Degrade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub reformulations: usize,
    pub topk_context: usize,
    pub failure_policy: FailurePolicy,
    /// Budget applied to every reformulation, search, rerank and synthesis
    /// call (0 = unbounded).
    pub call_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            reranker: RerankerConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "qwen2.5:1.5b".to_string(),
            api_key: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.tavily.com".to_string(),
            search_depth: "basic".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            initial_backoff_ms: 300,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "Qwen/Qwen3-Reranker-0.6B".to_string(),
            max_length: 8192,
            tokenizer: "cl100k_base".to_string(),
            instruction: None,
            timeout_secs: 30,
            warm_up: false,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            reformulations: 3,
            topk_context: 5,
            failure_policy: FailurePolicy::Strict,
            call_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Build the configuration from defaults overridden by environment
    /// variables. Call after `dotenvy::dotenv()` so a local `.env` applies.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("WEB_RAGE_BIND_ADDR") {
            config.bind_addr = addr;
        }

        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(key) = non_empty(lookup("LLM_API_KEY")) {
            config.llm.api_key = Some(key);
        }

        // Web search
        if let Some(key) = non_empty(lookup("TAVILY_API_KEY")) {
            config.search.api_key = Some(key);
        }
        if let Some(url) = lookup("WEB_SEARCH_BASE_URL") {
            config.search.base_url = url;
        }
        if let Some(depth) = lookup("WEB_SEARCH_DEPTH") {
            config.search.search_depth = depth;
        }
        if let Some(v) = parse(lookup("WEB_SEARCH_TIMEOUT_SECS")) {
            config.search.timeout_secs = v;
        }
        if let Some(v) = parse(lookup("WEB_SEARCH_MAX_RETRIES")) {
            config.search.max_retries = v;
        }

        // Reranker
        if let Some(url) = non_empty(lookup("RERANKER_BASE_URL")) {
            config.reranker.base_url = Some(url);
        }
        if let Some(model) = lookup("RERANKER_MODEL") {
            config.reranker.model = model;
        }
        if let Some(v) = parse(lookup("RERANKER_MAX_LENGTH")) {
            config.reranker.max_length = v;
        }
        if let Some(name) = lookup("RERANKER_TOKENIZER") {
            config.reranker.tokenizer = name;
        }
        if let Some(instruction) = non_empty(lookup("RERANKER_INSTRUCTION")) {
            config.reranker.instruction = Some(instruction);
        }
        if let Some(v) = parse::<u64>(lookup("RERANKER_TIMEOUT_SECS")) {
            config.reranker.timeout_secs = v.min(120);
        }
        if let Some(v) = lookup("RERANKER_WARM_UP") {
            config.reranker.warm_up = matches!(v.as_str(), "1" | "true" | "True");
        }

        // Research
        if let Some(v) = parse::<usize>(lookup("RESEARCH_REFORMULATIONS")) {
            if v > 0 {
                config.research.reformulations = v.min(MAX_REFORMULATIONS);
            }
        }
        if let Some(v) = parse::<usize>(lookup("RESEARCH_TOPK_CONTEXT")) {
            if v > 0 {
                config.research.topk_context = v.min(MAX_TOPK_CONTEXT);
            }
        }
        if let Some(policy) = lookup("RESEARCH_FAILURE_POLICY").and_then(|v| FailurePolicy::parse(&v)) {
            config.research.failure_policy = policy;
        }
        if let Some(v) = parse(lookup("RESEARCH_CALL_TIMEOUT_SECS")) {
            config.research.call_timeout_secs = v;
        }

        config
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ResearchConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

use std::sync::Arc;

use crate::config::Config;
use crate::error::ResearchError;
use crate::llm::reformulate::REFORMULATION_TEMPERATURE;
use crate::llm::{GeneratorFactory, LlmClient};
use crate::rerank::{CompletionClassifier, FixedScorer, RelevanceScorer, Reranker};
use crate::research::{DeepResearch, ResearchOptions, ANSWER_TEMPERATURE};
use crate::search::{TavilyClient, WebSearch};
use crate::store::ChatStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<ChatStore>,
    pub models: Arc<dyn GeneratorFactory>,
    /// None when no search credential is configured.
    pub web_search: Option<Arc<dyn WebSearch>>,
    /// Shared across requests; the reranker loads its state once.
    pub scorer: Arc<dyn RelevanceScorer>,
    pub research_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        let models: Arc<dyn GeneratorFactory> =
            Arc::new(LlmClient::new(http_client.clone(), config.llm.clone()));

        let web_search: Option<Arc<dyn WebSearch>> =
            match TavilyClient::new(http_client.clone(), &config.search) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Web search disabled: {e}");
                    None
                }
            };

        let scorer: Arc<dyn RelevanceScorer> =
            match CompletionClassifier::new(http_client, &config.reranker) {
                Ok(classifier) => Arc::new(Reranker::new(Arc::new(classifier), &config.reranker)),
                Err(e) => {
                    tracing::warn!("{e}; passages keep retrieval order");
                    Arc::new(FixedScorer::uniform(1.0))
                }
            };

        Ok(Self::with_services(config, models, web_search, scorer))
    }

    /// Build state around already-constructed services.
    pub fn with_services(
        config: Config,
        models: Arc<dyn GeneratorFactory>,
        web_search: Option<Arc<dyn WebSearch>>,
        scorer: Arc<dyn RelevanceScorer>,
    ) -> Self {
        Self {
            config,
            store: Arc::new(ChatStore::new()),
            models,
            web_search,
            scorer,
            research_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
        }
    }

    pub fn web_search(&self) -> Result<Arc<dyn WebSearch>, ResearchError> {
        self.web_search.clone().ok_or_else(|| {
            ResearchError::Configuration("TAVILY_API_KEY is not set".to_string())
        })
    }

    /// A Deep Research pipeline over the shared services. Reformulation and
    /// synthesis both use the configured research model.
    pub fn deep_research(&self, options: ResearchOptions) -> Result<DeepResearch, ResearchError> {
        let model = &self.config.llm.chat_model;
        Ok(DeepResearch::new(
            self.models.generator(model, REFORMULATION_TEMPERATURE),
            self.web_search()?,
            self.scorer.clone(),
            self.models.generator(model, ANSWER_TEMPERATURE),
            options,
        ))
    }
}

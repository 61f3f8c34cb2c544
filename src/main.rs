use tracing_subscriber::EnvFilter;

use web_rage::api;
use web_rage::config::Config;
use web_rage::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter()))
        .init();

    let config = Config::from_env();
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!("Research model: {}", config.llm.chat_model);
    match &config.reranker.base_url {
        Some(url) => tracing::info!("Reranker: {} ({})", config.reranker.model, url),
        None => tracing::info!("Reranker: disabled"),
    }

    let state = AppState::new(config.clone())?;

    if config.reranker.warm_up {
        if let Err(e) = state.scorer.warm_up().await {
            tracing::warn!("Reranker warm-up failed: {e}");
        }
    }

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn default_filter() -> EnvFilter {
    let debug = std::env::var("DEBUG").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    EnvFilter::new(if debug { "debug" } else { "info" })
}

mod config;
mod errors;
mod evaluation;
mod llm_client;
mod retrieval;
mod routes;
mod screening;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::evaluation::LlmJudgeEvaluator;
use crate::llm_client::{Embedder, GeminiEmbedder, LanguageModel, LlmClient};
use crate::retrieval::{PdfLoader, TextSplitter};
use crate::routes::build_router;
use crate::screening::ScreeningPipeline;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume-rag-eval v{}", env!("CARGO_PKG_VERSION"));

    let llm: Arc<dyn LanguageModel> = Arc::new(
        LlmClient::new(config.google_api_key.clone(), &config.llm_model)?
            .with_base_url(&config.gemini_api_base),
    );
    info!("LLM client initialized (model: {})", llm.model_id());

    let embedder: Arc<dyn Embedder> = Arc::new(
        GeminiEmbedder::new(config.google_api_key.clone(), &config.embedding_model)?
            .with_base_url(&config.gemini_api_base),
    );
    info!("Embedder initialized (model: {})", embedder.model_id());

    let evaluator = Arc::new(LlmJudgeEvaluator::new(llm.clone(), embedder.clone()));

    let pipeline = ScreeningPipeline::new(
        llm,
        embedder,
        evaluator,
        Arc::new(PdfLoader),
        TextSplitter::new(config.chunk_size, config.chunk_overlap),
        config.index_dir.clone(),
    );
    info!(
        "Index directory: {} (chunk size {}, overlap {})",
        config.index_dir.display(),
        config.chunk_size,
        config.chunk_overlap
    );

    let state = AppState {
        pipeline,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

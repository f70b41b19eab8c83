use pdf_chat::api::{create_router, AppState};
use pdf_chat::application::{ChatSession, IngestionPipeline, QueryPipeline};
use pdf_chat::domain::ports::VectorStore;
use pdf_chat::infrastructure::{
    AppConfig, CouchbaseVectorStore, OpenAiLlm, PdfConverter, TextEmbedding, TimeoutLlm,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_chat=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let app_config = AppConfig::load()?;
    let config = &app_config.config;

    let store: Arc<dyn VectorStore> = Arc::new(CouchbaseVectorStore::from_config(&config.database)?);
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "vector store not reachable yet");
    }

    let embedding = Arc::new(TextEmbedding::from_config(&config.embedding));
    let llm = Arc::new(TimeoutLlm::new(
        Arc::new(OpenAiLlm::from_config(&config.llm)),
        Duration::from_secs(config.llm.timeout_seconds),
    ));
    info!(
        llm = %config.llm.model,
        embedding = %config.embedding.model,
        top_k = config.rag.top_k,
        "models configured"
    );

    let ingestion = IngestionPipeline::with_split(
        Arc::new(PdfConverter::new()),
        embedding.clone(),
        store.clone(),
        config.rag.split_length,
        config.rag.split_overlap,
    );
    let query = QueryPipeline::new(
        embedding,
        store.clone(),
        llm,
        app_config.prompts.rag.clone(),
        config.rag.top_k,
    );
    let session = ChatSession::new(Arc::new(query));

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let state = AppState::new(session, ingestion, store, app_config);
    let app = create_router(state);

    info!("Chat server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::{ChatSession, IngestionPipeline};
use crate::domain::ports::VectorStore;
use crate::infrastructure::AppConfig;

/// Shared handler state. The process serves a single chat session; the
/// mutex makes concurrent turns run one after another.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<ChatSession>>,
    pub ingestion: Arc<IngestionPipeline>,
    pub store: Arc<dyn VectorStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        session: ChatSession,
        ingestion: IngestionPipeline,
        store: Arc<dyn VectorStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            ingestion: Arc::new(ingestion),
            store,
            config: Arc::new(config),
        }
    }
}

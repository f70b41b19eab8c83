//! Application layer - pipelines and the chat session.
//!
//! Everything here depends on domain ports (traits) rather than concrete
//! clients, so the pipelines run the same against hosted services and
//! in-memory fakes.

pub mod ingestion;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod session;

pub use ingestion::{IngestionPipeline, IngestionReport};
pub use pipeline::{Stage, StageExt};
pub use prompt::PromptTemplate;
pub use query::{QueryPipeline, DEFAULT_TOP_K};
pub use session::{ChatSession, SessionState, Turn};

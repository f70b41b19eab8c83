mod converter;
mod embedding;
mod llm;
mod vector_store;

pub use converter::DocumentConverter;
pub use embedding::EmbeddingService;
pub use llm::LlmService;
pub use vector_store::VectorStore;

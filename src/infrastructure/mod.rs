pub mod config;
pub mod converter;
pub mod embedding;
pub mod llm;
pub mod vector_store;

pub use config::{AppConfig, Config, PromptsConfig};
pub use converter::PdfConverter;
pub use embedding::TextEmbedding;
pub use llm::{OpenAiLlm, TimeoutLlm};
pub use vector_store::{CouchbaseVectorStore, InMemoryVectorStore};

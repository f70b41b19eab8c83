use crate::domain::{errors::DomainError, EmbeddedChunk, Embedding, SearchResult};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upserts every chunk and returns how many records were written.
    /// Writes are not atomic: a failure may leave earlier chunks stored.
    async fn write(&self, chunks: &[EmbeddedChunk]) -> Result<usize, DomainError>;

    /// Returns at most `top_k` results ordered by descending score.
    /// Equal scores keep the store's native order.
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn count(&self) -> Result<usize, DomainError>;

    async fn ping(&self) -> Result<(), DomainError>;
}

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::{ports::VectorStore, DomainError, EmbeddedChunk, Embedding, SearchResult};

/// Process-local store, used in tests and when running without a database.
/// Records keep insertion order, which decides ties in `search`.
pub struct InMemoryVectorStore {
    records: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn write(&self, chunks: &[EmbeddedChunk]) -> Result<usize, DomainError> {
        let mut store = self
            .records
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        for record in chunks {
            match store.iter_mut().find(|r| r.chunk.id == record.chunk.id) {
                Some(existing) => *existing = record.clone(),
                None => store.push(record.clone()),
            }
        }
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let store = self
            .records
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let mut results: Vec<SearchResult> = store
            .iter()
            .map(|record| SearchResult {
                chunk: record.chunk.clone(),
                score: query.cosine_similarity(&record.embedding),
            })
            .collect();

        // sort_by is stable, so equal scores stay in insertion order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    async fn count(&self) -> Result<usize, DomainError> {
        let store = self
            .records
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        Ok(store.len())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

//! Upload → convert → clean → split → embed → write.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::application::pipeline::{BoxStage, Stage, StageExt};
use crate::domain::{
    ports::{DocumentConverter, EmbeddingService, VectorStore},
    text::{clean_content, split_by_sentence},
    Document, DocumentChunk, DomainError, EmbeddedChunk, UploadedFile,
};

pub const DEFAULT_SPLIT_LENGTH: usize = 250;
pub const DEFAULT_SPLIT_OVERLAP: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub documents_written: usize,
}

pub struct ConvertStage {
    converter: Arc<dyn DocumentConverter>,
}

impl ConvertStage {
    pub fn new(converter: Arc<dyn DocumentConverter>) -> Self {
        Self { converter }
    }
}

#[async_trait]
impl Stage for ConvertStage {
    type Input = UploadedFile;
    type Output = Vec<Document>;

    #[instrument(name = "stage.convert", skip_all, fields(file = %file.name))]
    async fn run(&self, file: UploadedFile) -> Result<Vec<Document>, DomainError> {
        let documents = self.converter.convert(&file).await?;
        tracing::debug!(documents = documents.len(), "converted");
        Ok(documents)
    }
}

pub struct CleanStage;

#[async_trait]
impl Stage for CleanStage {
    type Input = Vec<Document>;
    type Output = Vec<Document>;

    #[instrument(name = "stage.clean", skip_all, fields(documents = documents.len()))]
    async fn run(&self, documents: Vec<Document>) -> Result<Vec<Document>, DomainError> {
        Ok(documents
            .into_iter()
            .map(|doc| {
                let cleaned = clean_content(&doc.content);
                doc.with_content(cleaned)
            })
            .collect())
    }
}

pub struct SplitStage {
    split_length: usize,
    split_overlap: usize,
}

impl SplitStage {
    pub fn new(split_length: usize, split_overlap: usize) -> Self {
        Self {
            split_length,
            split_overlap,
        }
    }
}

impl Default for SplitStage {
    fn default() -> Self {
        Self::new(DEFAULT_SPLIT_LENGTH, DEFAULT_SPLIT_OVERLAP)
    }
}

#[async_trait]
impl Stage for SplitStage {
    type Input = Vec<Document>;
    type Output = Vec<DocumentChunk>;

    #[instrument(name = "stage.split", skip_all, fields(documents = documents.len()))]
    async fn run(&self, documents: Vec<Document>) -> Result<Vec<DocumentChunk>, DomainError> {
        let mut chunks = Vec::new();
        for doc in &documents {
            chunks.extend(split_by_sentence(doc, self.split_length, self.split_overlap)?);
        }
        tracing::debug!(chunks = chunks.len(), "split");
        Ok(chunks)
    }
}

pub struct EmbedStage {
    embedding: Arc<dyn EmbeddingService>,
}

impl EmbedStage {
    pub fn new(embedding: Arc<dyn EmbeddingService>) -> Self {
        Self { embedding }
    }
}

#[async_trait]
impl Stage for EmbedStage {
    type Input = Vec<DocumentChunk>;
    type Output = Vec<EmbeddedChunk>;

    #[instrument(name = "stage.embed", skip_all, fields(chunks = chunks.len(), model = self.embedding.model()))]
    async fn run(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<EmbeddedChunk>, DomainError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(DomainError::embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = self.embedding.dimension();
        chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| -> Result<EmbeddedChunk, DomainError> {
                embedding.check_dimension(dimension)?;
                Ok(EmbeddedChunk::new(chunk, embedding))
            })
            .collect()
    }
}

pub struct WriteStage {
    store: Arc<dyn VectorStore>,
}

impl WriteStage {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for WriteStage {
    type Input = Vec<EmbeddedChunk>;
    type Output = IngestionReport;

    #[instrument(name = "stage.write", skip_all, fields(chunks = chunks.len()))]
    async fn run(&self, chunks: Vec<EmbeddedChunk>) -> Result<IngestionReport, DomainError> {
        let documents_written = if chunks.is_empty() {
            0
        } else {
            self.store.write(&chunks).await?
        };
        Ok(IngestionReport { documents_written })
    }
}

pub struct IngestionPipeline {
    stages: BoxStage<UploadedFile, IngestionReport>,
}

impl IngestionPipeline {
    pub fn new(
        converter: Arc<dyn DocumentConverter>,
        embedding: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::with_split(
            converter,
            embedding,
            store,
            DEFAULT_SPLIT_LENGTH,
            DEFAULT_SPLIT_OVERLAP,
        )
    }

    pub fn with_split(
        converter: Arc<dyn DocumentConverter>,
        embedding: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
        split_length: usize,
        split_overlap: usize,
    ) -> Self {
        let stages = ConvertStage::new(converter)
            .then(CleanStage)
            .then(SplitStage::new(split_length, split_overlap))
            .then(EmbedStage::new(embedding))
            .then(WriteStage::new(store))
            .boxed();
        Self { stages }
    }

    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn ingest(&self, file: UploadedFile) -> Result<IngestionReport, DomainError> {
        let report = self.stages.run(file).await?;
        tracing::info!(
            documents_written = report.documents_written,
            "PDF loaded into vector store"
        );
        Ok(report)
    }

    /// Spools `bytes` into a fresh temp directory, ingests it, and removes
    /// the directory when done, whether or not ingestion succeeded.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestionReport, DomainError> {
        let name = sanitize_file_name(file_name)?;
        let dir = tempfile::tempdir()
            .map_err(|e| DomainError::internal(format!("failed to create temp dir: {e}")))?;
        let path = dir.path().join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DomainError::internal(format!("failed to write upload: {e}")))?;
        tracing::debug!(temp_dir = %dir.path().display(), "upload spooled");

        self.ingest(UploadedFile::new(name, path)).await
    }
}

fn sanitize_file_name(file_name: &str) -> Result<String, DomainError> {
    let name = std::path::Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." {
        return Err(DomainError::validation("upload has no file name"));
    }
    Ok(name.to_string())
}

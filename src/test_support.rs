//! In-process fakes for the ports, shared by unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    ports::{DocumentConverter, EmbeddingService, LlmService, VectorStore},
    Document, DomainError, EmbeddedChunk, Embedding, Generation, GenerationMeta, SearchResult,
    UploadedFile,
};

/// Bag-of-words embedding: each lowercase word bumps one FNV-1a bucket.
pub struct HashEmbedding {
    dimension: usize,
    drop_last: bool,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            drop_last: false,
        }
    }

    /// Makes `embed_batch` return one vector fewer than asked for.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    fn vector(&self, text: &str) -> Embedding {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| {
                    (h ^ b as u64).wrapping_mul(0x100000001b3)
                });
            v[(hash % self.dimension as u64) as usize] += 1.0;
        }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut out: Vec<Embedding> = texts.iter().map(|t| self.vector(t)).collect();
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hash-bow"
    }
}

/// Records every prompt; replies with a fixed text or echoes the prompt.
#[derive(Default)]
pub struct EchoLlm {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl EchoLlm {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmService for EchoLlm {
    async fn generate(&self, prompt: &str) -> Result<Generation, DomainError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(Generation {
            reply: self
                .reply
                .clone()
                .unwrap_or_else(|| format!("Echo: {prompt}")),
            meta: GenerationMeta {
                model: "echo".to_string(),
                latency_ms: 0,
            },
        })
    }
}

/// Replies "slow" after sleeping, like a model that hangs.
pub struct SlowLlm {
    delay: Duration,
}

impl SlowLlm {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LlmService for SlowLlm {
    async fn generate(&self, _prompt: &str) -> Result<Generation, DomainError> {
        tokio::time::sleep(self.delay).await;
        Ok(Generation {
            reply: "slow".to_string(),
            meta: GenerationMeta::default(),
        })
    }
}

/// Treats the uploaded bytes as UTF-8 text; only `.pdf` names are accepted.
pub struct TextConverter;

#[async_trait]
impl DocumentConverter for TextConverter {
    async fn convert(&self, file: &UploadedFile) -> Result<Vec<Document>, DomainError> {
        if !file.name.to_lowercase().ends_with(".pdf") {
            return Err(DomainError::conversion(format!(
                "{} is not a PDF",
                file.name
            )));
        }
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| DomainError::conversion(e.to_string()))?;
        Ok(vec![Document::new(
            file.name.clone(),
            String::from_utf8_lossy(&bytes).into_owned(),
        )])
    }
}

/// A store whose every call fails, as if the cluster were unreachable.
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn write(&self, _chunks: &[EmbeddedChunk]) -> Result<usize, DomainError> {
        Err(DomainError::storage("store unreachable"))
    }

    async fn search(
        &self,
        _query: &Embedding,
        _top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        Err(DomainError::retrieval("store unreachable"))
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Err(DomainError::storage("store unreachable"))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Err(DomainError::storage("store unreachable"))
    }
}

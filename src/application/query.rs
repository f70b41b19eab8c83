//! Question → (embed → retrieve →) prompt → generate → answer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::application::pipeline::{BoxStage, Stage, StageExt};
use crate::application::prompt::PromptTemplate;
use crate::domain::{
    ports::{EmbeddingService, LlmService, VectorStore},
    Answer, AnswerMode, DomainError, Embedding, Generation, SearchResult,
};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub mode: AnswerMode,
    pub top_k: usize,
}

#[derive(Debug)]
pub struct EmbeddedQuery {
    pub request: QueryRequest,
    pub embedding: Embedding,
}

#[derive(Debug)]
pub struct Retrieved {
    pub request: QueryRequest,
    pub documents: Vec<SearchResult>,
}

impl Retrieved {
    /// Entry point of the ungrounded path, where nothing is retrieved.
    pub fn without_documents(request: QueryRequest) -> Self {
        Self {
            request,
            documents: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct PromptReady {
    pub request: QueryRequest,
    pub documents: Vec<SearchResult>,
    pub prompt: String,
}

#[derive(Debug)]
pub struct Generated {
    pub request: QueryRequest,
    pub documents: Vec<SearchResult>,
    pub prompt: String,
    pub generation: Generation,
}

pub struct EmbedQueryStage {
    embedding: Arc<dyn EmbeddingService>,
}

impl EmbedQueryStage {
    pub fn new(embedding: Arc<dyn EmbeddingService>) -> Self {
        Self { embedding }
    }
}

#[async_trait]
impl Stage for EmbedQueryStage {
    type Input = QueryRequest;
    type Output = EmbeddedQuery;

    #[instrument(name = "stage.embed_query", skip_all)]
    async fn run(&self, request: QueryRequest) -> Result<EmbeddedQuery, DomainError> {
        let embedding = self.embedding.embed(&request.question).await?;
        embedding.check_dimension(self.embedding.dimension())?;
        Ok(EmbeddedQuery { request, embedding })
    }
}

pub struct RetrieveStage {
    store: Arc<dyn VectorStore>,
}

impl RetrieveStage {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    type Input = EmbeddedQuery;
    type Output = Retrieved;

    #[instrument(name = "stage.retrieve", skip_all, fields(top_k = query.request.top_k))]
    async fn run(&self, query: EmbeddedQuery) -> Result<Retrieved, DomainError> {
        let mut documents = self
            .store
            .search(&query.embedding, query.request.top_k)
            .await?;

        // Stable sort: ties keep the order the store returned them in.
        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        documents.truncate(query.request.top_k);
        tracing::debug!(retrieved = documents.len(), "retrieved");

        Ok(Retrieved {
            request: query.request,
            documents,
        })
    }
}

pub struct BuildPromptStage {
    template: PromptTemplate,
}

impl BuildPromptStage {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Stage for BuildPromptStage {
    type Input = Retrieved;
    type Output = PromptReady;

    #[instrument(name = "stage.build_prompt", skip_all, fields(mode = retrieved.request.mode.as_str()))]
    async fn run(&self, retrieved: Retrieved) -> Result<PromptReady, DomainError> {
        let Retrieved { request, documents } = retrieved;
        let prompt = match request.mode {
            AnswerMode::Grounded => self.template.render_grounded(&request.question, &documents),
            AnswerMode::Ungrounded => self.template.render_ungrounded(&request.question),
        };

        Ok(PromptReady {
            request,
            documents,
            prompt,
        })
    }
}

pub struct GenerateStage {
    llm: Arc<dyn LlmService>,
}

impl GenerateStage {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for GenerateStage {
    type Input = PromptReady;
    type Output = Generated;

    #[instrument(name = "stage.generate", skip_all)]
    async fn run(&self, ready: PromptReady) -> Result<Generated, DomainError> {
        let generation = self.llm.generate(&ready.prompt).await?;
        if generation.reply.trim().is_empty() {
            return Err(DomainError::generation("model returned an empty reply"));
        }
        tracing::debug!(
            model = %generation.meta.model,
            latency_ms = generation.meta.latency_ms,
            "generated"
        );

        Ok(Generated {
            request: ready.request,
            documents: ready.documents,
            prompt: ready.prompt,
            generation,
        })
    }
}

pub struct BuildAnswerStage;

#[async_trait]
impl Stage for BuildAnswerStage {
    type Input = Generated;
    type Output = Answer;

    async fn run(&self, generated: Generated) -> Result<Answer, DomainError> {
        Ok(Answer {
            data: generated.generation.reply,
            query: generated.request.question,
            mode: generated.request.mode,
            documents: generated.documents,
            prompt: generated.prompt,
            meta: generated.generation.meta,
        })
    }
}

/// Both invocation modes over one set of stages. The ungrounded path
/// shares prompt, generation and answer building with the grounded path
/// but never touches the embedding service or the vector store.
pub struct QueryPipeline {
    grounded: BoxStage<QueryRequest, Answer>,
    ungrounded: BoxStage<Retrieved, Answer>,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmService>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        let prompt = Arc::new(BuildPromptStage::new(template));
        let generate = Arc::new(GenerateStage::new(llm));
        let answer = Arc::new(BuildAnswerStage);

        let grounded = EmbedQueryStage::new(embedding)
            .then(RetrieveStage::new(store))
            .then(prompt.clone())
            .then(generate.clone())
            .then(answer.clone())
            .boxed();
        let ungrounded = prompt.then(generate).then(answer).boxed();

        Self {
            grounded,
            ungrounded,
            top_k,
        }
    }

    #[instrument(skip(self), fields(mode = mode.as_str()))]
    pub async fn ask(&self, question: &str, mode: AnswerMode) -> Result<Answer, DomainError> {
        let request = QueryRequest {
            question: question.to_string(),
            mode,
            top_k: self.top_k,
        };

        match mode {
            AnswerMode::Grounded => self.grounded.run(request).await,
            AnswerMode::Ungrounded => {
                self.ungrounded
                    .run(Retrieved::without_documents(request))
                    .await
            }
        }
    }

    pub async fn grounded(&self, question: &str) -> Result<Answer, DomainError> {
        self.ask(question, AnswerMode::Grounded).await
    }

    pub async fn ungrounded(&self, question: &str) -> Result<Answer, DomainError> {
        self.ask(question, AnswerMode::Ungrounded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::IngestionPipeline;
    use crate::infrastructure::vector_store::InMemoryVectorStore;
    use crate::test_support::{EchoLlm, FailingStore, HashEmbedding, TextConverter};

    struct Fixture {
        store: Arc<InMemoryVectorStore>,
        llm: Arc<EchoLlm>,
        ingestion: IngestionPipeline,
        query: QueryPipeline,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedding = Arc::new(HashEmbedding::new(64));
        let llm = Arc::new(EchoLlm::default());
        Fixture {
            ingestion: IngestionPipeline::with_split(
                Arc::new(TextConverter),
                embedding.clone(),
                store.clone(),
                1,
                0,
            ),
            query: QueryPipeline::new(
                embedding,
                store.clone(),
                llm.clone(),
                PromptTemplate::default(),
                DEFAULT_TOP_K,
            ),
            store,
            llm,
        }
    }

    #[tokio::test]
    async fn test_grounded_prompt_contains_retrieved_chunk() {
        let f = fixture();
        f.ingestion
            .ingest_bytes("couchbase.pdf", b"Couchbase is a database.\x0cPage two text.")
            .await
            .unwrap();

        let answer = f.query.grounded("Couchbase is a database.").await.unwrap();

        assert_eq!(answer.mode, AnswerMode::Grounded);
        assert_eq!(answer.query, "Couchbase is a database.");
        assert!(answer.prompt.contains("Couchbase is a database."));
        assert_eq!(answer.documents[0].chunk.content.trim(), "Couchbase is a database.");
        assert!(f.llm.last_prompt().unwrap().contains("context below"));
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_descending_score_and_caps_at_top_k() {
        let f = fixture();
        f.ingestion
            .ingest_bytes("a.pdf", b"Alpha. Beta. Gamma. Delta. Epsilon.")
            .await
            .unwrap();

        let answer = f.query.grounded("Gamma.").await.unwrap();

        assert_eq!(answer.documents.len(), 3);
        assert!(answer
            .documents
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert_eq!(answer.documents[0].chunk.content.trim(), "Gamma.");
    }

    #[tokio::test]
    async fn test_retrieve_returns_fewer_when_corpus_is_small() {
        let f = fixture();
        f.ingestion.ingest_bytes("a.pdf", b"Only one.").await.unwrap();

        let answer = f.query.grounded("anything").await.unwrap();
        assert_eq!(answer.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_ungrounded_works_with_empty_store() {
        let f = fixture();
        assert_eq!(f.store.count().await.unwrap(), 0);

        let answer = f.query.ungrounded("What is Couchbase?").await.unwrap();

        assert_eq!(answer.mode, AnswerMode::Ungrounded);
        assert!(answer.documents.is_empty());
        assert!(!answer.prompt.contains("context below"));
        assert!(answer.data.contains("What is Couchbase?"));
    }

    #[tokio::test]
    async fn test_ungrounded_never_touches_the_store() {
        let query = QueryPipeline::new(
            Arc::new(HashEmbedding::new(8)),
            Arc::new(FailingStore),
            Arc::new(EchoLlm::default()),
            PromptTemplate::default(),
            DEFAULT_TOP_K,
        );

        assert!(query.ungrounded("q?").await.is_ok());
        let err = query.grounded("q?").await.unwrap_err();
        assert!(matches!(err, DomainError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_generation_error() {
        let query = QueryPipeline::new(
            Arc::new(HashEmbedding::new(8)),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(EchoLlm::replying("   ")),
            PromptTemplate::default(),
            DEFAULT_TOP_K,
        );

        let err = query.ungrounded("q?").await.unwrap_err();
        assert!(matches!(err, DomainError::Generation(_)));
    }
}

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    ports::VectorStore, ChunkMetadata, DocumentChunk, DomainError, EmbeddedChunk, Embedding,
    SearchResult,
};
use crate::infrastructure::config::{DatabaseConfig, Secret};

/// Records per UPSERT statement.
const WRITE_BATCH: usize = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the Query and Search services of one cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub query: String,
    pub search: String,
}

impl Endpoints {
    /// `couchbases://host` maps to the TLS ports, `couchbase://host` to the
    /// plain ones. Only the first host of a multi-host string is used.
    ///
    /// The host is dialed directly. Hosted clusters such as Capella publish
    /// `cb.<id>.cloud.couchbase.com` as a DNS SRV name with no A record, so
    /// point `DB_CONN_STR` at one node's address for those.
    pub fn from_connection_string(conn: &str) -> Result<Self, DomainError> {
        let conn = conn.trim();
        let (rest, tls) = if let Some(rest) = conn.strip_prefix("couchbases://") {
            (rest, true)
        } else if let Some(rest) = conn.strip_prefix("couchbase://") {
            (rest, false)
        } else {
            return Err(DomainError::configuration(format!(
                "DB_CONN_STR must start with couchbase:// or couchbases://, got {conn:?}"
            )));
        };

        let host = rest
            .split([',', '/', '?'])
            .next()
            .map(|h| h.split(':').next().unwrap_or(h))
            .unwrap_or_default();
        if host.is_empty() {
            return Err(DomainError::configuration("DB_CONN_STR has no host"));
        }

        let (scheme, query_port, search_port) = if tls {
            ("https", 18093, 18094)
        } else {
            ("http", 8093, 8094)
        };
        Ok(Self {
            query: format!("{scheme}://{host}:{query_port}"),
            search: format!("{scheme}://{host}:{search_port}"),
        })
    }
}

/// Chunk document as stored in the collection. Field names follow the
/// layout the vector search index maps (`text`, `embedding`, `metadata`).
#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: ChunkMetadata,
    document_id: Uuid,
    #[serde(default)]
    chunk_index: usize,
}

#[derive(Debug, Deserialize)]
struct FetchedRecord {
    id: String,
    #[serde(flatten)]
    record: ChunkRecord,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    statement: &'a str,
    args: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    #[serde(default)]
    status: String,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    errors: Vec<QueryError>,
    #[serde(default)]
    metrics: QueryMetrics,
}

#[derive(Debug, Deserialize)]
struct QueryError {
    code: i64,
    msg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryMetrics {
    #[serde(default)]
    mutation_count: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    score: f64,
}

/// Vector store on a Couchbase collection with a vector search index.
/// Chunks are written through the Query service with a per-document
/// expiry and found through a kNN request to the Search service.
pub struct CouchbaseVectorStore {
    client: Client,
    endpoints: Endpoints,
    username: String,
    password: Secret,
    bucket: String,
    scope: String,
    collection: String,
    index_name: String,
    ttl_seconds: u64,
}

impl CouchbaseVectorStore {
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let endpoints = Endpoints::from_connection_string(&config.connection_string)?;
        Self::new(endpoints, config)
    }

    /// Uses the given service URLs instead of the connection string.
    pub fn new(endpoints: Endpoints, config: &DatabaseConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DomainError::configuration(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            query = %endpoints.query,
            bucket = %config.bucket,
            scope = %config.scope,
            collection = %config.collection,
            index = %config.index_name,
            "Couchbase vector store configured"
        );

        Ok(Self {
            client,
            endpoints,
            username: config.username.clone(),
            password: config.password.clone(),
            bucket: config.bucket.clone(),
            scope: config.scope.clone(),
            collection: config.collection.clone(),
            index_name: config.index_name.clone(),
            ttl_seconds: config.document_ttl_seconds,
        })
    }

    fn keyspace(&self) -> String {
        keyspace(&self.bucket, &self.scope, &self.collection)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose()))
    }

    async fn query<T: DeserializeOwned>(
        &self,
        statement: &str,
        args: &[Value],
        to_error: fn(String) -> DomainError,
    ) -> Result<QueryResponse<T>, DomainError> {
        let url = format!("{}/query/service", self.endpoints.query);
        let response = self
            .authed(self.client.post(&url))
            .json(&QueryRequest { statement, args })
            .send()
            .await
            .map_err(|e| to_error(format!("query service unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| to_error(format!("failed to read query response: {e}")))?;
        let parsed: QueryResponse<T> = serde_json::from_str(&body).map_err(|e| {
            to_error(format!("unexpected query response ({status}): {e}: {body}"))
        })?;

        if !status.is_success() || parsed.status != "success" || !parsed.errors.is_empty() {
            let detail = parsed
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.msg))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(to_error(format!(
                "query failed ({status}, {}): {detail}",
                parsed.status
            )));
        }
        Ok(parsed)
    }

    async fn fetch(&self, keys: &[String]) -> Result<HashMap<String, ChunkRecord>, DomainError> {
        let statement = format!(
            "SELECT META(d).id AS id, d.text, d.metadata, d.document_id, d.chunk_index \
             FROM {} AS d USE KEYS $1",
            self.keyspace()
        );
        let response: QueryResponse<FetchedRecord> = self
            .query(&statement, &[json!(keys)], DomainError::Retrieval)
            .await?;

        Ok(response
            .results
            .into_iter()
            .map(|f| (f.id, f.record))
            .collect())
    }
}

fn keyspace(bucket: &str, scope: &str, collection: &str) -> String {
    format!("`{bucket}`.`{scope}`.`{collection}`")
}

/// One UPSERT for a batch; each row binds key, value and options.
fn upsert_statement(keyspace: &str, rows: usize) -> String {
    let values = (0..rows)
        .map(|i| format!("(${}, ${}, ${})", i * 3 + 1, i * 3 + 2, i * 3 + 3))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPSERT INTO {keyspace} (KEY, VALUE, OPTIONS) VALUES {values}")
}

fn upsert_args(chunks: &[EmbeddedChunk], ttl_seconds: u64) -> Result<Vec<Value>, DomainError> {
    let options = json!({ "expiration": ttl_seconds });
    let mut args = Vec::with_capacity(chunks.len() * 3);
    for record in chunks {
        let value = serde_json::to_value(ChunkRecord {
            text: record.chunk.content.clone(),
            embedding: record.embedding.as_slice().to_vec(),
            metadata: record.chunk.metadata.clone(),
            document_id: record.chunk.document_id,
            chunk_index: record.chunk.chunk_index,
        })
        .map_err(|e| DomainError::internal(e.to_string()))?;
        args.push(Value::String(record.chunk.id.to_string()));
        args.push(value);
        args.push(options.clone());
    }
    Ok(args)
}

fn knn_request(query: &Embedding, top_k: usize) -> Value {
    json!({
        "query": { "match_none": {} },
        "knn": [{
            "field": "embedding",
            "vector": query.as_slice(),
            "k": top_k,
        }],
        "size": top_k,
    })
}

/// Joins search hits with their fetched records. Hits whose record expired
/// between the two calls are dropped.
fn assemble_results(
    hits: Vec<SearchHit>,
    mut records: HashMap<String, ChunkRecord>,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .filter_map(|hit| {
            let record = records.remove(&hit.id)?;
            let id = match Uuid::parse_str(&hit.id) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(key = %hit.id, "skipping record with non-UUID key");
                    return None;
                }
            };
            Some(SearchResult {
                chunk: DocumentChunk {
                    id,
                    document_id: record.document_id,
                    content: record.text,
                    chunk_index: record.chunk_index,
                    metadata: record.metadata,
                },
                score: hit.score as f32,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

#[async_trait]
impl VectorStore for CouchbaseVectorStore {
    #[tracing::instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    async fn write(&self, chunks: &[EmbeddedChunk]) -> Result<usize, DomainError> {
        let keyspace = self.keyspace();
        let mut written = 0;

        for batch in chunks.chunks(WRITE_BATCH) {
            let statement = upsert_statement(&keyspace, batch.len());
            let args = upsert_args(batch, self.ttl_seconds)?;
            let response: QueryResponse<Value> = self
                .query(&statement, &args, DomainError::Storage)
                .await?;
            written += response.metrics.mutation_count;
            tracing::debug!(written, "upserted batch");
        }

        Ok(written)
    }

    #[tracing::instrument(skip(self, query))]
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/api/bucket/{}/scope/{}/index/{}/query",
            self.endpoints.search, self.bucket, self.scope, self.index_name
        );
        let response = self
            .authed(self.client.post(&url))
            .json(&knn_request(query, top_k))
            .send()
            .await
            .map_err(|e| DomainError::retrieval(format!("search service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::retrieval(format!(
                "vector search on index {} failed ({status}): {body}",
                self.index_name
            )));
        }
        let hits = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| DomainError::retrieval(format!("unexpected search response: {e}")))?
            .hits;

        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let records = self.fetch(&keys).await?;

        Ok(assemble_results(hits, records, top_k))
    }

    async fn count(&self) -> Result<usize, DomainError> {
        let statement = format!("SELECT RAW COUNT(*) FROM {}", self.keyspace());
        let response: QueryResponse<usize> = self
            .query(&statement, &[], DomainError::Storage)
            .await?;
        Ok(response.results.into_iter().next().unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let url = format!("{}/admin/ping", self.endpoints.query);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| DomainError::storage(format!("query service unreachable: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(DomainError::storage(
                "Couchbase rejected the credentials in DB_USERNAME/DB_PASSWORD",
            )),
            status => Err(DomainError::storage(format!(
                "query service ping failed ({status})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn database_config() -> DatabaseConfig {
        DatabaseConfig {
            connection_string: "couchbase://localhost".into(),
            username: "admin".into(),
            password: Secret::new("password"),
            bucket: "pdf".into(),
            scope: "_default".into(),
            collection: "docs".into(),
            index_name: "pdf_search".into(),
            document_ttl_seconds: 3600,
        }
    }

    /// Serves `router` on a local port and points a store at it.
    async fn store_at(router: Router, config: &DatabaseConfig) -> CouchbaseVectorStore {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let endpoints = Endpoints {
            query: base.clone(),
            search: base,
        };
        let mut store = CouchbaseVectorStore::new(endpoints, config).unwrap();
        store.client = Client::builder().no_proxy().build().unwrap();
        store
    }

    fn embedded(n: usize) -> Vec<EmbeddedChunk> {
        let doc_id = Uuid::new_v4();
        (0..n)
            .map(|i| {
                EmbeddedChunk::new(
                    DocumentChunk::new(doc_id, format!("chunk {i}"), i),
                    Embedding::new(vec![1.0, 0.0]),
                )
            })
            .collect()
    }

    #[test]
    fn test_endpoints_for_tls_connection_string() {
        let endpoints =
            Endpoints::from_connection_string("couchbases://cb.example.cloud.couchbase.com")
                .unwrap();
        assert_eq!(endpoints.query, "https://cb.example.cloud.couchbase.com:18093");
        assert_eq!(endpoints.search, "https://cb.example.cloud.couchbase.com:18094");
    }

    #[test]
    fn test_endpoints_use_first_host_without_port() {
        let endpoints =
            Endpoints::from_connection_string("couchbase://10.0.0.1:11210,10.0.0.2?timeout=5")
                .unwrap();
        assert_eq!(endpoints.query, "http://10.0.0.1:8093");
        assert_eq!(endpoints.search, "http://10.0.0.1:8094");
    }

    #[test]
    fn test_endpoints_reject_other_schemes() {
        for conn in ["http://localhost", "localhost", "couchbase://"] {
            assert!(
                matches!(
                    Endpoints::from_connection_string(conn),
                    Err(DomainError::Configuration(_))
                ),
                "{conn} should be rejected"
            );
        }
    }

    #[test]
    fn test_upsert_statement_binds_three_args_per_row() {
        let statement = upsert_statement(&keyspace("pdf", "shared", "docs"), 2);
        assert_eq!(
            statement,
            "UPSERT INTO `pdf`.`shared`.`docs` (KEY, VALUE, OPTIONS) VALUES ($1, $2, $3), ($4, $5, $6)"
        );
    }

    #[test]
    fn test_upsert_args_carry_ttl_and_vector() {
        let chunk = DocumentChunk::new(Uuid::new_v4(), "Couchbase is a database.", 0)
            .with_metadata(ChunkMetadata {
                source: "couchbase.pdf".into(),
                page_number: 1,
                split_idx_start: 0,
            });
        let key = chunk.id.to_string();
        let record = EmbeddedChunk::new(chunk, Embedding::new(vec![0.5, 0.25]));

        let args = upsert_args(&[record], 3600).unwrap();

        assert_eq!(args.len(), 3);
        assert_eq!(args[0], Value::String(key));
        assert_eq!(args[1]["text"], "Couchbase is a database.");
        assert_eq!(args[1]["embedding"], json!([0.5, 0.25]));
        assert_eq!(args[1]["metadata"]["source"], "couchbase.pdf");
        assert_eq!(args[2], json!({ "expiration": 3600 }));
    }

    #[test]
    fn test_knn_request_targets_embedding_field() {
        let body = knn_request(&Embedding::new(vec![1.0, 0.0]), 3);
        assert_eq!(body["knn"][0]["field"], "embedding");
        assert_eq!(body["knn"][0]["k"], 3);
        assert_eq!(body["size"], 3);
    }

    #[test]
    fn test_assemble_results_orders_and_drops_missing() {
        let doc_id = Uuid::new_v4();
        let a = Uuid::new_v4().to_string();
        let b = Uuid::new_v4().to_string();
        let gone = Uuid::new_v4().to_string();

        let record = |text: &str| ChunkRecord {
            text: text.into(),
            embedding: Vec::new(),
            metadata: ChunkMetadata::default(),
            document_id: doc_id,
            chunk_index: 0,
        };
        let records = HashMap::from([(a.clone(), record("low")), (b.clone(), record("high"))]);
        let hits = vec![
            SearchHit { id: a, score: 0.2 },
            SearchHit { id: gone, score: 0.9 },
            SearchHit { id: b, score: 0.8 },
        ];

        let results = assemble_results(hits, records, 3);

        let texts: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["high", "low"]);
    }

    #[test]
    fn test_query_response_parses_mutation_count() {
        let raw = r#"{"status":"success","results":[],"metrics":{"elapsedTime":"1ms","mutationCount":4}}"#;
        let parsed: QueryResponse<Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.metrics.mutation_count, 4);
        assert!(parsed.errors.is_empty());
    }

    #[tokio::test]
    async fn test_write_sums_mutation_counts_across_batches() {
        let statements = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen = statements.clone();
        let router = Router::new().route(
            "/query/service",
            post(move |Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    let rows = body["args"].as_array().map_or(0, |a| a.len() / 3);
                    let statement = body["statement"].as_str().unwrap_or_default().to_string();
                    seen.lock().unwrap().push(statement);
                    Json(json!({
                        "status": "success",
                        "results": [],
                        "metrics": { "mutationCount": rows },
                    }))
                }
            }),
        );
        let store = store_at(router, &database_config()).await;

        let written = store.write(&embedded(WRITE_BATCH + 6)).await.unwrap();

        assert_eq!(written, WRITE_BATCH + 6);
        let statements = statements.lock().unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPSERT INTO `pdf`.`_default`.`docs`"));
    }

    #[tokio::test]
    async fn test_query_errors_fail_the_write() {
        let router = Router::new().route(
            "/query/service",
            post(|| async {
                Json(json!({
                    "status": "fatal",
                    "errors": [{ "code": 3000, "msg": "syntax error - at UPSERT" }],
                }))
            }),
        );
        let store = store_at(router, &database_config()).await;

        let err = store.write(&embedded(1)).await.unwrap_err();

        assert!(matches!(err, DomainError::Storage(_)));
        assert!(err.to_string().contains("[3000] syntax error"));
    }

    #[tokio::test]
    async fn test_non_success_status_fails_the_count() {
        let router = Router::new().route(
            "/query/service",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "status": "errors", "results": [] })),
                )
            }),
        );
        let store = store_at(router, &database_config()).await;

        let err = store.count().await.unwrap_err();

        assert!(matches!(err, DomainError::Storage(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_count_reads_raw_result() {
        let router = Router::new().route(
            "/query/service",
            post(|| async { Json(json!({ "status": "success", "results": [7] })) }),
        );
        let store = store_at(router, &database_config()).await;

        assert_eq!(store.count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_search_joins_hits_with_fetched_records() {
        let doc_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let knn = Arc::new(Mutex::new(Value::Null));
        let seen = knn.clone();

        let router = Router::new()
            .route(
                "/api/bucket/pdf/scope/_default/index/pdf_search/query",
                post(move |Json(body): Json<Value>| {
                    let seen = seen.clone();
                    async move {
                        *seen.lock().unwrap() = body;
                        Json(json!({
                            "hits": [
                                { "id": first.to_string(), "score": 0.9 },
                                { "id": second.to_string(), "score": 0.4 },
                            ],
                        }))
                    }
                }),
            )
            .route(
                "/query/service",
                post(move || async move {
                    Json(json!({
                        "status": "success",
                        "results": [
                            {
                                "id": second.to_string(),
                                "text": "It stores JSON.",
                                "metadata": { "source": "a.pdf", "page_number": 2, "split_idx_start": 25 },
                                "document_id": doc_id,
                                "chunk_index": 1,
                            },
                            {
                                "id": first.to_string(),
                                "text": "Couchbase is a database.",
                                "metadata": { "source": "a.pdf", "page_number": 1, "split_idx_start": 0 },
                                "document_id": doc_id,
                                "chunk_index": 0,
                            },
                        ],
                    }))
                }),
            );
        let store = store_at(router, &database_config()).await;

        let results = store
            .search(&Embedding::new(vec![1.0, 0.0]), 3)
            .await
            .unwrap();

        let texts: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["Couchbase is a database.", "It stores JSON."]);
        assert_eq!(results[0].chunk.id, first);
        assert!((results[0].score - 0.9).abs() < 1e-6);
        assert_eq!(results[1].chunk.metadata.page_number, 2);
        assert_eq!(results[1].chunk.document_id, doc_id);
        assert_eq!(knn.lock().unwrap()["knn"][0]["k"], 3);
    }

    #[tokio::test]
    async fn test_search_failure_is_a_retrieval_error() {
        let router = Router::new().route(
            "/api/bucket/pdf/scope/_default/index/pdf_search/query",
            post(|| async { (StatusCode::BAD_REQUEST, "no such index") }),
        );
        let store = store_at(router, &database_config()).await;

        let err = store
            .search(&Embedding::new(vec![1.0, 0.0]), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Retrieval(_)));
        assert!(err.to_string().contains("pdf_search"));
    }

    #[tokio::test]
    async fn test_ping_sends_credentials_and_maps_401() {
        let router = Router::new().route(
            "/admin/ping",
            get(|headers: HeaderMap| async move {
                // admin:password
                match headers.get(header::AUTHORIZATION) {
                    Some(v) if v == "Basic YWRtaW46cGFzc3dvcmQ=" => StatusCode::OK,
                    _ => StatusCode::UNAUTHORIZED,
                }
            }),
        );

        let store = store_at(router.clone(), &database_config()).await;
        assert!(store.ping().await.is_ok());

        let mut wrong = database_config();
        wrong.password = Secret::new("hunter2");
        let err = store_at(router, &wrong).await.ping().await.unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
        assert!(err.to_string().contains("credentials"));
    }
}

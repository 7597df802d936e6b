//! Chroma vector store retriever.
//!
//! Talks to a Chroma server over its v1 REST API: resolve the collection id
//! once, then embed each query and run a nearest-neighbour query with
//! `documents` and `distances` included.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::embeddings::EmbeddingClient;
use super::errors::RetrievalError;
use super::format::{format_documents, RetrievedDocument};
use super::types::{Retriever, SearchRequest};
use crate::inference::config::RetrieverConfig;

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Chroma returns one inner list per query embedding; we always send one.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl QueryResponse {
    fn into_documents(self) -> Vec<RetrievedDocument> {
        let docs = self
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let distances = self
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        docs.into_iter()
            .enumerate()
            .filter_map(|(i, content)| {
                Some(RetrievedDocument {
                    content: content?,
                    score: distances.get(i).copied().flatten(),
                })
            })
            .collect()
    }
}

/// Translate a flat key→scalar filter into a Chroma `where` clause.
///
/// Chroma only accepts a single field per clause, so several keys are
/// wrapped in `$and`.
fn where_clause(filter: &BTreeMap<String, serde_json::Value>) -> Option<serde_json::Value> {
    let clauses: Vec<serde_json::Value> = filter
        .iter()
        .map(|(k, v)| {
            let mut clause = serde_json::Map::new();
            clause.insert(k.clone(), v.clone());
            serde_json::Value::Object(clause)
        })
        .collect();
    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(serde_json::json!({ "$and": clauses })),
    }
}

/// Classify a failed collection lookup.
///
/// A missing collection is reported in the body ("Collection x does not
/// exist"), with 404 on recent v1 builds and 500 on older ones. A 404 or
/// 410 without that text means the server does not serve the v1 routes.
fn lookup_error(collection: &str, url: &str, status: u16, body: String) -> RetrievalError {
    if body.contains("does not exist") {
        return RetrievalError::CollectionNotFound {
            name: collection.to_string(),
        };
    }
    if matches!(status, 404 | 410) {
        return RetrievalError::HttpError {
            status,
            body: format!("chroma server does not serve the v1 API at {url} (requires 0.4.x to 0.6.x): {body}"),
        };
    }
    RetrievalError::HttpError { status, body }
}

/// [`Retriever`] backed by a Chroma collection.
pub struct ChromaRetriever {
    http: HttpClient,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
    embedder: Arc<EmbeddingClient>,
}

impl ChromaRetriever {
    pub fn from_config(config: &RetrieverConfig) -> Result<Self, RetrievalError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let embedder = EmbeddingClient::new(
            &config.embedding_url,
            &config.embedding_model,
            config.embedding_api_key.clone(),
            timeout,
        )?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.chroma_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            collection_id: OnceCell::new(),
            embedder: Arc::new(embedder),
        })
    }

    /// Look up the collection id, caching it after the first success.
    async fn collection_id(&self) -> Result<&str, RetrievalError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);
                let response = self.http.get(&url).send().await.map_err(|e| {
                    RetrievalError::RequestFailed {
                        reason: format!("collection lookup at {url}: {e}"),
                    }
                })?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(lookup_error(&self.collection, &url, status, body));
                }

                let info: CollectionInfo =
                    response
                        .json()
                        .await
                        .map_err(|e| RetrievalError::RequestFailed {
                            reason: format!("failed to parse collection info: {e}"),
                        })?;
                tracing::info!(collection = %self.collection, id = %info.id, "resolved chroma collection");
                Ok(info.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn query(
        &self,
        embedding: Vec<f32>,
        request: &SearchRequest,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let id = self.collection_id().await?;
        let url = format!("{}/api/v1/collections/{id}/query", self.base_url);

        let mut body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": request.top_k,
            "include": ["documents", "distances"],
        });
        if let Some(clause) = where_clause(&request.metadata_filter) {
            body["where"] = clause;
        }

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::RequestFailed {
                reason: format!("chroma query at {url}: {e}"),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::HttpError { status, body });
        }

        let parsed: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::RequestFailed {
                    reason: format!("failed to parse chroma query response: {e}"),
                })?;
        Ok(parsed.into_documents())
    }
}

#[async_trait]
impl Retriever for ChromaRetriever {
    async fn search(&self, request: &SearchRequest) -> Result<String, RetrievalError> {
        let started = Instant::now();
        let embedding = self.embedder.embed_query(&request.query).await?;
        let docs = self.query(embedding, request).await?;

        tracing::info!(
            collection = %self.collection,
            top_k = request.top_k,
            with_score = request.with_score,
            filter_keys = request.metadata_filter.len(),
            hits = docs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval complete"
        );
        Ok(format_documents(&docs, request.with_score))
    }
}

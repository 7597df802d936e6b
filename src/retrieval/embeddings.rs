//! Query embedding over an OpenAI-compatible `/embeddings` endpoint.
//!
//! Vectors are L2-normalized to match how the collection was ingested.
//! Some local servers return per-token embeddings (`number[][]`); those are
//! mean-pooled first.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::errors::RetrievalError;

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

/// HTTP client for one embedding model.
pub struct EmbeddingClient {
    http: HttpClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors.pop().ok_or(RetrievalError::EmptyEmbedding { count: 1 })
    }

    /// Embed a batch, returning vectors in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let url = format!("{}/embeddings", self.endpoint);
        let body = serde_json::json!({ "model": self.model, "input": texts });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RetrievalError::RequestFailed {
                reason: format!("embedding request to {url}: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::HttpError { status, body });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::RequestFailed {
                    reason: format!("failed to parse embedding response: {e}"),
                })?;

        if parsed.data.len() != texts.len() {
            return Err(RetrievalError::EmptyEmbedding { count: texts.len() });
        }

        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);
        items
            .iter()
            .map(|item| pool_embedding(&item.embedding).map(l2_normalize))
            .collect()
    }
}

/// Accept `number[]` as-is and mean-pool `number[][]`.
fn pool_embedding(embedding: &serde_json::Value) -> Result<Vec<f32>, RetrievalError> {
    let invalid = || RetrievalError::RequestFailed {
        reason: "unexpected embedding format (expected number[] or number[][])".into(),
    };
    let rows = embedding.as_array().ok_or_else(invalid)?;

    if rows.first().map_or(false, |v| v.is_array()) {
        let tokens: Vec<Vec<f32>> = rows
            .iter()
            .map(|row| to_vector(row).ok_or_else(invalid))
            .collect::<Result<_, _>>()?;
        let dim = tokens.first().map_or(0, Vec::len);
        if dim == 0 || tokens.iter().any(|t| t.len() != dim) {
            return Err(invalid());
        }
        let mut mean = vec![0.0f32; dim];
        for token in &tokens {
            for (acc, x) in mean.iter_mut().zip(token) {
                *acc += x;
            }
        }
        let n = tokens.len() as f32;
        mean.iter_mut().for_each(|x| *x /= n);
        Ok(mean)
    } else {
        let vector = to_vector(embedding).ok_or_else(invalid)?;
        if vector.is_empty() {
            return Err(RetrievalError::EmptyEmbedding { count: 1 });
        }
        Ok(vector)
    }
}

fn to_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_embedding_passthrough() {
        let v = pool_embedding(&json!([0.5, 1.0, -0.25])).unwrap();
        assert_eq!(v, vec![0.5, 1.0, -0.25]);
    }

    #[test]
    fn test_per_token_embedding_mean_pooled() {
        let v = pool_embedding(&json!([[1.0, 2.0], [3.0, 4.0]])).unwrap();
        assert_eq!(v, vec![2.0, 3.0]);
    }

    #[test]
    fn test_ragged_per_token_embedding_rejected() {
        assert!(pool_embedding(&json!([[1.0, 2.0], [3.0]])).is_err());
    }

    #[test]
    fn test_non_numeric_embedding_rejected() {
        assert!(pool_embedding(&json!(["a", "b"])).is_err());
        assert!(pool_embedding(&json!({"x": 1})).is_err());
    }

    #[test]
    fn test_empty_embedding_rejected() {
        assert!(matches!(
            pool_embedding(&json!([])),
            Err(RetrievalError::EmptyEmbedding { .. })
        ));
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}

use crate::error::VectorStoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct UpsertItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// One logical index per domain; upsert + top-k cosine query with
/// metadata (§4.2). The concrete backend (managed vector store service)
/// is reached over HTTP, bearer-token auth, JSON request/response —
/// swappable via `base_url`/`api_key` without touching caller code.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Idempotent; creates the index if absent.
    async fn ensure_index(&self, name: &str, dim: usize) -> Result<(), VectorStoreError>;

    /// Batched, atomic per call.
    async fn upsert(&self, name: &str, items: Vec<UpsertItem>) -> Result<(), VectorStoreError>;

    /// Ordered by descending score.
    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError>;
}

pub struct HttpVectorIndexClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpVectorIndexClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, path: &str, body: Value) -> Result<Value, VectorStoreError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(VectorStoreError::RateLimited);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VectorStoreError::IndexNotFound(path.to_string()));
        }
        if status.is_client_error() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(VectorStoreError::BadRequest(detail));
        }
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl VectorIndexClient for HttpVectorIndexClient {
    async fn ensure_index(&self, name: &str, dim: usize) -> Result<(), VectorStoreError> {
        tracing::info!(index = name, dim, "ensuring vector index exists");
        self.send(
            "/indexes",
            serde_json::json!({ "name": name, "dimension": dim, "metric": "cosine" }),
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, name: &str, items: Vec<UpsertItem>) -> Result<(), VectorStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        tracing::debug!(index = name, count = items.len(), "upserting vectors");
        self.send(
            &format!("/indexes/{name}/upsert"),
            serde_json::json!({ "vectors": items }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let resp = self
            .send(
                &format!("/indexes/{name}/query"),
                serde_json::json!({
                    "vector": vector,
                    "top_k": top_k,
                    "include_metadata": true,
                }),
            )
            .await?;

        let matches = resp
            .get("matches")
            .cloned()
            .ok_or_else(|| VectorStoreError::BadResponse("missing `matches` field".into()))?;
        serde_json::from_value(matches)
            .map_err(|e| VectorStoreError::BadResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn empty_upsert_is_a_no_op() {
        let client = HttpVectorIndexClient::new("http://localhost:1", "key");
        client.upsert("plants", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn query_parses_matches_ordered_as_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/plants/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    {"id": "a_basic", "score": 0.9, "metadata": {"scientific_name": "A"}},
                    {"id": "a_content_0", "score": 0.8, "metadata": {"scientific_name": "A"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpVectorIndexClient::new(server.uri(), "key");
        let matches = client.query("plants", vec![0.1, 0.2], 5).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a_basic");
    }

    #[tokio::test]
    async fn not_found_maps_to_index_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/missing/query"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpVectorIndexClient::new(server.uri(), "key");
        let err = client
            .query("missing", vec![0.1], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::IndexNotFound(_)));
    }
}

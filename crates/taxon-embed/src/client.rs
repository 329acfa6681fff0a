use crate::error::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Document vs. query embedding is a distinct mode (§4.1 rationale):
/// conflating the two degrades recall against the managed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Document,
    Query,
}

impl EmbedRole {
    fn input_type(self) -> &'static str {
        match self {
            EmbedRole::Document => "search_document",
            EmbedRole::Query => "search_query",
        }
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>, EmbedError>;

    /// Native output width. Exposed as configuration per §3 rather than
    /// hardcoded, since the concrete backend is swappable.
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    input_type: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for a managed embedding service (bearer-token auth, JSON
/// request/response). The reference backend is Cohere `embed-english-v3`
/// behind a managed runtime, dimension 1024, but nothing here is specific
/// to that product — base URL, model, and dimension are configuration.
pub struct HttpEmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = EmbedRequest {
            texts: &[text],
            input_type: role.input_type(),
            model: &self.model,
        };

        tracing::debug!(role = ?role, chars = text.len(), "requesting embedding");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedError::RateLimited);
        }
        if status.is_client_error() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(EmbedError::BadRequest(detail));
        }
        let resp = resp.error_for_status()?;

        let parsed: EmbedResponse = resp.json().await?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::BadResponse("empty embeddings array".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn empty_text_is_rejected_without_a_request() {
        let client = HttpEmbeddingClient::new("http://localhost:1", "key", "model", 4);
        let err = client.embed("   ", EmbedRole::Query).await.unwrap_err();
        assert!(matches!(err, EmbedError::EmptyInput));
    }

    #[tokio::test]
    async fn parses_embedding_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.1, 0.2, 0.3]]
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(server.uri(), "key", "model", 3);
        let vec = client.embed("dandelion", EmbedRole::Document).await.unwrap();
        assert_eq!(vec, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(server.uri(), "key", "model", 3);
        let err = client.embed("query", EmbedRole::Query).await.unwrap_err();
        assert!(matches!(err, EmbedError::RateLimited));
    }
}

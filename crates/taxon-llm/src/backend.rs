//! LLM backend trait and the HTTP implementation used for both the text
//! and vision (image-identification) calls of the RAG orchestrator (C7).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("model currently marked unavailable: {0}")]
    Unavailable(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
}

impl From<LlmError> for taxon_common::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimitExceeded => taxon_common::Error::RateLimited(e.to_string()),
            LlmError::Unavailable(msg) => taxon_common::Error::Upstream(msg, None),
            LlmError::Http(_) | LlmError::Serde(_) => {
                taxon_common::Error::upstream_with("LLM backend failure", e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

/// Inline image attached to the final user turn, for the vision call used by
/// the image-identification path of the RAG orchestrator.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub image: Option<ImageAttachment>,
}

impl LlmRequest {
    pub fn text(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            max_tokens: None,
            temperature: None,
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_available(&self) -> bool;
    fn mark_unavailable(&self);
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Talks to an OpenAI-compatible chat completions endpoint. Tracks a soft
/// circuit breaker: a 404 response for the configured model flips
/// `available` to false and every subsequent call short-circuits until the
/// process restarts.
pub struct HttpLlmBackend {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    available: AtomicBool,
}

impl HttpLlmBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            available: AtomicBool::new(true),
        }
    }

    fn build_messages(&self, req: &LlmRequest) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        if let Some(image) = &req.image {
            if let Some(last) = messages.last_mut() {
                let text = last["content"].as_str().unwrap_or("").to_string();
                let data_url = format!(
                    "data:{};base64,{}",
                    image.mime_type,
                    base64_encode(&image.bytes)
                );
                *last = serde_json::json!({
                    "role": "user",
                    "content": [
                        {"type": "text", "text": text},
                        {"type": "image_url", "image_url": {"url": data_url}},
                    ]
                });
            }
        }

        serde_json::Value::Array(messages)
    }
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        if !self.is_available() {
            return Err(LlmError::Unavailable(self.model.clone()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let model = req.model.as_deref().unwrap_or(&self.model);
        let body = serde_json::json!({
            "model": model,
            "messages": self.build_messages(&req),
            "max_tokens": req.max_tokens.unwrap_or(1024),
            "temperature": req.temperature.unwrap_or(0.2),
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            self.mark_unavailable();
            return Err(LlmError::Unavailable(format!(
                "model {model} not found upstream"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitExceeded);
        }
        let resp = resp.error_for_status()?;
        let json: serde_json::Value = resp.json().await?;

        Ok(LlmResponse {
            content: json["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            model: json["model"].as_str().unwrap_or(model).to_string(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn mark_unavailable(&self) {
        tracing::warn!(model = %self.model, "marking model unavailable after 404/not-found response");
        self.available.store(false, Ordering::Relaxed);
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

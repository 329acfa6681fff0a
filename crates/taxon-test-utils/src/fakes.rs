//! Scriptable fakes for the three managed-service boundaries (C1/C2/C7), so
//! every crate's tests can exercise retry/degrade paths without wiremock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use taxon_embed::{EmbedError, EmbedRole, EmbeddingClient};
use taxon_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse};
use taxon_vectorstore::{QueryMatch, UpsertItem, VectorIndexClient, VectorStoreError};

/// Deterministic embedder: `vec![text.len() as f32; dimension]`. Rejects
/// blank input the way the real backends do (embedding an empty string is
/// never a valid call).
pub struct FakeEmbeddingClient {
    pub dimension: usize,
}

impl FakeEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, text: &str, _role: EmbedRole) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(vec![text.len() as f32; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// In-memory vector index: `upsert` appends, `query` returns the `top_k`
/// most recently upserted items carrying their original metadata, in
/// insertion order. Good enough to exercise grouping/reassembly logic
/// without a real ANN search.
#[derive(Default)]
pub struct FakeVectorIndexClient {
    items: Mutex<Vec<UpsertItem>>,
}

impl FakeVectorIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, items: Vec<UpsertItem>) {
        self.items.lock().unwrap().extend(items);
    }
}

#[async_trait]
impl VectorIndexClient for FakeVectorIndexClient {
    async fn ensure_index(&self, _name: &str, _dim: usize) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(&self, _name: &str, items: Vec<UpsertItem>) -> Result<(), VectorStoreError> {
        self.items.lock().unwrap().extend(items);
        Ok(())
    }

    async fn query(
        &self,
        _name: &str,
        _vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let guard = self.items.lock().unwrap();
        Ok(guard
            .iter()
            .rev()
            .take(top_k)
            .map(|item| QueryMatch {
                id: item.id.clone(),
                score: 1.0,
                metadata: item.metadata.clone(),
            })
            .collect())
    }
}

/// Scripted LLM backend: returns a fixed response (or the n-th of several,
/// cycling), counts calls, and supports the same soft circuit breaker the
/// real backend exposes.
pub struct FakeLlmBackend {
    responses: Vec<String>,
    call_count: AtomicUsize,
    available: AtomicBool,
    fail_with: Option<LlmErrorKind>,
}

/// `LlmError` is not `Clone`; this lets a fake be configured to always fail
/// without constructing a fresh error value per call.
#[derive(Debug, Clone, Copy)]
pub enum LlmErrorKind {
    RateLimitExceeded,
    Unavailable,
}

impl FakeLlmBackend {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            responses: vec![response.into()],
            call_count: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            fail_with: None,
        }
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            fail_with: None,
        }
    }

    pub fn failing(kind: LlmErrorKind) -> Self {
        Self {
            responses: vec![],
            call_count: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            fail_with: Some(kind),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for FakeLlmBackend {
    async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(LlmError::Unavailable("model currently unavailable".into()));
        }
        if let Some(kind) = self.fail_with {
            return Err(match kind {
                LlmErrorKind::RateLimitExceeded => LlmError::RateLimitExceeded,
                LlmErrorKind::Unavailable => LlmError::Unavailable("scripted failure".into()),
            });
        }
        let content = self
            .responses
            .get(n % self.responses.len().max(1))
            .cloned()
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            model: "fake".into(),
        })
    }

    fn model_id(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn mark_unavailable(&self) {
        self.available.store(false, Ordering::SeqCst);
    }
}

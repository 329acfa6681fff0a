use thiserror::Error;

/// The error taxonomy shared by every boundary (WebSocket frames, HTTP
/// responses, internal propagation). Client crates keep their own
/// transport-level error types and convert into this one at the seam.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream failure: {0}")]
    Upstream(String, #[source] Option<Box<dyn std::error::Error + Send + Sync>>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into(), None)
    }

    pub fn upstream_with(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Upstream(msg.into(), Some(Box::new(source)))
    }

    /// True for kinds the spec says must never crash the pipeline —
    /// callers should substitute a fallback rather than propagate.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Error::Upstream(..) | Error::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

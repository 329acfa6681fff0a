use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store request rejected: {0}")]
    BadRequest(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("vector store is rate limiting requests")]
    RateLimited,

    #[error("vector store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected vector store response shape: {0}")]
    BadResponse(String),
}

impl From<VectorStoreError> for taxon_common::Error {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::BadRequest(msg) => taxon_common::Error::InvalidInput(msg),
            VectorStoreError::IndexNotFound(name) => taxon_common::Error::NotFound(name),
            VectorStoreError::RateLimited => taxon_common::Error::RateLimited(e.to_string()),
            VectorStoreError::Transport(_) | VectorStoreError::BadResponse(_) => {
                taxon_common::Error::upstream_with("vector store failure", e)
            }
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("text is empty or whitespace-only")]
    EmptyInput,

    #[error("embedding request rejected: {0}")]
    BadRequest(String),

    #[error("embedding service is rate limiting requests")]
    RateLimited,

    #[error("embedding transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected embedding response shape: {0}")]
    BadResponse(String),
}

impl From<EmbedError> for taxon_common::Error {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::EmptyInput => taxon_common::Error::InvalidInput(e.to_string()),
            EmbedError::BadRequest(msg) => taxon_common::Error::InvalidInput(msg),
            EmbedError::RateLimited => taxon_common::Error::RateLimited(e.to_string()),
            EmbedError::Transport(_) | EmbedError::BadResponse(_) => {
                taxon_common::Error::upstream_with("embedding service failure", e)
            }
        }
    }
}

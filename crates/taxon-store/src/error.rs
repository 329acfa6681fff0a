use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<StoreError> for taxon_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConversationNotFound(id) => taxon_common::Error::NotFound(id.to_string()),
            StoreError::Io(_) | StoreError::Serde(_) => {
                taxon_common::Error::upstream_with("conversation store failure", e)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

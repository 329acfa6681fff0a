//! Image storage side channel (§1: "image upload to object store" is an
//! external collaborator; the core only needs an operation that turns
//! inline bytes into a durable URL it can put in `Message.image_ref`).
//!
//! `LocalImageStore` is the thin glue stand-in for that collaborator in
//! this deployment: it writes to a directory the router serves statically
//! at `/media`, the same pattern the teacher uses for its `static`
//! directory (`tower_http::services::ServeDir`).

use async_trait::async_trait;
use taxon_common::Error;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` and returns a URL a client can later fetch it from.
    async fn store(&self, conversation_id: uuid::Uuid, mime_type: &str, bytes: Vec<u8>) -> Result<String, Error>;
}

pub struct LocalImageStore {
    dir: std::path::PathBuf,
    public_prefix: String,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<std::path::PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into(),
        }
    }

    fn extension(mime_type: &str) -> &'static str {
        if mime_type.contains("png") {
            "png"
        } else if mime_type.contains("webp") {
            "webp"
        } else if mime_type.contains("gif") {
            "gif"
        } else {
            "jpg"
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(&self, conversation_id: uuid::Uuid, mime_type: &str, bytes: Vec<u8>) -> Result<String, Error> {
        let sub_dir = self.dir.join(conversation_id.to_string());
        tokio::fs::create_dir_all(&sub_dir)
            .await
            .map_err(|e| Error::upstream_with("failed to create image directory", e))?;

        let filename = format!("{}.{}", uuid::Uuid::new_v4(), Self::extension(mime_type));
        let path = sub_dir.join(&filename);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::upstream_with("failed to write uploaded image", e))?;

        Ok(format!(
            "{}/{}/{}",
            self.public_prefix, conversation_id, filename
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_bytes_and_returns_a_url_under_the_conversation() {
        let dir = std::env::temp_dir().join(format!("taxon-image-store-test-{}", uuid::Uuid::new_v4()));
        let store = LocalImageStore::new(dir.clone(), "/media");
        let conversation_id = uuid::Uuid::new_v4();

        let url = store
            .store(conversation_id, "image/png", vec![1, 2, 3, 4])
            .await
            .unwrap();

        assert!(url.starts_with(&format!("/media/{conversation_id}/")));
        assert!(url.ends_with(".png"));
    }
}

//! HTTP client for the managed embedding service (C1).

pub mod client;
pub mod error;

pub use client::{EmbedRole, EmbeddingClient, HttpEmbeddingClient};
pub use error::EmbedError;

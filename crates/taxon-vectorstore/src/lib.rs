//! HTTP client for the managed vector index service (C2).

pub mod client;
pub mod error;

pub use client::{HttpVectorIndexClient, QueryMatch, UpsertItem, VectorIndexClient};
pub use error::VectorStoreError;

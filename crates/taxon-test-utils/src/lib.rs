//! Shared test fixtures and fakes, usable from any crate's `#[cfg(test)]`
//! modules via a dev-dependency on this crate.

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeEmbeddingClient, FakeLlmBackend, FakeVectorIndexClient, LlmErrorKind};
pub use pretty_assertions::{assert_eq, assert_ne};

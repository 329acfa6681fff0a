//! Retriever (C5) and RAG Orchestrator (C7): species-level context
//! reconstruction and prompt assembly over the embedding, vector index, and
//! LLM abstractions.

pub mod orchestrator;
pub mod retriever;

pub use orchestrator::{HistoryEntry, RagOrchestrator};
pub use retriever::{ContextBundle, Retriever};

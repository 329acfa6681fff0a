//! taxon-llm — LLM backend abstraction (C7) and intent classifier (C6).

pub mod backend;
pub mod intent;

pub use backend::{HttpLlmBackend, ImageAttachment, LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use intent::{classify, IntentVerdict};

//! Intent classifier (C6, §4.6): decides whether a user query is about
//! plants, animals, both, or ambiguous, by asking the LLM for a
//! constrained JSON verdict carrying all four flags explicitly.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::backend::{LlmBackend, LlmRequest, Message};

const SYSTEM_PROMPT: &str = r#"You are a query classifier for a wildlife knowledge base. Classify the user's query to determine if it's about animals/insects/wildlife, plants/flora, both domains, or ambiguous/unclear.

Respond with ONLY a valid JSON object in this exact format (no markdown, no code blocks, just the JSON):
{
  "is_animal": true or false,
  "is_plant": true or false,
  "is_both": true or false,
  "is_ambiguous": true or false
}

Rules:
- If the query mentions specific animals or animal-related terms, set is_animal true.
- If the query mentions specific plants or plant-related terms, set is_plant true.
- If it clearly mentions both domains, set is_both true along with is_animal and is_plant.
- If it is unclear, too general, or could be either, set is_ambiguous true.
- Only one of is_both or is_ambiguous may be true, never both."#;

/// The four-flag verdict the contract requires. `is_both` and
/// `is_ambiguous` are mutually exclusive (§8 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentVerdict {
    pub is_plant: bool,
    pub is_animal: bool,
    pub is_both: bool,
    pub is_ambiguous: bool,
}

impl IntentVerdict {
    fn ambiguous() -> Self {
        Self {
            is_plant: false,
            is_animal: false,
            is_both: false,
            is_ambiguous: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    is_animal: Option<serde_json::Value>,
    is_plant: Option<serde_json::Value>,
    is_both: Option<serde_json::Value>,
    is_ambiguous: Option<serde_json::Value>,
}

/// Classifies `query`. Any failure along the way — transport error, model
/// unavailable, missing keys, malformed JSON, or an `is_both`+`is_ambiguous`
/// contradiction — degrades to `is_ambiguous()` rather than propagating: a
/// classification miss should widen the search, not break the request.
#[instrument(skip(llm))]
pub async fn classify(llm: &Arc<dyn LlmBackend>, query: &str) -> IntentVerdict {
    if query.trim().is_empty() {
        return IntentVerdict::ambiguous();
    }

    let req = LlmRequest::text(vec![
        Message {
            role: "system".into(),
            content: SYSTEM_PROMPT.into(),
        },
        Message {
            role: "user".into(),
            content: format!("Query: \"{query}\""),
        },
    ]);

    let resp = match llm.complete(req).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "intent classification call failed, defaulting to ambiguous");
            return IntentVerdict::ambiguous();
        }
    };

    parse_verdict(&resp.content).unwrap_or_else(|| {
        warn!(raw = %resp.content, "intent classification returned unparsable content");
        IntentVerdict::ambiguous()
    })
}

fn parse_verdict(raw: &str) -> Option<IntentVerdict> {
    let cleaned = strip_code_fence(raw.trim());
    let parsed: RawVerdict = serde_json::from_str(cleaned).ok()?;

    // All four keys must be present; a partial object is treated as an
    // unparsable response rather than silently defaulting the rest to false.
    let is_animal = coerce_bool(parsed.is_animal.as_ref()?)?;
    let is_plant = coerce_bool(parsed.is_plant.as_ref()?)?;
    let is_both = coerce_bool(parsed.is_both.as_ref()?)?;
    let is_ambiguous = coerce_bool(parsed.is_ambiguous.as_ref()?)?;

    if is_both && is_ambiguous {
        return None;
    }

    Some(IntentVerdict {
        is_plant,
        is_animal,
        is_both,
        is_ambiguous,
    })
}

fn strip_code_fence(s: &str) -> &str {
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

fn coerce_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmError;
    use async_trait::async_trait;

    struct ScriptedBackend {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, _req: LlmRequest) -> Result<crate::backend::LlmResponse, LlmError> {
            match &self.reply {
                Ok(content) => Ok(crate::backend::LlmResponse {
                    content: content.clone(),
                    model: "test".into(),
                }),
                Err(()) => Err(LlmError::RateLimitExceeded),
            }
        }
        fn model_id(&self) -> &str {
            "test"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn mark_unavailable(&self) {}
    }

    fn backend(reply: &str) -> Arc<dyn LlmBackend> {
        Arc::new(ScriptedBackend {
            reply: Ok(reply.to_string()),
        })
    }

    #[tokio::test]
    async fn classifies_plant_only() {
        let v = classify(
            &backend(r#"{"is_animal": false, "is_plant": true, "is_both": false, "is_ambiguous": false}"#),
            "what is a fern?",
        )
        .await;
        assert!(v.is_plant);
        assert!(!v.is_animal);
        assert!(!v.is_both);
        assert!(!v.is_ambiguous);
    }

    #[tokio::test]
    async fn strips_code_fence_and_coerces_string_bools() {
        let v = classify(
            &backend("```json\n{\"is_animal\": \"no\", \"is_plant\": \"yes\", \"is_both\": false, \"is_ambiguous\": false}\n```"),
            "tell me about oak trees",
        )
        .await;
        assert!(v.is_plant);
        assert!(!v.is_animal);
    }

    #[tokio::test]
    async fn both_domains_true_is_not_ambiguous() {
        let v = classify(
            &backend(r#"{"is_animal": true, "is_plant": true, "is_both": true, "is_ambiguous": false}"#),
            "what eats acorns?",
        )
        .await;
        assert!(v.is_both);
        assert!(!v.is_ambiguous);
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_ambiguous() {
        let v = classify(&backend("not json at all"), "???").await;
        assert!(v.is_ambiguous);
        assert!(!v.is_both);
    }

    #[tokio::test]
    async fn missing_key_degrades_to_ambiguous() {
        let v = classify(&backend(r#"{"is_animal": true, "is_plant": false}"#), "birds?").await;
        assert!(v.is_ambiguous);
    }

    #[tokio::test]
    async fn contradictory_both_and_ambiguous_degrades_to_ambiguous() {
        let v = classify(
            &backend(r#"{"is_animal": true, "is_plant": true, "is_both": true, "is_ambiguous": true}"#),
            "nature?",
        )
        .await;
        assert!(v.is_ambiguous);
        assert!(!v.is_both);
    }

    #[tokio::test]
    async fn empty_query_is_ambiguous_without_calling_llm() {
        let v = classify(
            &backend(r#"{"is_animal": true, "is_plant": true, "is_both": true, "is_ambiguous": false}"#),
            "   ",
        )
        .await;
        assert!(v.is_ambiguous);
    }

    #[tokio::test]
    async fn backend_error_degrades_to_ambiguous() {
        let backend: Arc<dyn LlmBackend> = Arc::new(ScriptedBackend { reply: Err(()) });
        let v = classify(&backend, "what bird is this?").await;
        assert!(v.is_ambiguous);
    }
}

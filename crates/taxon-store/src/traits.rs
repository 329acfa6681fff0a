//! The Conversation Store abstraction (C8, §4.8): duck-typed over a
//! durable and an in-memory backend, expressed here as a trait with two
//! implementations rather than runtime branches (§9 design note).

use async_trait::async_trait;
use std::collections::BTreeSet;
use taxon_common::model::{Conversation, Message};
use uuid::Uuid;

use crate::error::Result;

/// Partial update applied to a conversation; absent fields are left
/// untouched. `update_conversation("/bot", "/chat")` sets only `has_bot`.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub name: Option<Option<String>>,
    pub has_bot: Option<bool>,
    pub participants: Option<BTreeSet<Uuid>>,
}

impl ConversationUpdate {
    pub fn set_has_bot(has_bot: bool) -> Self {
        Self {
            has_bot: Some(has_bot),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Full write.
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Partial write; errors if no conversation exists for `id`.
    async fn update_conversation(&self, id: Uuid, delta: ConversationUpdate) -> Result<Conversation>;

    async fn save_message(&self, message: &Message) -> Result<()>;

    /// Ordered by `created_at` descending, truncated to `limit`. Callers
    /// needing chronological order reverse the result themselves.
    async fn get_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>>;

    /// Exact, unordered participant-set match.
    async fn find_direct_by_participants(
        &self,
        participants: &BTreeSet<Uuid>,
    ) -> Result<Option<Conversation>>;

    /// All `group` conversations, plus `direct` conversations where `user_id`
    /// participates (§6's `get_all_groups` filter).
    async fn list_visible_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Atomically finds or creates the direct conversation for exactly
    /// `participants`, serializing concurrent creators so repeated calls
    /// with the same unordered set always resolve to the same conversation
    /// id (§9 Open Question, S2). Implementations guard the
    /// find-then-save pair with a single-writer lock rather than relying on
    /// a compound key.
    async fn get_or_create_direct(&self, participants: BTreeSet<Uuid>) -> Result<Conversation>;
}

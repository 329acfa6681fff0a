//! In-memory `ConversationStore` — the `STORE_BACKEND=memory` backend, and
//! the backend used by tests across the workspace.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use taxon_common::model::{Conversation, Message};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::traits::{ConversationStore, ConversationUpdate};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<Message>>,
}

/// Guarded by a single `std::sync::Mutex`: the spec calls for single-writer
/// semantics per key and no latency-sensitive hot path, so a fair lock is
/// sufficient (§5 Shared state).
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: Mutex<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.inner.lock().unwrap().conversations.get(&id).cloned())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn update_conversation(&self, id: Uuid, delta: ConversationUpdate) -> Result<Conversation> {
        let mut guard = self.inner.lock().unwrap();
        let conversation = guard
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        apply_update(conversation, delta);
        Ok(conversation.clone())
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let guard = self.inner.lock().unwrap();
        let mut messages = guard
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn find_direct_by_participants(
        &self,
        participants: &BTreeSet<Uuid>,
    ) -> Result<Option<Conversation>> {
        let guard = self.inner.lock().unwrap();
        Ok(find_direct(&guard.conversations, participants))
    }

    async fn list_visible_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .conversations
            .values()
            .filter(|c| visible_to(c, user_id))
            .cloned()
            .collect())
    }

    async fn get_or_create_direct(&self, participants: BTreeSet<Uuid>) -> Result<Conversation> {
        // The whole check-then-insert runs under one lock acquisition, so
        // concurrent callers racing on the same participant set cannot both
        // observe "absent" and each create a duplicate conversation.
        let mut guard = self.inner.lock().unwrap();
        if let Some(existing) = find_direct(&guard.conversations, &participants) {
            return Ok(existing);
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            name: None,
            kind: taxon_common::model::ConversationKind::Direct,
            participants,
            created_at: chrono::Utc::now(),
            has_bot: false,
        };
        guard
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }
}

fn find_direct(
    conversations: &HashMap<Uuid, Conversation>,
    participants: &BTreeSet<Uuid>,
) -> Option<Conversation> {
    conversations
        .values()
        .find(|c| c.direct_key().as_ref() == Some(participants))
        .cloned()
}

fn visible_to(c: &Conversation, user_id: Uuid) -> bool {
    use taxon_common::model::ConversationKind::*;
    match c.kind {
        Group => true,
        Direct => c.participants.contains(&user_id),
    }
}

fn apply_update(conversation: &mut Conversation, delta: ConversationUpdate) {
    if let Some(name) = delta.name {
        conversation.name = name;
    }
    if let Some(has_bot) = delta.has_bot {
        conversation.has_bot = has_bot;
    }
    if let Some(participants) = delta.participants {
        conversation.participants = participants;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxon_common::model::ConversationKind;

    fn direct(participants: BTreeSet<Uuid>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            name: None,
            kind: ConversationKind::Direct,
            participants,
            created_at: chrono::Utc::now(),
            has_bot: false,
        }
    }

    #[tokio::test]
    async fn get_or_create_direct_is_idempotent_regardless_of_set_order() {
        let store = InMemoryConversationStore::new();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

        let a = store
            .get_or_create_direct(BTreeSet::from([u1, u2]))
            .await
            .unwrap();
        let b = store
            .get_or_create_direct(BTreeSet::from([u2, u1]))
            .await
            .unwrap();

        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn find_direct_by_participants_misses_on_different_set() {
        let store = InMemoryConversationStore::new();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .save_conversation(&direct(BTreeSet::from([u1, u2])))
            .await
            .unwrap();

        let found = store
            .find_direct_by_participants(&BTreeSet::from([u1, u3]))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn update_conversation_sets_has_bot_without_touching_other_fields() {
        let store = InMemoryConversationStore::new();
        let mut c = direct(BTreeSet::from([Uuid::new_v4(), Uuid::new_v4()]));
        c.name = Some("original".into());
        store.save_conversation(&c).await.unwrap();

        let updated = store
            .update_conversation(c.id, ConversationUpdate::set_has_bot(true))
            .await
            .unwrap();

        assert!(updated.has_bot);
        assert_eq!(updated.name.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn get_messages_orders_descending_and_truncates() {
        let store = InMemoryConversationStore::new();
        let conversation_id = Uuid::new_v4();
        for i in 0..5 {
            let mut m = sample_message(conversation_id);
            m.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            store.save_message(&m).await.unwrap();
        }

        let messages = store.get_messages(conversation_id, 2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].created_at > messages[1].created_at);
    }

    fn sample_message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: Uuid::new_v4().into(),
            author_name: "Alice".into(),
            kind: taxon_common::model::MessageKind::Text,
            text: "hi".into(),
            image_ref: None,
            is_bot: false,
            created_at: chrono::Utc::now(),
            client_message_id: None,
        }
    }
}

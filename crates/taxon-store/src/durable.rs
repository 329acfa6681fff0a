//! Durable `ConversationStore` backed by `sled`, an embedded KV engine
//! requiring no external server (`STORE_BACKEND=durable`).
//!
//! Layout: two trees, `conversations` and `messages`, both keyed by UUID
//! bytes and holding `serde_json`-encoded values. Messages additionally
//! carry their conversation id as a key prefix (`{conversation_id}/{message_id}`)
//! so `get_messages` can range-scan a single conversation's tree slice
//! instead of a full scan.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use taxon_common::model::{Conversation, ConversationKind, Message};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::traits::{ConversationStore, ConversationUpdate};

pub struct SledConversationStore {
    conversations: sled::Tree,
    messages: sled::Tree,
    // sled itself is lock-free, but get_or_create_direct's find-then-insert
    // needs the same atomicity guarantee the in-memory store gets for free
    // from its single Mutex (§9 Open Question, S2).
    write_lock: Mutex<()>,
}

impl SledConversationStore {
    pub fn open(data_dir: &str) -> Result<Self> {
        let db = sled::open(data_dir)?;
        let conversations = db.open_tree("conversations")?;
        let messages = db.open_tree("messages")?;
        Ok(Self {
            conversations,
            messages,
            write_lock: Mutex::new(()),
        })
    }

    fn get_conversation_sync(&self, id: Uuid) -> Result<Option<Conversation>> {
        match self.conversations.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_conversation_sync(&self, conversation: &Conversation) -> Result<()> {
        let bytes = serde_json::to_vec(conversation)?;
        self.conversations.insert(conversation.id.as_bytes(), bytes)?;
        Ok(())
    }

    fn find_direct_sync(&self, participants: &BTreeSet<Uuid>) -> Result<Option<Conversation>> {
        for entry in self.conversations.iter() {
            let (_, bytes) = entry?;
            let conversation: Conversation = serde_json::from_slice(&bytes)?;
            if conversation.direct_key().as_ref() == Some(participants) {
                return Ok(Some(conversation));
            }
        }
        Ok(None)
    }

    fn message_key(conversation_id: Uuid, message_id: Uuid) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(conversation_id.as_bytes());
        key.extend_from_slice(message_id.as_bytes());
        key
    }
}

#[async_trait]
impl ConversationStore for SledConversationStore {
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.get_conversation_sync(id)
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.save_conversation_sync(conversation)
    }

    async fn update_conversation(&self, id: Uuid, delta: ConversationUpdate) -> Result<Conversation> {
        let _guard = self.write_lock.lock().unwrap();
        let mut conversation = self
            .get_conversation_sync(id)?
            .ok_or(StoreError::ConversationNotFound(id))?;
        if let Some(name) = delta.name {
            conversation.name = name;
        }
        if let Some(has_bot) = delta.has_bot {
            conversation.has_bot = has_bot;
        }
        if let Some(participants) = delta.participants {
            conversation.participants = participants;
        }
        self.save_conversation_sync(&conversation)?;
        Ok(conversation)
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        let key = Self::message_key(message.conversation_id, message.id);
        let bytes = serde_json::to_vec(message)?;
        self.messages.insert(key, bytes)?;
        Ok(())
    }

    async fn get_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for entry in self.messages.scan_prefix(conversation_id.as_bytes()) {
            let (_, bytes) = entry?;
            messages.push(serde_json::from_slice::<Message>(&bytes)?);
        }
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn find_direct_by_participants(
        &self,
        participants: &BTreeSet<Uuid>,
    ) -> Result<Option<Conversation>> {
        self.find_direct_sync(participants)
    }

    async fn list_visible_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut visible = Vec::new();
        for entry in self.conversations.iter() {
            let (_, bytes) = entry?;
            let conversation: Conversation = serde_json::from_slice(&bytes)?;
            let show = match conversation.kind {
                ConversationKind::Group => true,
                ConversationKind::Direct => conversation.participants.contains(&user_id),
            };
            if show {
                visible.push(conversation);
            }
        }
        Ok(visible)
    }

    async fn get_or_create_direct(&self, participants: BTreeSet<Uuid>) -> Result<Conversation> {
        let _guard = self.write_lock.lock().unwrap();
        if let Some(existing) = self.find_direct_sync(&participants)? {
            return Ok(existing);
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            name: None,
            kind: ConversationKind::Direct,
            participants,
            created_at: chrono::Utc::now(),
            has_bot: false,
        };
        self.save_conversation_sync(&conversation)?;
        Ok(conversation)
    }
}

//! Shared entity shapes: User, Conversation, Message, and the ingestion-side
//! SpeciesRecord / Chunk metadata. Timestamps serialize as RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// The sentinel author id for bot-authored messages is the literal string
/// `"bot"`, not a UUID, so author identity is a small enum rather than a
/// bare `Uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorId {
    User(Uuid),
    Bot,
}

impl AuthorId {
    pub const BOT_SENTINEL: &'static str = "bot";

    pub fn is_bot(&self) -> bool {
        matches!(self, AuthorId::Bot)
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorId::User(id) => write!(f, "{id}"),
            AuthorId::Bot => write!(f, "{}", Self::BOT_SENTINEL),
        }
    }
}

impl From<Uuid> for AuthorId {
    fn from(id: Uuid) -> Self {
        AuthorId::User(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub external_provider_id: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub name: Option<String>,
    pub kind: ConversationKind,
    pub participants: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub has_bot: bool,
}

impl Conversation {
    /// Normalized key used for direct-conversation dedupe (§4 C8,
    /// `find_direct_by_participants`): the participant set, unordered.
    pub fn direct_key(&self) -> Option<BTreeSet<Uuid>> {
        matches!(self.kind, ConversationKind::Direct).then(|| self.participants.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author_id: AuthorId,
    pub author_name: String,
    pub kind: MessageKind,
    pub text: String,
    pub image_ref: Option<String>,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
    pub client_message_id: Option<String>,
}

/// Ingestion input: one encyclopedia article for either domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub genus: String,
    pub order: Option<String>,
    pub class: Option<String>,
    pub phylum: Option<String>,
    pub kingdom: String,
    pub summary: String,
    pub content: String,
    pub wikipedia_url: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    BasicInfo,
    DetailedContent,
}

/// Everything a chunk carries in the vector store's metadata, sufficient
/// to reconstruct retrieval context without re-reading source JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub genus: String,
    pub order: Option<String>,
    pub class: Option<String>,
    pub phylum: Option<String>,
    pub kingdom: String,
    pub summary: String,
    pub wikipedia_url: String,
    pub chunk_text: String,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub chunk_index: Option<u32>,
}

/// One domain the RAG subsystem retrieves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Plant,
    Animal,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Plant => write!(f, "plant"),
            Domain::Animal => write!(f, "animal"),
        }
    }
}

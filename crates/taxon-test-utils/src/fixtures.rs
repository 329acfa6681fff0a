//! Builders for the shared entity shapes, so tests don't hand-roll a
//! `Conversation` or `SpeciesRecord` field by field.

use std::collections::BTreeSet;
use taxon_common::model::{
    AuthorId, Conversation, ConversationKind, Message, MessageKind, SpeciesRecord,
};
use uuid::Uuid;

pub fn species_record(scientific_name: &str) -> SpeciesRecord {
    SpeciesRecord {
        scientific_name: scientific_name.to_string(),
        common_name: "Common Name".to_string(),
        family: "Familia".to_string(),
        genus: scientific_name
            .split_whitespace()
            .next()
            .unwrap_or("Genus")
            .to_string(),
        order: None,
        class: None,
        phylum: None,
        kingdom: "Plantae".to_string(),
        summary: "A short summary.".to_string(),
        content: "Detailed content about the species, long enough to chunk.".to_string(),
        wikipedia_url: format!("https://en.wikipedia.org/wiki/{}", scientific_name.replace(' ', "_")),
        error: None,
    }
}

pub fn direct_conversation(participants: impl IntoIterator<Item = Uuid>) -> Conversation {
    Conversation {
        id: Uuid::new_v4(),
        name: None,
        kind: ConversationKind::Direct,
        participants: participants.into_iter().collect::<BTreeSet<_>>(),
        created_at: chrono::Utc::now(),
        has_bot: false,
    }
}

pub fn group_conversation(name: &str, participants: impl IntoIterator<Item = Uuid>) -> Conversation {
    Conversation {
        id: Uuid::new_v4(),
        name: Some(name.to_string()),
        kind: ConversationKind::Group,
        participants: participants.into_iter().collect::<BTreeSet<_>>(),
        created_at: chrono::Utc::now(),
        has_bot: false,
    }
}

pub fn user_message(conversation_id: Uuid, author_id: Uuid, text: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: AuthorId::User(author_id),
        author_name: "Test User".to_string(),
        kind: MessageKind::Text,
        text: text.to_string(),
        image_ref: None,
        is_bot: false,
        created_at: chrono::Utc::now(),
        client_message_id: None,
    }
}

pub fn bot_message(conversation_id: Uuid, text: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: AuthorId::Bot,
        author_name: "Assistant".to_string(),
        kind: MessageKind::Text,
        text: text.to_string(),
        image_ref: None,
        is_bot: true,
        created_at: chrono::Utc::now(),
        client_message_id: None,
    }
}

//! Session Protocol Handler (C10, §4.10): inbound frame dispatch for one
//! connected user. Membership and command handling live here; transport
//! (the actual socket read/write loop) lives in `ws`.

use base64::Engine;
use taxon_common::model::{AuthorId, Conversation, Message, MessageKind};
use taxon_rag::HistoryEntry;
use taxon_store::ConversationUpdate;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::to_error_frame;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::state::SharedState;

const HISTORY_LIMIT_FOR_BOT: usize = 10;
const HISTORY_LIMIT_ON_JOIN: usize = 50;
const BOT_COMMAND: &str = "/bot";
const CHAT_COMMAND: &str = "/chat";
const BOT_AUTHOR_NAME: &str = "AI Bot";

/// Dispatches one inbound frame for `user_id`. Side-effecting: persists to
/// the store, sends/broadcasts through the hub. Never returns an error —
/// boundary failures become an `error` frame to the sender (§7), and the
/// connection stays open.
#[instrument(skip(state, frame), fields(%user_id))]
pub async fn handle_frame(state: &SharedState, user_id: Uuid, frame: ClientFrame) {
    match frame {
        ClientFrame::SendMessage {
            conversation_id,
            text,
            user_name,
            client_message_id,
        } => handle_send_message(state, user_id, conversation_id, text, user_name, client_message_id).await,

        ClientFrame::SendImage {
            conversation_id,
            image_url,
            image_base64,
            image_mime_type,
            text,
            client_message_id,
        } => {
            handle_send_image(
                state,
                user_id,
                conversation_id,
                image_url,
                image_base64,
                image_mime_type,
                text,
                client_message_id,
            )
            .await
        }

        ClientFrame::JoinConversation { conversation_id } => {
            handle_join_conversation(state, user_id, conversation_id).await
        }

        ClientFrame::GetAllGroups {} => handle_get_all_groups(state, user_id).await,

        // Heartbeat plumbing (§4.9): record_pong / reply-to-client-ping are
        // handled one layer up in `ws`, which owns the pong clock and the
        // raw socket; nothing here needs store/hub access for either.
        ClientFrame::Ping { .. } | ClientFrame::Pong { .. } => {}
    }
}

async fn handle_send_message(
    state: &SharedState,
    user_id: Uuid,
    conversation_id: Uuid,
    text: String,
    user_name: String,
    client_message_id: Option<String>,
) {
    if text.trim().is_empty() {
        state.hub.send(user_id, to_error_frame(&taxon_common::Error::InvalidInput(
            "text must not be empty".into(),
        )));
        return;
    }

    let Some(mut conversation) = fetch_conversation(state, user_id, conversation_id).await else {
        return;
    };
    if !authorize_member(state, user_id, &conversation) {
        return;
    }

    let mut text = text.trim().to_string();

    if let Some(rest) = text.strip_prefix(BOT_COMMAND) {
        let query = rest.trim();
        if !conversation.has_bot {
            conversation = match set_has_bot(state, conversation_id, true).await {
                Some(c) => c,
                None => return,
            };
            broadcast_bot_toggle(state, conversation_id, true).await;
        }
        if query.is_empty() {
            return;
        }
        text = query.to_string();
    } else if text == CHAT_COMMAND {
        if conversation.has_bot {
            set_has_bot(state, conversation_id, false).await;
            broadcast_bot_toggle(state, conversation_id, false).await;
        }
        return;
    }

    let message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: AuthorId::User(user_id),
        author_name: user_name,
        kind: MessageKind::Text,
        text,
        image_ref: None,
        is_bot: false,
        created_at: chrono::Utc::now(),
        client_message_id,
    };

    persist_broadcast_and_ack(state, user_id, &message).await;

    if conversation.has_bot {
        run_bot_text_reply(state, &conversation, &message.text).await;
    }
}

async fn handle_send_image(
    state: &SharedState,
    user_id: Uuid,
    conversation_id: Uuid,
    image_url: Option<String>,
    image_base64: Option<String>,
    image_mime_type: Option<String>,
    text: Option<String>,
    client_message_id: Option<String>,
) {
    let Some(conversation) = fetch_conversation(state, user_id, conversation_id).await else {
        return;
    };
    if !authorize_member(state, user_id, &conversation) {
        return;
    }

    let mime_type = image_mime_type.unwrap_or_else(|| "image/jpeg".to_string());
    let (image_ref, image_bytes) = match resolve_image(state, conversation_id, image_url, image_base64, &mime_type).await {
        Ok(resolved) => resolved,
        Err(e) => {
            state.hub.send(user_id, to_error_frame(&e));
            return;
        }
    };

    let user_text = text.unwrap_or_default();
    let display_text = if user_text.trim().is_empty() {
        "Image".to_string()
    } else {
        user_text.clone()
    };

    let message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: AuthorId::User(user_id),
        author_name: String::new(),
        kind: MessageKind::Image,
        text: display_text,
        image_ref: Some(image_ref),
        is_bot: false,
        created_at: chrono::Utc::now(),
        client_message_id,
    };

    persist_broadcast_and_ack(state, user_id, &message).await;

    if conversation.has_bot {
        if let Some(bytes) = image_bytes {
            run_bot_image_reply(state, &conversation, bytes, &mime_type, &user_text).await;
        }
    }
}

async fn handle_join_conversation(state: &SharedState, user_id: Uuid, conversation_id: Uuid) {
    let messages = match state.store.get_messages(conversation_id, HISTORY_LIMIT_ON_JOIN).await {
        Ok(messages) => messages,
        Err(e) => {
            state.hub.send(user_id, to_error_frame(&e.into()));
            return;
        }
    };
    // Store returns newest-first (§4.8); history frames read chronologically.
    let mut messages = messages;
    messages.reverse();
    state.hub.send(
        user_id,
        ServerFrame::ConversationHistory {
            conversation_id,
            messages,
        },
    );
}

async fn handle_get_all_groups(state: &SharedState, user_id: Uuid) {
    match state.store.list_visible_conversations(user_id).await {
        Ok(conversations) => state.hub.send(user_id, ServerFrame::AllGroups { conversations }),
        Err(e) => state.hub.send(user_id, to_error_frame(&e.into())),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn fetch_conversation(state: &SharedState, user_id: Uuid, conversation_id: Uuid) -> Option<Conversation> {
    match state.store.get_conversation(conversation_id).await {
        Ok(Some(conversation)) => Some(conversation),
        Ok(None) => {
            state.hub.send(
                user_id,
                to_error_frame(&taxon_common::Error::NotFound(format!(
                    "conversation {conversation_id} not found"
                ))),
            );
            None
        }
        Err(e) => {
            state.hub.send(user_id, to_error_frame(&e.into()));
            None
        }
    }
}

/// §4.10: "reject if author is not a participant (emit `error` frame, do
/// not disconnect)".
fn authorize_member(state: &SharedState, user_id: Uuid, conversation: &Conversation) -> bool {
    if conversation.participants.contains(&user_id) {
        return true;
    }
    state.hub.send(
        user_id,
        to_error_frame(&taxon_common::Error::Forbidden(
            "you are not a member of this conversation".into(),
        )),
    );
    false
}

async fn set_has_bot(state: &SharedState, conversation_id: Uuid, has_bot: bool) -> Option<Conversation> {
    match state
        .store
        .update_conversation(conversation_id, ConversationUpdate::set_has_bot(has_bot))
        .await
    {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(error = %e, %conversation_id, "failed to update has_bot");
            None
        }
    }
}

async fn broadcast_bot_toggle(state: &SharedState, conversation_id: Uuid, added: bool) {
    let timestamp = chrono::Utc::now();
    let frame = if added {
        ServerFrame::BotAdded {
            conversation_id,
            message: "AI Bot has been added to the conversation".into(),
            timestamp,
        }
    } else {
        ServerFrame::BotRemoved {
            conversation_id,
            message: "AI Bot has been removed from the conversation".into(),
            timestamp,
        }
    };
    state.hub.broadcast(conversation_id, frame, None).await;
}

async fn persist_broadcast_and_ack(state: &SharedState, sender: Uuid, message: &Message) {
    if let Err(e) = state.store.save_message(message).await {
        state.hub.send(sender, to_error_frame(&e.into()));
        return;
    }
    state
        .hub
        .broadcast(
            message.conversation_id,
            ServerFrame::NewMessage { message: message.clone() },
            Some(sender),
        )
        .await;
    state.hub.send(sender, ServerFrame::MessageSent { message: message.clone() });
}

async fn run_bot_text_reply(state: &SharedState, conversation: &Conversation, user_message: &str) {
    let history = recent_history(state, conversation.id).await;
    let reply_text = state.orchestrator.answer_text(user_message, &history).await;
    persist_and_broadcast_bot_reply(state, conversation.id, reply_text).await;
}

async fn run_bot_image_reply(
    state: &SharedState,
    conversation: &Conversation,
    image_bytes: Vec<u8>,
    mime_type: &str,
    user_message: &str,
) {
    let history = recent_history(state, conversation.id).await;
    let user_message = Some(user_message).filter(|m| !m.trim().is_empty());
    let reply_text = state
        .orchestrator
        .answer_image(image_bytes, mime_type, user_message, &history)
        .await;
    persist_and_broadcast_bot_reply(state, conversation.id, reply_text).await;
}

async fn persist_and_broadcast_bot_reply(state: &SharedState, conversation_id: Uuid, reply_text: String) {
    let bot_message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: AuthorId::Bot,
        author_name: BOT_AUTHOR_NAME.to_string(),
        kind: MessageKind::Text,
        text: reply_text,
        image_ref: None,
        is_bot: true,
        created_at: chrono::Utc::now(),
        client_message_id: None,
    };
    if let Err(e) = state.store.save_message(&bot_message).await {
        warn!(error = %e, %conversation_id, "failed to persist bot reply");
        return;
    }
    state
        .hub
        .broadcast(conversation_id, ServerFrame::NewMessage { message: bot_message }, None)
        .await;
}

async fn recent_history(state: &SharedState, conversation_id: Uuid) -> Vec<HistoryEntry> {
    let messages = state
        .store
        .get_messages(conversation_id, HISTORY_LIMIT_FOR_BOT)
        .await
        .unwrap_or_default();
    // get_messages is newest-first (§4.8); the orchestrator wants chronological.
    messages
        .into_iter()
        .rev()
        .map(|m| HistoryEntry {
            author_name: m.author_name,
            is_bot: m.is_bot,
            text: m.text,
        })
        .collect()
}

/// `send_image`'s resolution step (SPEC_FULL §4 C7 clarification): prefer
/// an already-uploaded URL; otherwise decode inline base64 through the
/// image store. Returns the `image_ref` to persist and, when bytes are
/// available in-process, the raw bytes for the bot's vision call (an
/// already-uploaded URL is not re-fetched here; §4 only requires fetching
/// bytes for the *image path*, which `ws`/`session` does not need to do
/// twice — the bot path re-fetches via HTTP if given only a URL).
async fn resolve_image(
    state: &SharedState,
    conversation_id: Uuid,
    image_url: Option<String>,
    image_base64: Option<String>,
    mime_type: &str,
) -> Result<(String, Option<Vec<u8>>), taxon_common::Error> {
    if let Some(url) = image_url {
        let bytes = fetch_image_bytes(state, &url).await.ok();
        return Ok((url, bytes));
    }
    if let Some(base64) = image_base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64.as_bytes())
            .map_err(|e| taxon_common::Error::InvalidInput(format!("invalid base64 image data: {e}")))?;
        let url = state.image_store.store(conversation_id, mime_type, bytes.clone()).await?;
        return Ok((url, Some(bytes)));
    }
    Err(taxon_common::Error::InvalidInput(
        "either imageUrl or imageBase64 is required".into(),
    ))
}

async fn fetch_image_bytes(state: &SharedState, url: &str) -> Result<Vec<u8>, taxon_common::Error> {
    let resp = state
        .http_client
        .get(url)
        .send()
        .await
        .map_err(|e| taxon_common::Error::upstream_with("failed to fetch image from URL", e))?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| taxon_common::Error::upstream_with("failed to read image bytes", e))?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::image_store::LocalImageStore;
    use crate::state::AppState;
    use std::sync::Arc;
    use std::time::Duration;
    use taxon_rag::{RagOrchestrator, Retriever};
    use taxon_store::InMemoryConversationStore;
    use taxon_test_utils::fixtures::{direct_conversation, group_conversation};
    use taxon_test_utils::{FakeEmbeddingClient, FakeLlmBackend, FakeVectorIndexClient};

    fn test_state() -> (SharedState, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::new());
        let hub = Arc::new(Hub::new(store.clone(), Duration::from_secs(30)));
        let llm = Arc::new(FakeLlmBackend::with_response(
            r#"{"is_animal": false, "is_plant": false, "is_both": false, "is_ambiguous": true}"#,
        ));
        let plant = Retriever::new(Arc::new(FakeEmbeddingClient::new(3)), Arc::new(FakeVectorIndexClient::new()), 5);
        let animal = Retriever::new(Arc::new(FakeEmbeddingClient::new(3)), Arc::new(FakeVectorIndexClient::new()), 5);
        let orchestrator = Arc::new(RagOrchestrator::new(llm, plant, animal, "plants", "animals"));
        let image_store = Arc::new(LocalImageStore::new(
            std::env::temp_dir().join(format!("taxon-session-test-{}", Uuid::new_v4())),
            "/media",
        ));
        let state: SharedState = Arc::new(AppState::new(store.clone(), hub, orchestrator, image_store));
        (state, store)
    }

    #[tokio::test]
    async fn non_member_send_gets_error_frame_and_nothing_persists() {
        let (state, store) = test_state();
        let (a, x) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = group_conversation("trail", [a]);
        store.save_conversation(&conversation).await.unwrap();
        let (mut rx, _) = state.hub.register(x);

        handle_frame(
            &state,
            x,
            ClientFrame::SendMessage {
                conversation_id: conversation.id,
                text: "hi".into(),
                user_name: "X".into(),
                client_message_id: None,
            },
        )
        .await;

        let crate::hub::Outbound::Frame(ServerFrame::Error { .. }) = rx.try_recv().unwrap() else {
            panic!("expected an error frame");
        };
        assert!(store.get_messages(conversation.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bot_fan_out_acks_sender_before_bot_reply() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut conversation = direct_conversation([a, b]);
        conversation.has_bot = true;
        store.save_conversation(&conversation).await.unwrap();

        let (mut a_rx, _) = state.hub.register(a);
        let (mut b_rx, _) = state.hub.register(b);

        handle_frame(
            &state,
            a,
            ClientFrame::SendMessage {
                conversation_id: conversation.id,
                text: "hello".into(),
                user_name: "A".into(),
                client_message_id: Some("cid-1".into()),
            },
        )
        .await;

        let crate::hub::Outbound::Frame(ServerFrame::NewMessage { .. }) = b_rx.recv().await.unwrap() else {
            panic!("b should see the user message first");
        };
        let crate::hub::Outbound::Frame(ServerFrame::MessageSent { message }) = a_rx.recv().await.unwrap() else {
            panic!("a should get an ack");
        };
        assert_eq!(message.client_message_id.as_deref(), Some("cid-1"));

        let crate::hub::Outbound::Frame(ServerFrame::NewMessage { message: bot_msg }) = a_rx.recv().await.unwrap()
        else {
            panic!("a should then see the bot reply");
        };
        assert!(bot_msg.is_bot);
        assert_eq!(bot_msg.author_id, AuthorId::Bot);
    }

    #[tokio::test]
    async fn inline_bot_command_enables_bot_and_feeds_query_to_rag() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = direct_conversation([a, b]);
        store.save_conversation(&conversation).await.unwrap();
        let (mut a_rx, _) = state.hub.register(a);
        let (_b_rx, _) = state.hub.register(b);

        handle_frame(
            &state,
            a,
            ClientFrame::SendMessage {
                conversation_id: conversation.id,
                text: "/bot is dandelion edible?".into(),
                user_name: "A".into(),
                client_message_id: None,
            },
        )
        .await;

        let updated = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert!(updated.has_bot);

        // a sees: the bot_added broadcast, its own send_message ack, then
        // the bot's reply (broadcast to everyone, a included).
        let crate::hub::Outbound::Frame(ServerFrame::BotAdded { .. }) = a_rx.recv().await.unwrap() else {
            panic!("expected bot_added broadcast");
        };
        let crate::hub::Outbound::Frame(ServerFrame::MessageSent { message }) = a_rx.recv().await.unwrap() else {
            panic!("expected a send_message ack");
        };
        assert_eq!(message.text, "is dandelion edible?");
        let crate::hub::Outbound::Frame(ServerFrame::NewMessage { message: bot_msg }) = a_rx.recv().await.unwrap()
        else {
            panic!("expected the bot's reply broadcast last");
        };
        assert!(bot_msg.is_bot);
    }

    #[tokio::test]
    async fn bot_alone_enables_without_persisting_a_message() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = direct_conversation([a, b]);
        store.save_conversation(&conversation).await.unwrap();
        let (_a_rx, _) = state.hub.register(a);

        handle_frame(
            &state,
            a,
            ClientFrame::SendMessage {
                conversation_id: conversation.id,
                text: "/bot".into(),
                user_name: "A".into(),
                client_message_id: None,
            },
        )
        .await;

        let updated = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert!(updated.has_bot);
        assert!(store.get_messages(conversation.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_command_disables_bot() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut conversation = direct_conversation([a, b]);
        conversation.has_bot = true;
        store.save_conversation(&conversation).await.unwrap();
        let (_a_rx, _) = state.hub.register(a);

        handle_frame(
            &state,
            a,
            ClientFrame::SendMessage {
                conversation_id: conversation.id,
                text: "/chat".into(),
                user_name: "A".into(),
                client_message_id: None,
            },
        )
        .await;

        let updated = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert!(!updated.has_bot);
    }

    #[tokio::test]
    async fn join_conversation_returns_history_in_chronological_order() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = group_conversation("trail", [a, b]);
        store.save_conversation(&conversation).await.unwrap();
        for i in 0..3 {
            let mut m = taxon_test_utils::fixtures::user_message(conversation.id, a, &format!("m{i}"));
            m.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            store.save_message(&m).await.unwrap();
        }
        let (mut rx, _) = state.hub.register(a);

        handle_frame(&state, a, ClientFrame::JoinConversation { conversation_id: conversation.id }).await;

        let crate::hub::Outbound::Frame(ServerFrame::ConversationHistory { messages, .. }) = rx.recv().await.unwrap()
        else {
            panic!("expected conversation_history");
        };
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, "m0");
        assert_eq!(messages[2].text, "m2");
    }

    #[tokio::test]
    async fn get_all_groups_filters_to_groups_and_own_direct_conversations() {
        let (state, store) = test_state();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = group_conversation("trail", [a, b, c]);
        let direct_with_a = direct_conversation([a, b]);
        let direct_without_a = direct_conversation([b, c]);
        store.save_conversation(&group).await.unwrap();
        store.save_conversation(&direct_with_a).await.unwrap();
        store.save_conversation(&direct_without_a).await.unwrap();
        let (mut rx, _) = state.hub.register(a);

        handle_frame(&state, a, ClientFrame::GetAllGroups {}).await;

        let crate::hub::Outbound::Frame(ServerFrame::AllGroups { conversations }) = rx.recv().await.unwrap() else {
            panic!("expected all_groups");
        };
        let ids: Vec<_> = conversations.iter().map(|c| c.id).collect();
        assert!(ids.contains(&group.id));
        assert!(ids.contains(&direct_with_a.id));
        assert!(!ids.contains(&direct_without_a.id));
    }
}

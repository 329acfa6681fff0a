//! HTTP surface (§6): the "conversation-modifying side channel" consumed by
//! clients that aren't maintaining a live WebSocket session — create/join/
//! leave/add-bot/remove-bot/list/history/image-upload. Every state change
//! made here that a live session cares about is mirrored onto the Hub so
//! open WebSocket connections learn about it without polling.

use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use taxon_common::model::{Conversation, ConversationKind, Message};
use taxon_store::ConversationUpdate;
use uuid::Uuid;

use crate::error::ApiError;
use crate::protocol::ServerFrame;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub participants: BTreeSet<Uuid>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

/// `POST /api/conversations` (§4.10, §6). A one-to-one request dedupes
/// against an existing conversation for the same participant pair; a group
/// request always creates a new conversation and broadcasts `group_created`
/// to every connected user, per the original's "everyone should see new
/// groups appear" behavior.
pub async fn create_conversation(
    State(state): State<SharedState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = match req.kind {
        ConversationKind::Direct => state.store.get_or_create_direct(req.participants).await?,
        ConversationKind::Group => {
            let conversation = Conversation {
                id: Uuid::new_v4(),
                name: req.name,
                kind: ConversationKind::Group,
                participants: req.participants,
                created_at: chrono::Utc::now(),
                has_bot: false,
            };
            state.store.save_conversation(&conversation).await?;
            state.hub.broadcast_all(ServerFrame::GroupCreated {
                conversation: conversation.clone(),
            });
            conversation
        }
    };
    Ok(Json(ConversationResponse { conversation }))
}

pub async fn get_conversation(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| taxon_common::Error::NotFound(format!("conversation {conversation_id} not found")))?;
    Ok(Json(ConversationResponse { conversation }))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_messages_limit")]
    pub limit: usize,
}

fn default_messages_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// `GET /api/conversations/{id}/messages?limit=50`. Reversed to
/// chronological order, matching the WebSocket history frame's contract.
pub async fn get_messages(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let mut messages = state.store.get_messages(conversation_id, query.limit).await?;
    messages.reverse();
    Ok(Json(MessagesResponse { messages }))
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

/// `GET /api/conversations?user_id=...`. Without `user_id`, only group
/// conversations are visible (there is no participant to filter direct
/// conversations by).
pub async fn list_conversations(
    State(state): State<SharedState>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations = match query.user_id {
        Some(user_id) => state.store.list_visible_conversations(user_id).await?,
        None => state
            .store
            .list_visible_conversations(Uuid::nil())
            .await?
            .into_iter()
            .filter(|c| matches!(c.kind, ConversationKind::Group))
            .collect(),
    };
    Ok(Json(ConversationsResponse { conversations }))
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MembershipResponse {
    Updated { conversation: Conversation },
    NoOp { message: String },
}

/// `POST /api/conversations/{id}/join`. Idempotent: an existing member
/// rejoining is a no-op and does not re-broadcast.
pub async fn join_conversation(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<MembershipRequest>,
) -> Result<Json<MembershipResponse>, ApiError> {
    let conversation = require_group(&state, conversation_id).await?;
    if conversation.participants.contains(&req.user_id) {
        return Ok(Json(MembershipResponse::NoOp {
            message: "Already a member".into(),
        }));
    }

    let mut participants = conversation.participants.clone();
    participants.insert(req.user_id);
    let updated = state
        .store
        .update_conversation(conversation_id, ConversationUpdate {
            participants: Some(participants),
            ..Default::default()
        })
        .await?;

    state.hub.broadcast(
        conversation_id,
        ServerFrame::UserJoinedGroup {
            conversation_id,
            user_id: req.user_id,
            conversation: updated.clone(),
        },
        None,
    ).await;

    Ok(Json(MembershipResponse::Updated { conversation: updated }))
}

/// `POST /api/conversations/{id}/leave`. Rejects a non-member with 400.
pub async fn leave_conversation(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<MembershipRequest>,
) -> Result<Json<MembershipResponse>, ApiError> {
    let conversation = require_group(&state, conversation_id).await?;
    if !conversation.participants.contains(&req.user_id) {
        return Err(taxon_common::Error::InvalidInput("user is not a member of this conversation".into()).into());
    }

    let mut participants = conversation.participants.clone();
    participants.remove(&req.user_id);
    let updated = state
        .store
        .update_conversation(conversation_id, ConversationUpdate {
            participants: Some(participants),
            ..Default::default()
        })
        .await?;

    state.hub.broadcast(
        conversation_id,
        ServerFrame::UserLeftGroup {
            conversation_id,
            user_id: req.user_id,
            conversation: updated.clone(),
        },
        None,
    ).await;

    Ok(Json(MembershipResponse::Updated { conversation: updated }))
}

#[derive(Debug, Serialize)]
pub struct BotToggleResponse {
    pub message: String,
    #[serde(rename = "hasBot")]
    pub has_bot: bool,
}

/// `POST /api/conversations/{id}/add-bot`. A no-op (no broadcast) when the
/// bot is already present, mirroring the WebSocket `/bot` command's
/// idempotence.
pub async fn add_bot(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<BotToggleResponse>, ApiError> {
    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| taxon_common::Error::NotFound(format!("conversation {conversation_id} not found")))?;
    if conversation.has_bot {
        return Ok(Json(BotToggleResponse {
            message: "Bot already in conversation".into(),
            has_bot: true,
        }));
    }

    state
        .store
        .update_conversation(conversation_id, ConversationUpdate::set_has_bot(true))
        .await?;
    state.hub.broadcast(
        conversation_id,
        ServerFrame::BotAdded {
            conversation_id,
            message: "AI Bot has been added to the conversation".into(),
            timestamp: chrono::Utc::now(),
        },
        None,
    ).await;

    Ok(Json(BotToggleResponse {
        message: "Bot added".into(),
        has_bot: true,
    }))
}

pub async fn remove_bot(
    State(state): State<SharedState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<BotToggleResponse>, ApiError> {
    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| taxon_common::Error::NotFound(format!("conversation {conversation_id} not found")))?;
    if !conversation.has_bot {
        return Ok(Json(BotToggleResponse {
            message: "Bot already removed from conversation".into(),
            has_bot: false,
        }));
    }

    state
        .store
        .update_conversation(conversation_id, ConversationUpdate::set_has_bot(false))
        .await?;
    state.hub.broadcast(
        conversation_id,
        ServerFrame::BotRemoved {
            conversation_id,
            message: "AI Bot has been removed from the conversation".into(),
            timestamp: chrono::Utc::now(),
        },
        None,
    ).await;

    Ok(Json(BotToggleResponse {
        message: "Bot removed".into(),
        has_bot: false,
    }))
}

async fn require_group(state: &SharedState, conversation_id: Uuid) -> Result<Conversation, ApiError> {
    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| taxon_common::Error::NotFound(format!("conversation {conversation_id} not found")))?;
    if !matches!(conversation.kind, ConversationKind::Group) {
        return Err(taxon_common::Error::InvalidInput("conversation is not a group".into()).into());
    }
    Ok(conversation)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadRequest {
    pub image_base64: String,
    pub image_mime_type: String,
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadResponse {
    pub image_url: String,
    pub success: bool,
}

/// `POST /api/images/upload` (§1: the image-upload-to-object-store
/// collaborator). Decodes the inline payload and hands it to the image
/// store; the WebSocket `send_image` path uses the same store directly.
pub async fn upload_image(
    State(state): State<SharedState>,
    Json(req): Json<ImageUploadRequest>,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.image_base64.as_bytes())
        .map_err(|e| taxon_common::Error::InvalidInput(format!("invalid base64 image data: {e}")))?;
    let image_url = state
        .image_store
        .store(req.conversation_id, &req.image_mime_type, bytes)
        .await?;
    Ok(Json(ImageUploadResponse {
        image_url,
        success: true,
    }))
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
    use taxon_test_utils::fixtures::group_conversation;
    use taxon_test_utils::{FakeEmbeddingClient, FakeLlmBackend, FakeVectorIndexClient};

    fn test_state() -> (SharedState, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::new());
        let hub = Arc::new(Hub::new(store.clone(), Duration::from_secs(30)));
        let llm = Arc::new(FakeLlmBackend::with_response("ok"));
        let plant = Retriever::new(Arc::new(FakeEmbeddingClient::new(3)), Arc::new(FakeVectorIndexClient::new()), 5);
        let animal = Retriever::new(Arc::new(FakeEmbeddingClient::new(3)), Arc::new(FakeVectorIndexClient::new()), 5);
        let orchestrator = Arc::new(RagOrchestrator::new(llm, plant, animal, "plants", "animals"));
        let image_store = Arc::new(LocalImageStore::new(
            std::env::temp_dir().join(format!("taxon-http-test-{}", Uuid::new_v4())),
            "/media",
        ));
        let state: SharedState = Arc::new(AppState::new(store.clone(), hub, orchestrator, image_store));
        (state, store)
    }

    #[tokio::test]
    async fn creating_a_direct_conversation_twice_returns_the_same_one() {
        let (state, _store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let participants: BTreeSet<Uuid> = [a, b].into_iter().collect();

        let first = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                kind: ConversationKind::Direct,
                participants: participants.clone(),
                name: None,
            }),
        )
        .await
        .unwrap();
        let second = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                kind: ConversationKind::Direct,
                participants,
                name: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(first.0.conversation.id, second.0.conversation.id);
    }

    #[tokio::test]
    async fn joining_a_group_is_idempotent_and_only_broadcasts_once() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = group_conversation("trail", [a]);
        store.save_conversation(&conversation).await.unwrap();
        let (mut b_rx, _) = state.hub.register(b);

        let first = join_conversation(
            State(state.clone()),
            Path(conversation.id),
            Json(MembershipRequest { user_id: b }),
        )
        .await
        .unwrap();
        assert!(matches!(first.0, MembershipResponse::Updated { .. }));

        let crate::hub::Outbound::Frame(ServerFrame::UserJoinedGroup { .. }) = b_rx.recv().await.unwrap() else {
            panic!("expected a user_joined_group broadcast");
        };

        let second = join_conversation(
            State(state.clone()),
            Path(conversation.id),
            Json(MembershipRequest { user_id: b }),
        )
        .await
        .unwrap();
        assert!(matches!(second.0, MembershipResponse::NoOp { .. }));
        assert!(b_rx.try_recv().is_err(), "no second broadcast for an already-joined member");
    }

    #[tokio::test]
    async fn leaving_requires_membership() {
        let (state, store) = test_state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = group_conversation("trail", [a]);
        store.save_conversation(&conversation).await.unwrap();

        let err = leave_conversation(
            State(state.clone()),
            Path(conversation.id),
            Json(MembershipRequest { user_id: b }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, taxon_common::Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn add_bot_is_a_no_op_once_already_present() {
        let (state, store) = test_state();
        let a = Uuid::new_v4();
        let mut conversation = group_conversation("trail", [a]);
        conversation.has_bot = true;
        store.save_conversation(&conversation).await.unwrap();

        let resp = add_bot(State(state.clone()), Path(conversation.id)).await.unwrap();
        assert_eq!(resp.0.message, "Bot already in conversation");
    }

    #[tokio::test]
    async fn upload_image_decodes_and_stores_bytes() {
        let (state, _store) = test_state();
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode([1, 2, 3, 4]);
        let resp = upload_image(
            State(state),
            Json(ImageUploadRequest {
                image_base64: encoded,
                image_mime_type: "image/png".into(),
                conversation_id: Uuid::new_v4(),
            }),
        )
        .await
        .unwrap();
        assert!(resp.0.success);
        assert!(resp.0.image_url.ends_with(".png"));
    }
}

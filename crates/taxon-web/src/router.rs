//! Axum router (§6): the WebSocket upgrade endpoint plus the HTTP side
//! channel for conversation/group/bot/image operations that don't require
//! a live session.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::http::{
    add_bot, create_conversation, get_conversation, get_messages, join_conversation,
    leave_conversation, list_conversations, remove_bot, upload_image,
};
use crate::state::{AppState, SharedState};
use crate::ws::ws_handler;

/// Build and return the full Axum router. `media_dir` is served statically
/// at `/media`, matching `LocalImageStore`'s public prefix.
pub fn build_router(state: AppState, media_dir: impl Into<std::path::PathBuf>) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        // WebSocket (§4.9/§4.10)
        .route("/ws/{user_id}", get(ws_handler))
        // HTTP side channel (§6)
        .route("/api/conversations", get(list_conversations).post(create_conversation))
        .route("/api/conversations/{id}", get(get_conversation))
        .route("/api/conversations/{id}/messages", get(get_messages))
        .route("/api/conversations/{id}/join", post(join_conversation))
        .route("/api/conversations/{id}/leave", post(leave_conversation))
        .route("/api/conversations/{id}/add-bot", post(add_bot))
        .route("/api/conversations/{id}/remove-bot", post(remove_bot))
        .route("/api/images/upload", post(upload_image))
        // Uploaded images served back to clients.
        .nest_service("/media", ServeDir::new(media_dir.into()))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

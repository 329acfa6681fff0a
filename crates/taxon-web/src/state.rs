//! Shared application state injected into every handler and session task.

use std::sync::Arc;

use taxon_rag::RagOrchestrator;
use taxon_store::ConversationStore;

use crate::hub::Hub;
use crate::image_store::ImageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub hub: Arc<Hub>,
    pub orchestrator: Arc<RagOrchestrator>,
    pub image_store: Arc<dyn ImageStore>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        hub: Arc<Hub>,
        orchestrator: Arc<RagOrchestrator>,
        image_store: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            store,
            hub,
            orchestrator,
            image_store,
            http_client: reqwest::Client::new(),
        }
    }
}

pub type SharedState = Arc<AppState>;

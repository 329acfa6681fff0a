//! taxon-server — binary entrypoint (SPEC_FULL §1 "Deployment shape").
//!
//! Loads configuration, constructs the embedding / vector-index / LLM
//! clients and the conversation store, wires the RAG Orchestrator and
//! Connection Hub, builds the axum router, and serves the WebSocket + HTTP
//! surface on `BIND_ADDR`.
//!
//! Run with: cargo run -p taxon-server

use std::sync::Arc;

use secrecy::ExposeSecret;
use taxon_config::{Config, StoreBackend};
use taxon_embed::HttpEmbeddingClient;
use taxon_llm::{HttpLlmBackend, LlmBackend};
use taxon_rag::{RagOrchestrator, Retriever};
use taxon_store::{ConversationStore, InMemoryConversationStore, SledConversationStore};
use taxon_vectorstore::HttpVectorIndexClient;
use taxon_web::hub::Hub;
use taxon_web::image_store::{ImageStore, LocalImageStore};
use taxon_web::router::build_router;
use taxon_web::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("starting taxon-server");

    let embedder: Arc<dyn taxon_embed::EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(
        config.embedding_base_url.clone(),
        config.embedding_api_key.expose_secret().to_string(),
        config.embedding_model.clone(),
        config.embedding_dimension,
    ));
    let vector_index = Arc::new(HttpVectorIndexClient::new(
        config.vector_index_base_url.clone(),
        config.vector_index_api_key.expose_secret().to_string(),
    ));
    let llm: Arc<dyn LlmBackend> = Arc::new(HttpLlmBackend::new(
        config.llm_base_url.clone(),
        config.llm_model_name.clone(),
        config.llm_api_key.expose_secret().to_string(),
    ));

    let plant_retriever = Retriever::new(embedder.clone(), vector_index.clone(), config.retrieve_oversample);
    let animal_retriever = Retriever::new(embedder, vector_index, config.retrieve_oversample);
    let orchestrator = Arc::new(RagOrchestrator::new(
        llm,
        plant_retriever,
        animal_retriever,
        config.vector_index_plant_name.clone(),
        config.vector_index_animal_name.clone(),
    ));

    let store: Arc<dyn ConversationStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory conversation store");
            Arc::new(InMemoryConversationStore::new())
        }
        StoreBackend::Durable => {
            tracing::info!(dir = %config.store_data_dir, "using durable (sled) conversation store");
            Arc::new(SledConversationStore::open(&config.store_data_dir)?)
        }
    };

    let hub = Arc::new(Hub::new(store.clone(), config.ping_interval));
    let media_dir = std::path::PathBuf::from(&config.store_data_dir).join("media");
    let image_store: Arc<dyn ImageStore> = Arc::new(LocalImageStore::new(media_dir.clone(), "/media"));

    let state = AppState::new(store, hub, orchestrator, image_store);
    let app = build_router(state, media_dir);

    tracing::info!(addr = %config.bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

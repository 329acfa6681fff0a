//! Environment configuration (A1, SPEC_FULL §6): loads and validates the
//! environment variables the server needs, with `.env` support for local
//! dev via `dotenvy`. Process environment wins over `.env`, which wins
//! over the built-in defaults below; the required keys have no default
//! and startup fails fast with a descriptive error if any is absent.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which `ConversationStore` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Durable,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub embedding_api_key: SecretString,
    pub embedding_region: String,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_dimension: usize,

    pub vector_index_api_key: SecretString,
    pub vector_index_base_url: String,
    pub vector_index_plant_name: String,
    pub vector_index_animal_name: String,

    pub llm_api_key: SecretString,
    pub llm_model_name: String,
    pub llm_vision_model_name: String,
    pub llm_base_url: String,

    pub store_backend: StoreBackend,
    pub store_data_dir: String,

    pub bind_addr: SocketAddr,
    pub ping_interval: Duration,
    pub retrieve_oversample: usize,
    pub log_filter: String,
}

impl Config {
    /// Loads from the process environment, falling back to a `.env` file
    /// if present (ignored, not an error, if absent), then the defaults
    /// documented per-field below.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    fn from_env() -> Result<Self, ConfigError> {
        let embedding_model = require("EMBEDDING_MODEL")?;
        let embedding_region = require("EMBEDDING_REGION")?;
        let llm_model_name = require("LLM_MODEL_NAME")?;

        Ok(Self {
            embedding_api_key: SecretString::from(require("EMBEDDING_API_KEY")?),
            embedding_region,
            embedding_model,
            embedding_base_url: optional("EMBEDDING_BASE_URL", "https://api.cohere.ai/v1"),
            embedding_dimension: parse_usize("EMBEDDING_DIMENSION", 1024)?,

            vector_index_api_key: SecretString::from(require("VECTOR_INDEX_API_KEY")?),
            vector_index_base_url: optional("VECTOR_INDEX_BASE_URL", "https://api.pinecone.io"),
            vector_index_plant_name: require("VECTOR_INDEX_PLANT_NAME")?,
            vector_index_animal_name: require("VECTOR_INDEX_ANIMAL_NAME")?,

            llm_api_key: SecretString::from(require("LLM_API_KEY")?),
            llm_vision_model_name: optional("LLM_VISION_MODEL_NAME", &llm_model_name),
            llm_model_name,
            llm_base_url: optional("LLM_BASE_URL", "https://api.openai.com/v1"),

            store_backend: parse_store_backend()?,
            store_data_dir: optional("STORE_DATA_DIR", "./data/taxon-store"),

            bind_addr: parse_socket_addr("BIND_ADDR", "127.0.0.1:8080")?,
            ping_interval: Duration::from_secs(parse_u64("PING_INTERVAL_SECONDS", 30)?),
            retrieve_oversample: parse_usize("RETRIEVE_OVERSAMPLE", 5)?,
            log_filter: optional("TAXON_LOG", &optional("RUST_LOG", "info")),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidVar {
            name,
            value: v,
            reason: "expected a non-negative integer".into(),
        }),
    }
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidVar {
            name,
            value: v,
            reason: "expected a non-negative integer".into(),
        }),
    }
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = optional(name, default);
    raw.parse().map_err(|_| ConfigError::InvalidVar {
        name,
        value: raw,
        reason: "expected host:port".into(),
    })
}

fn parse_store_backend() -> Result<StoreBackend, ConfigError> {
    match optional("STORE_BACKEND", "memory").as_str() {
        "durable" => Ok(StoreBackend::Durable),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(ConfigError::InvalidVar {
            name: "STORE_BACKEND",
            value: other.to_string(),
            reason: "expected \"durable\" or \"memory\"".into(),
        }),
    }
}

impl From<ConfigError> for taxon_common::Error {
    fn from(e: ConfigError) -> Self {
        taxon_common::Error::Internal(e.to_string())
    }
}

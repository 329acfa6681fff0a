//! taxon-ingestion — chunker (C3) and ingestion pipeline (C4).

pub mod chunker;
pub mod pipeline;

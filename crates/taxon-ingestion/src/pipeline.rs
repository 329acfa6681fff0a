//! Ingestion pipeline (C4, §4.4): reads species JSON, skips error records,
//! drives Chunker → Embedding Client → Vector Index Client in batches.

use std::sync::Arc;
use taxon_common::model::{Domain, SpeciesRecord};
use taxon_embed::{EmbedRole, EmbeddingClient};
use taxon_vectorstore::{UpsertItem, VectorIndexClient};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::chunker::chunk_record;

#[derive(Debug, Clone)]
pub struct IngestionProgress {
    pub domain: Domain,
    pub records_seen: usize,
    pub chunks_indexed: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionResult {
    pub records_seen: usize,
    pub records_skipped: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    pub errors: Vec<String>,
}

/// `ingest(domain, records, batch_size)` — §4.4's algorithm:
/// chunk every non-error record, embed each chunk with `role=document`,
/// buffer and flush to the vector index in batches. Per-chunk failures
/// are logged and skipped; the run itself only aborts on a fatal error
/// from the embedder or vector store (credentials, unreachable index).
#[instrument(skip(records, embedder, index, progress_tx))]
pub async fn ingest(
    domain: Domain,
    index_name: &str,
    records: Vec<SpeciesRecord>,
    batch_size: usize,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndexClient>,
    progress_tx: Option<broadcast::Sender<IngestionProgress>>,
) -> taxon_common::Result<IngestionResult> {
    let mut result = IngestionResult::default();
    let mut buffer: Vec<UpsertItem> = Vec::with_capacity(batch_size);

    index
        .ensure_index(index_name, embedder.dimension())
        .await
        .map_err(taxon_common::Error::from)?;

    for record in &records {
        result.records_seen += 1;

        if record.error.is_some() {
            result.records_skipped += 1;
            continue;
        }

        for chunk in chunk_record(record) {
            match embedder.embed(&chunk.text, EmbedRole::Document).await {
                Ok(vector) => {
                    let metadata = serde_json::to_value(&chunk.metadata)
                        .expect("ChunkMetadata always serializes");
                    buffer.push(UpsertItem {
                        id: chunk.id,
                        vector,
                        metadata,
                    });
                }
                Err(e) => {
                    warn!(chunk_id = %chunk.id, error = %e, "chunk embedding failed, skipping");
                    result.chunks_failed += 1;
                    continue;
                }
            }

            if buffer.len() >= batch_size {
                flush(&index, index_name, &mut buffer, &mut result).await?;
                emit(&progress_tx, domain, &result);
            }
        }
    }

    flush(&index, index_name, &mut buffer, &mut result).await?;
    emit(&progress_tx, domain, &result);

    info!(
        domain = %domain,
        records_seen = result.records_seen,
        chunks_indexed = result.chunks_indexed,
        chunks_failed = result.chunks_failed,
        "ingestion run complete"
    );

    Ok(result)
}

async fn flush(
    index: &Arc<dyn VectorIndexClient>,
    index_name: &str,
    buffer: &mut Vec<UpsertItem>,
    result: &mut IngestionResult,
) -> taxon_common::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let n = buffer.len();
    index
        .upsert(index_name, std::mem::take(buffer))
        .await
        .map_err(taxon_common::Error::from)?;
    result.chunks_indexed += n;
    Ok(())
}

fn emit(
    progress_tx: &Option<broadcast::Sender<IngestionProgress>>,
    domain: Domain,
    result: &IngestionResult,
) {
    if let Some(tx) = progress_tx {
        let _ = tx.send(IngestionProgress {
            domain,
            records_seen: result.records_seen,
            chunks_indexed: result.chunks_indexed,
            message: format!(
                "{} records seen, {} chunks indexed",
                result.records_seen, result.chunks_indexed
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use taxon_embed::EmbedError;
    use taxon_vectorstore::{QueryMatch, VectorStoreError};

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, text: &str, _role: EmbedRole) -> Result<Vec<f32>, EmbedError> {
            if text.trim().is_empty() {
                return Err(EmbedError::EmptyInput);
            }
            Ok(vec![text.len() as f32])
        }
        fn dimension(&self) -> usize {
            1
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        upserted: Mutex<Vec<UpsertItem>>,
    }

    #[async_trait]
    impl VectorIndexClient for FakeIndex {
        async fn ensure_index(&self, _name: &str, _dim: usize) -> Result<(), VectorStoreError> {
            Ok(())
        }
        async fn upsert(&self, _name: &str, items: Vec<UpsertItem>) -> Result<(), VectorStoreError> {
            self.upserted.lock().unwrap().extend(items);
            Ok(())
        }
        async fn query(
            &self,
            _name: &str,
            _vector: Vec<f32>,
            _top_k: usize,
        ) -> Result<Vec<QueryMatch>, VectorStoreError> {
            Ok(vec![])
        }
    }

    fn record(name: &str, error: Option<&str>) -> SpeciesRecord {
        SpeciesRecord {
            scientific_name: name.to_string(),
            common_name: "Dandelion".to_string(),
            family: "Asteraceae".to_string(),
            genus: "Taraxacum".to_string(),
            order: None,
            class: None,
            phylum: None,
            kingdom: "Plantae".to_string(),
            summary: "summary".to_string(),
            content: "some content about the species".to_string(),
            wikipedia_url: "https://example.org".to_string(),
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn skips_error_records() {
        let index = Arc::new(FakeIndex::default());
        let result = ingest(
            Domain::Plant,
            "plants",
            vec![record("A", Some("scrape failed")), record("B", None)],
            100,
            Arc::new(FakeEmbedder),
            index.clone(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.records_skipped, 1);
        assert_eq!(result.records_seen, 2);
        assert!(!index.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flushes_on_batch_boundary() {
        let index = Arc::new(FakeIndex::default());
        let records: Vec<_> = (0..5).map(|i| record(&format!("Species {i}"), None)).collect();
        let result = ingest(
            Domain::Plant,
            "plants",
            records,
            2,
            Arc::new(FakeEmbedder),
            index.clone(),
            None,
        )
        .await
        .unwrap();

        // each record yields a basic chunk + content chunks; batch_size=2 forces multiple flushes
        assert_eq!(result.chunks_indexed, index.upserted.lock().unwrap().len());
        assert!(result.chunks_indexed >= 5);
    }
}

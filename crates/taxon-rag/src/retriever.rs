//! Retriever (C5, §4.5): embeds a query, oversamples the domain index, and
//! reassembles the chunks returned into a species-level dossier.

use std::collections::HashMap;
use std::sync::Arc;

use taxon_common::model::{ChunkMetadata, ChunkType, Domain};
use taxon_embed::{EmbedRole, EmbeddingClient};
use taxon_vectorstore::VectorIndexClient;
use tracing::{instrument, warn};

const HEADER_PLANT: &str = "Relevant Plant Information:";
const HEADER_ANIMAL: &str = "Relevant Animal Information:";
const FOOTER_PLANT: &str = "=== END OF PLANT INFORMATION ===";
const FOOTER_ANIMAL: &str = "=== END OF ANIMAL INFORMATION ===";

struct Group {
    scientific_name: String,
    max_score: f32,
    chunks: Vec<ChunkMetadata>,
}

/// One domain query's reconstructed context, ready to drop into a prompt.
/// Empty when nothing matched or the query/embedder degraded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle(pub String);

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndexClient>,
    oversample: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndexClient>,
        oversample: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            oversample,
        }
    }

    /// `retrieve(domain, query, top_k) -> ContextBundle` (§4.5).
    #[instrument(skip(self), fields(domain = %domain, top_k))]
    pub async fn retrieve(&self, domain: Domain, index_name: &str, query: &str, top_k: usize) -> ContextBundle {
        if query.trim().is_empty() {
            return ContextBundle::default();
        }

        let vector = match self.embedder.embed(query, EmbedRole::Query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed, degrading to empty context");
                return ContextBundle::default();
            }
        };

        let oversampled = top_k.saturating_mul(self.oversample).max(top_k);
        let matches = match self.index.query(index_name, vector, oversampled).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "vector index query failed, degrading to empty context");
                return ContextBundle::default();
            }
        };

        let groups = group_by_species(matches, top_k);
        if groups.is_empty() {
            return ContextBundle::default();
        }

        ContextBundle(format_bundle(domain, &groups))
    }
}

fn group_by_species(
    matches: Vec<taxon_vectorstore::QueryMatch>,
    top_k: usize,
) -> Vec<Group> {
    let mut by_name: HashMap<String, Group> = HashMap::new();

    for m in matches {
        let metadata: ChunkMetadata = match serde_json::from_value(m.metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "skipping match with unparsable metadata");
                continue;
            }
        };
        let entry = by_name
            .entry(metadata.scientific_name.clone())
            .or_insert_with(|| Group {
                scientific_name: metadata.scientific_name.clone(),
                max_score: m.score,
                chunks: Vec::new(),
            });
        entry.max_score = entry.max_score.max(m.score);
        entry.chunks.push(metadata);
    }

    let mut groups: Vec<Group> = by_name.into_values().collect();
    groups.sort_by(|a, b| {
        b.max_score
            .partial_cmp(&a.max_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.scientific_name.cmp(&b.scientific_name))
    });
    groups.truncate(top_k);
    groups
}

fn format_bundle(domain: Domain, groups: &[Group]) -> String {
    let (header, footer) = match domain {
        Domain::Plant => (HEADER_PLANT, FOOTER_PLANT),
        Domain::Animal => (HEADER_ANIMAL, FOOTER_ANIMAL),
    };

    let mut parts = vec![header.to_string()];
    for (i, group) in groups.iter().enumerate() {
        parts.push(format_species_block(domain, i + 1, group));
    }
    parts.push(format!("\n{footer}\n"));
    parts.join("\n")
}

fn format_species_block(domain: Domain, index: usize, group: &Group) -> String {
    let basic = group
        .chunks
        .iter()
        .find(|c| c.chunk_type == ChunkType::BasicInfo);
    let mut content_chunks: Vec<&ChunkMetadata> = group
        .chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::DetailedContent)
        .collect();
    content_chunks.sort_by_key(|c| c.chunk_index.unwrap_or(u32::MAX));

    let representative = basic.or_else(|| group.chunks.first());
    let common_name = representative.map(|c| c.common_name.as_str()).unwrap_or("");

    let label = match domain {
        Domain::Plant => "Plant",
        Domain::Animal => "Animal",
    };
    let mut block = vec![format!(
        "\n--- {label} {index}: {} ({common_name}) ---",
        group.scientific_name
    )];

    if let Some(rep) = representative {
        if !rep.family.is_empty() {
            block.push(format!("Family: {}", rep.family));
        }
        if !rep.genus.is_empty() {
            block.push(format!("Genus: {}", rep.genus));
        }
        if matches!(domain, Domain::Animal) {
            if let Some(order) = rep.order.as_deref().filter(|s| !s.is_empty()) {
                block.push(format!("Order: {order}"));
            }
            if let Some(class) = rep.class.as_deref().filter(|s| !s.is_empty()) {
                block.push(format!("Class: {class}"));
            }
            if let Some(phylum) = rep.phylum.as_deref().filter(|s| !s.is_empty()) {
                block.push(format!("Phylum: {phylum}"));
            }
        }
        if !rep.summary.is_empty() {
            block.push(format!("Summary: {}", rep.summary));
        }
    }

    if !content_chunks.is_empty() {
        let details = content_chunks
            .iter()
            .map(|c| c.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        block.push(format!("Details: {details}"));
    }

    if let Some(rep) = representative {
        if !rep.wikipedia_url.is_empty() {
            block.push(format!("Source: {}", rep.wikipedia_url));
        }
    }

    block.join("\n")
}

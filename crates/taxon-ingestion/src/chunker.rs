//! Species-record chunker (C3, §4.3).

use taxon_common::model::{ChunkMetadata, ChunkType, SpeciesRecord};
use taxon_common::sanitize::sanitize_id;

/// Content chunk budget, in characters. `B` in §4.3: content is split on
/// whitespace boundaries into windows of roughly this size, never mid-word.
pub const CONTENT_CHUNK_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// 1 basic chunk + `⌈len(content)/B⌉` content chunks. IDs are
/// `{base}_basic` and `{base}_content_{i}`, `i` monotonic from 0.
pub fn chunk_record(record: &SpeciesRecord) -> Vec<Chunk> {
    let base = sanitize_id(&record.scientific_name);
    let mut chunks = Vec::new();

    chunks.push(basic_chunk(record, &base));
    chunks.extend(content_chunks(record, &base));
    chunks
}

fn basic_chunk(record: &SpeciesRecord, base: &str) -> Chunk {
    let text = format!(
        "Scientific Name: {}\nCommon Name: {}\nFamily: {}\nGenus: {}\nSummary: {}",
        record.scientific_name, record.common_name, record.family, record.genus, record.summary,
    );

    Chunk {
        id: format!("{base}_basic"),
        text: text.clone(),
        metadata: ChunkMetadata {
            scientific_name: record.scientific_name.clone(),
            common_name: record.common_name.clone(),
            family: record.family.clone(),
            genus: record.genus.clone(),
            order: record.order.clone(),
            class: record.class.clone(),
            phylum: record.phylum.clone(),
            kingdom: record.kingdom.clone(),
            summary: record.summary.clone(),
            wikipedia_url: record.wikipedia_url.clone(),
            chunk_text: text,
            chunk_type: ChunkType::BasicInfo,
            chunk_index: None,
        },
    }
}

fn content_chunks(record: &SpeciesRecord, base: &str) -> Vec<Chunk> {
    if record.content.trim().is_empty() {
        return Vec::new();
    }

    split_on_whitespace(&record.content, CONTENT_CHUNK_CHARS)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: format!("{base}_content_{i}"),
            text: text.clone(),
            metadata: ChunkMetadata {
                scientific_name: record.scientific_name.clone(),
                common_name: record.common_name.clone(),
                family: record.family.clone(),
                genus: record.genus.clone(),
                order: record.order.clone(),
                class: record.class.clone(),
                phylum: record.phylum.clone(),
                kingdom: record.kingdom.clone(),
                summary: record.summary.clone(),
                wikipedia_url: record.wikipedia_url.clone(),
                chunk_text: text,
                chunk_type: ChunkType::DetailedContent,
                chunk_index: Some(i as u32),
            },
        })
        .collect()
}

/// Greedily packs whitespace-delimited words into windows of at most
/// `budget` characters (plus one trailing separator), never splitting a
/// word.
fn split_on_whitespace(content: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in content.split_whitespace() {
        let word_len = word.len() + 1; // +1 for the joining space
        if current_len + word_len > budget && !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    if chunks.is_empty() {
        chunks.push(content.to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scientific_name: &str, content: &str) -> SpeciesRecord {
        SpeciesRecord {
            scientific_name: scientific_name.to_string(),
            common_name: "Dandelion".to_string(),
            family: "Asteraceae".to_string(),
            genus: "Taraxacum".to_string(),
            order: None,
            class: None,
            phylum: None,
            kingdom: "Plantae".to_string(),
            summary: "A common flowering plant.".to_string(),
            content: content.to_string(),
            wikipedia_url: "https://en.wikipedia.org/wiki/Taraxacum".to_string(),
            error: None,
        }
    }

    #[test]
    fn produces_basic_chunk_plus_content_chunks() {
        let content = "word ".repeat(400); // ~2000 chars -> 2 content chunks
        let r = record("Taraxacum officinale", &content);
        let chunks = chunk_record(&r);

        assert_eq!(chunks[0].id, "taraxacum_officinale_basic");
        assert!(matches!(chunks[0].metadata.chunk_type, ChunkType::BasicInfo));

        let content_ids: Vec<_> = chunks[1..].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            content_ids,
            vec!["taraxacum_officinale_content_0", "taraxacum_officinale_content_1"]
        );
    }

    #[test]
    fn empty_content_yields_only_basic_chunk() {
        let r = record("Taraxacum officinale", "");
        let chunks = chunk_record(&r);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunk_ids_are_ascii_lower_snake() {
        let r = record("Mentha × piperita", "short content");
        let chunks = chunk_record(&r);
        for c in &chunks {
            assert!(c.id.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_'));
        }
        assert_eq!(chunks[0].id, "mentha_x_piperita_basic");
    }

    #[test]
    fn chunk_text_matches_metadata_chunk_text_byte_for_byte() {
        let content = "word ".repeat(400);
        let r = record("Taraxacum officinale", &content);
        for c in chunk_record(&r) {
            assert_eq!(c.text, c.metadata.chunk_text);
        }
    }

    #[test]
    fn never_splits_mid_word() {
        let content = "a".repeat(50).to_string() + " " + &"b".repeat(2000);
        let r = record("Test species", &content);
        let chunks = chunk_record(&r);
        for c in chunks.iter().skip(1) {
            for word in c.text.split_whitespace() {
                assert!(content.split_whitespace().any(|w| w == word));
            }
        }
    }
}

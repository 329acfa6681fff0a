//! Offline evaluation harness (A5): replays a fixed set of labeled queries
//! through the Intent Classifier and Retriever against live configured
//! backends and prints an accuracy summary. Informational only — never
//! gates a build, unlike the crate's unit/integration tests.
//!
//! Rust analogue of `backend/evaluation/*`'s LLM-as-judge pipeline, scoped
//! down to what this core exposes: no W&B tracking, no judge model, just
//! domain-classification and retrieval accuracy against ground truth.

use std::sync::Arc;

use secrecy::ExposeSecret;
use taxon_common::model::Domain;
use taxon_config::Config;
use taxon_embed::HttpEmbeddingClient;
use taxon_llm::{classify, HttpLlmBackend};
use taxon_rag::Retriever;
use taxon_vectorstore::HttpVectorIndexClient;

struct LabeledQuery {
    query: &'static str,
    expected_domain: ExpectedDomain,
    expected_species: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectedDomain {
    Plant,
    Animal,
    Either,
}

/// Small fixed dataset. Replace or extend with queries drawn from the
/// actual knowledge base content when running against a live index.
const DATASET: &[LabeledQuery] = &[
    LabeledQuery {
        query: "what does poison ivy look like",
        expected_domain: ExpectedDomain::Plant,
        expected_species: None,
    },
    LabeledQuery {
        query: "is this mushroom edible",
        expected_domain: ExpectedDomain::Plant,
        expected_species: None,
    },
    LabeledQuery {
        query: "is a timber rattlesnake venomous",
        expected_domain: ExpectedDomain::Animal,
        expected_species: None,
    },
    LabeledQuery {
        query: "how do I identify a black bear track",
        expected_domain: ExpectedDomain::Animal,
        expected_species: None,
    },
    LabeledQuery {
        query: "tell me about the forest",
        expected_domain: ExpectedDomain::Either,
        expected_species: None,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;

    let embedder = Arc::new(HttpEmbeddingClient::new(
        config.embedding_base_url.clone(),
        config.embedding_api_key.expose_secret().to_string(),
        config.embedding_model.clone(),
        config.embedding_dimension,
    ));
    let vector_index = Arc::new(HttpVectorIndexClient::new(
        config.vector_index_base_url.clone(),
        config.vector_index_api_key.expose_secret().to_string(),
    ));
    let llm: Arc<dyn taxon_llm::LlmBackend> = Arc::new(HttpLlmBackend::new(
        config.llm_base_url.clone(),
        config.llm_model_name.clone(),
        config.llm_api_key.expose_secret().to_string(),
    ));

    let plant_retriever = Retriever::new(embedder.clone(), vector_index.clone(), config.retrieve_oversample);
    let animal_retriever = Retriever::new(embedder, vector_index, config.retrieve_oversample);

    println!("=== taxon-eval: {} labeled queries ===", DATASET.len());

    let mut intent_correct = 0usize;
    let mut species_checked = 0usize;
    let mut species_correct = 0usize;

    for case in DATASET {
        let intent = classify(&llm, case.query).await;
        let predicted = if intent.is_both || intent.is_ambiguous {
            ExpectedDomain::Either
        } else if intent.is_animal {
            ExpectedDomain::Animal
        } else if intent.is_plant {
            ExpectedDomain::Plant
        } else {
            ExpectedDomain::Either
        };

        let intent_match = matches_expected(predicted, case.expected_domain);
        if intent_match {
            intent_correct += 1;
        }

        let top_species = match predicted {
            ExpectedDomain::Plant => top_species_match(
                &plant_retriever,
                Domain::Plant,
                &config.vector_index_plant_name,
                case.query,
            )
            .await,
            ExpectedDomain::Animal => top_species_match(
                &animal_retriever,
                Domain::Animal,
                &config.vector_index_animal_name,
                case.query,
            )
            .await,
            ExpectedDomain::Either => None,
        };

        if let Some(expected_species) = case.expected_species {
            species_checked += 1;
            if top_species.as_deref() == Some(expected_species) {
                species_correct += 1;
            }
        }

        println!(
            "[{}] query={:?} expected={:?} predicted={:?} top_species={:?}",
            if intent_match { "ok" } else { "miss" },
            case.query,
            case.expected_domain,
            predicted,
            top_species,
        );
    }

    println!("---");
    println!(
        "intent accuracy: {}/{} ({:.1}%)",
        intent_correct,
        DATASET.len(),
        100.0 * intent_correct as f64 / DATASET.len() as f64
    );
    if species_checked > 0 {
        println!(
            "retrieval top-species accuracy: {}/{} ({:.1}%)",
            species_correct,
            species_checked,
            100.0 * species_correct as f64 / species_checked as f64
        );
    } else {
        println!("retrieval top-species accuracy: no labeled species in this dataset");
    }

    Ok(())
}

fn matches_expected(predicted: ExpectedDomain, expected: ExpectedDomain) -> bool {
    predicted == expected
}

async fn top_species_match(
    retriever: &Retriever,
    domain: Domain,
    index_name: &str,
    query: &str,
) -> Option<String> {
    let bundle = retriever.retrieve(domain, index_name, query, 1).await;
    if bundle.is_empty() {
        return None;
    }
    // The formatted bundle's first species header is "--- <Label> 1: <scientific_name> (...)".
    bundle
        .0
        .lines()
        .find(|line| line.trim_start().starts_with("---"))
        .and_then(|line| line.split(": ").nth(1))
        .and_then(|rest| rest.split(" (").next())
        .map(str::to_string)
}

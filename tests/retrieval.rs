//! Hybrid retrieval scenarios: determinism, fusion ranking, and HyDE
//! degradation.

mod common;

use archivist::error::Error;
use archivist::models::Source;
use archivist::retrieve::retrieve;
use archivist::store::{PreparedChunk, Repository};

use common::{open_repo, test_config, StubGateway, EMBEDDING_DIM};

const MODEL: &str = "openai/text-embedding-3-small";

fn commit_texts(repo: &Repository, gateway: &StubGateway, path: &str, texts: &[&str]) {
    repo.ensure_vec_index(MODEL, EMBEDDING_DIM).unwrap();
    let source = Source {
        id: uuid::Uuid::new_v4().to_string(),
        path: path.to_string(),
        content_hash: format!("hash-{path}"),
        embedding_model: MODEL.to_string(),
        ingested_at: String::new(),
    };
    let chunks: Vec<PreparedChunk> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| PreparedChunk {
            ordinal: i as i64,
            text: (*text).to_string(),
            context_prefix: String::new(),
            metadata: serde_json::json!({}),
        })
        .collect();
    let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| gateway.embedding_for(t)).collect();
    repo.commit_source(&source, &chunks, &embeddings, "summary")
        .unwrap();
}

fn synonym_gateway() -> StubGateway {
    StubGateway::with_synonyms(&[
        ("rotational", "torque"),
        ("rating", "specification"),
        ("gizmo", "widget"),
        ("twisting", "torque"),
        ("spec", "specification"),
        ("doohickey", "widget"),
    ])
}

/// Three sources with overlapping keywords plus one semantically adjacent
/// but lexically disjoint chunk.
fn seed_corpus(repo: &Repository, gateway: &StubGateway) {
    commit_texts(
        repo,
        gateway,
        "specs.md",
        &[
            "The widget torque specification is forty newton metres for the assembly bolts.",
            "The widget paint colour options include graphite and arctic white finishes.",
        ],
    );
    commit_texts(
        repo,
        gateway,
        "gizmo.md",
        &["Rotational force rating for the gizmo fastener assemblies."],
    );
    commit_texts(
        repo,
        gateway,
        "kitchen.md",
        &[
            "Preheat the oven before baking the bread for best crust development.",
            "Knead the dough until smooth and let it rise for an hour.",
        ],
    );
}

#[tokio::test]
async fn hybrid_retrieval_is_deterministic_and_ranks_exact_match_first() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.hyde = false;
    config.retrieval.top_k = 5;
    config.retrieval.rrf_k = 60;
    config.retrieval.mode = "hybrid".to_string();

    let gateway = synonym_gateway();
    let repo = open_repo(&config);
    seed_corpus(&repo, &gateway);

    let outcome = retrieve("widget torque specification", &repo, &gateway, &config)
        .await
        .unwrap();

    assert!(!outcome.chunks.is_empty());
    // the lexically exact chunk wins both channels' contributions
    assert!(outcome.chunks[0]
        .chunk
        .text
        .contains("widget torque specification"));
    // the lexically disjoint but semantically adjacent chunk makes top 5
    assert!(outcome
        .chunks
        .iter()
        .any(|c| c.chunk.text.contains("gizmo fastener")));

    // identical inputs yield identical order
    let again = retrieve("widget torque specification", &repo, &gateway, &config)
        .await
        .unwrap();
    let ids: Vec<i64> = outcome.chunks.iter().map(|c| c.chunk.id).collect();
    let ids_again: Vec<i64> = again.chunks.iter().map(|c| c.chunk.id).collect();
    assert_eq!(ids, ids_again);

    // fused scores follow the RRF definition over the channels present
    for scored in &outcome.chunks {
        let mut expected = 0.0;
        if let Some(rank) = scored.dense_rank {
            expected += 1.0 / (60.0 + rank as f64);
        }
        if let Some(rank) = scored.bm25_rank {
            expected += 1.0 / (60.0 + rank as f64);
        }
        assert!((scored.rrf_score - expected).abs() < 1e-12);
        assert!(scored.dense_rank.is_some() || scored.bm25_rank.is_some());
    }
}

#[tokio::test]
async fn bm25_channel_sees_the_raw_query_not_the_hypothesis() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.hyde = true;
    config.retrieval.mode = "hybrid".to_string();

    let gateway = synonym_gateway();
    let repo = open_repo(&config);
    seed_corpus(&repo, &gateway);

    // HyDE hypothesis talks about something else entirely; BM25 must still
    // match the raw query terms.
    gateway.push_completions(&["Bread baking requires a hot oven and patience."]);
    let outcome = retrieve("widget torque specification", &repo, &gateway, &config)
        .await
        .unwrap();
    assert!(!outcome.hyde_fell_back);
    let bm25_top = outcome
        .chunks
        .iter()
        .filter(|c| c.bm25_rank == Some(1))
        .collect::<Vec<_>>();
    assert_eq!(bm25_top.len(), 1);
    assert!(bm25_top[0].chunk.text.contains("widget torque"));
}

#[tokio::test]
async fn hyde_failure_falls_back_to_the_raw_query() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.hyde = true;
    config.retrieval.mode = "hybrid".to_string();

    // completions fail, embeddings succeed
    let gateway = StubGateway::failing_completions();
    let repo = open_repo(&config);
    commit_texts(
        &repo,
        &gateway,
        "doc.md",
        &["The widget torque specification is forty newton metres."],
    );

    let outcome = retrieve("widget torque specification", &repo, &gateway, &config)
        .await
        .unwrap();
    assert!(outcome.hyde_fell_back);
    // the raw-query embedding still retrieves the chunk
    assert!(!outcome.chunks.is_empty());
    assert!(outcome.chunks[0].chunk.text.contains("widget torque"));
}

#[tokio::test]
async fn missing_vector_index_fails_fast_with_reingest_directive() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.mode = "hybrid".to_string();

    let gateway = StubGateway::new();
    let repo = open_repo(&config);

    let err = retrieve("anything", &repo, &gateway, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));
    assert!(err.to_string().contains("ingest"));
}

#[tokio::test]
async fn bm25_mode_works_without_any_vector_index() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.mode = "bm25".to_string();
    config.retrieval.hyde = true; // irrelevant in bm25 mode

    let gateway = synonym_gateway();
    let repo = open_repo(&config);
    seed_corpus(&repo, &gateway);

    let calls_before = gateway.total_calls();
    let outcome = retrieve("widget torque specification", &repo, &gateway, &config)
        .await
        .unwrap();
    assert!(!outcome.chunks.is_empty());
    assert!(outcome.chunks.iter().all(|c| c.dense_rank.is_none()));
    // no completion or embedding issued for a lexical-only search
    assert_eq!(gateway.total_calls(), calls_before);
}

#[tokio::test]
async fn empty_bm25_channel_still_yields_dense_results() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.hyde = false;
    config.retrieval.mode = "hybrid".to_string();

    let gateway = synonym_gateway();
    let repo = open_repo(&config);
    seed_corpus(&repo, &gateway);

    // synonym words embed close to the stored chunks but share no literal
    // term, so the BM25 channel returns nothing
    let outcome = retrieve("twisting spec doohickey", &repo, &gateway, &config)
        .await
        .unwrap();
    assert!(!outcome.chunks.is_empty());
    assert!(outcome.chunks.iter().all(|c| c.bm25_rank.is_none()));
}

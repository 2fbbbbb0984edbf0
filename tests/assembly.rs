//! Context-assembly scenarios: relevance filtering, token budget,
//! conflict reporting, and summary caps.

mod common;

use archivist::assemble::{assemble, prompt::build_prompt, prompt::CONTEXT_PREAMBLE};
use archivist::generate::{add_attribution, generate_document};
use archivist::models::{ScoredChunk, Source};
use archivist::store::{PreparedChunk, Repository};

use common::{open_repo, test_config, StubGateway, EMBEDDING_DIM};

const MODEL: &str = "openai/text-embedding-3-small";

/// Commit one source and return its hydrated chunks as retrieval
/// candidates with descending fusion scores.
fn seed_candidates(
    repo: &Repository,
    gateway: &StubGateway,
    path: &str,
    texts: &[&str],
    summary: &str,
) -> Vec<ScoredChunk> {
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
    repo.commit_source(&source, &chunks, &embeddings, summary)
        .unwrap();

    // fresh store: chunk ids are 1-based and contiguous
    let all_ids: Vec<i64> = (1..=texts.len() as i64).collect();
    let hydrated = repo.get_chunks(&all_ids).unwrap();

    hydrated
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| ScoredChunk {
            chunk,
            rrf_score: 1.0 / (60.0 + (i + 1) as f64),
            dense_rank: Some(i + 1),
            bm25_rank: None,
        })
        .collect()
}

#[tokio::test]
async fn low_scoring_chunk_is_discarded() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.relevance_threshold = 4;

    let gateway = StubGateway::scripted(&[
        "[9, 8, 3, 7]", // relevance scores
        "[]",           // no conflicts
    ]);
    let repo = open_repo(&config);
    let candidates = seed_candidates(
        &repo,
        &gateway,
        "doc.md",
        &[
            "first candidate text",
            "second candidate text",
            "third candidate text",
            "fourth candidate text",
        ],
        "a summary",
    );

    let context = assemble("the query", &candidates, &repo, &gateway, &config)
        .await
        .unwrap();

    assert_eq!(context.chunks.len(), 3);
    assert!(context
        .chunks
        .iter()
        .all(|c| !c.text.contains("third candidate")));
    // scored 3 < threshold 4
    assert_eq!(context.relevance[&candidates[2].chunk.id], 3);
}

#[tokio::test]
async fn token_budget_is_a_hard_cumulative_stop() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.token_budget = 1000;

    // four chunks of 400, 400, 300, 300 tokens (4 chars per token)
    let texts: Vec<String> = [400_usize, 400, 300, 300]
        .iter()
        .map(|tokens| "abcd".repeat(*tokens))
        .collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let gateway = StubGateway::scripted(&["[10, 9, 8, 7]", "[]"]);
    let repo = open_repo(&config);
    let candidates = seed_candidates(&repo, &gateway, "doc.md", &text_refs, "s");

    let context = assemble("q", &candidates, &repo, &gateway, &config)
        .await
        .unwrap();

    // 400 + 400 fit; the 300 would push the total to 1100 and packing stops
    assert_eq!(context.chunks.len(), 2);
    assert_eq!(context.context_tokens, 800);
    assert!(context.context_tokens <= config.retrieval.token_budget);
    let packed_ids: Vec<i64> = context.chunks.iter().map(|c| c.id).collect();
    assert_eq!(packed_ids, vec![candidates[0].chunk.id, candidates[1].chunk.id]);
}

#[tokio::test]
async fn conflicts_are_reported_without_blocking_generation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);

    let gateway = StubGateway::new();
    repo.ensure_vec_index(MODEL, EMBEDDING_DIM).unwrap();

    // two sources stating different values for the same quantity
    let mut candidates = Vec::new();
    for (path, text) in [
        ("alpha.md", "The maximum operating temperature is 60 degrees."),
        ("beta.md", "The maximum operating temperature is 85 degrees."),
    ] {
        let source = Source {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            content_hash: format!("hash-{path}"),
            embedding_model: MODEL.to_string(),
            ingested_at: String::new(),
        };
        let chunk = PreparedChunk {
            ordinal: 0,
            text: text.to_string(),
            context_prefix: String::new(),
            metadata: serde_json::json!({}),
        };
        repo.commit_source(
            &source,
            &[chunk],
            &[gateway.embedding_for(text)],
            "temperature notes",
        )
        .unwrap();
        let id = repo.search_bm25(text, 1).unwrap()[0].0;
        let chunk = repo.get_chunks(&[id]).unwrap().remove(0);
        candidates.push(ScoredChunk {
            chunk,
            rrf_score: 1.0 / (60.0 + (candidates.len() + 1) as f64),
            dense_rank: Some(candidates.len() + 1),
            bm25_rank: None,
        });
    }

    let conflict_json = format!(
        r#"[{{"chunk_a": {}, "chunk_b": {}, "topic": "maximum operating temperature",
             "excerpt_a": "60 degrees", "excerpt_b": "85 degrees"}}]"#,
        candidates[0].chunk.id, candidates[1].chunk.id
    );
    gateway.push_completions(&["[10, 10]", &conflict_json, "# Thermal limits\n\nBody.[^1]"]);

    let context = assemble("operating temperature", &candidates, &repo, &gateway, &config)
        .await
        .unwrap();
    assert_eq!(context.conflicts.len(), 1);
    assert_eq!(context.conflicts[0].topic, "maximum operating temperature");

    // generation proceeds despite the conflict
    let prompt = build_prompt("operating temperature", &context, None, &gateway, &config).unwrap();
    let document = generate_document(&gateway, &config.generation.model, &prompt)
        .await
        .unwrap();
    assert!(document.contains("Thermal limits"));

    let attributed = add_attribution(&document, &context);
    assert!(attributed.contains("[^1]: alpha.md §chunk 0"));
    assert!(attributed.contains("[^2]: beta.md §chunk 0"));
}

#[tokio::test]
async fn summary_cap_and_prompt_section_order_hold() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.generation.max_source_summaries = 1;
    config.retrieval.token_budget = 100_000;

    // a project brief on disk, loaded verbatim
    std::fs::write(tmp.path().join("brief.md"), "Project brief text.").unwrap();
    config.project.brief = Some("brief.md".to_string());

    let gateway = StubGateway::new();
    let repo = open_repo(&config);
    repo.ensure_vec_index(MODEL, EMBEDDING_DIM).unwrap();

    let mut candidates = Vec::new();
    for (i, (path, text)) in [
        ("one.md", "Chunk from source one about torque."),
        ("two.md", "Chunk from source two about torque."),
    ]
    .into_iter()
    .enumerate()
    {
        let source = Source {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            content_hash: format!("hash-{path}"),
            embedding_model: MODEL.to_string(),
            ingested_at: String::new(),
        };
        let chunk = PreparedChunk {
            ordinal: 0,
            text: text.to_string(),
            context_prefix: String::new(),
            metadata: serde_json::json!({}),
        };
        repo.commit_source(
            &source,
            &[chunk],
            &[gateway.embedding_for(text)],
            &format!("summary of {path}"),
        )
        .unwrap();
        let id = repo.search_bm25(text, 1).unwrap()[0].0;
        let chunk = repo.get_chunks(&[id]).unwrap().remove(0);
        candidates.push(ScoredChunk {
            chunk,
            rrf_score: 1.0 / (60.0 + (i + 1) as f64),
            dense_rank: Some(i + 1),
            bm25_rank: None,
        });
    }

    gateway.push_completions(&["[10, 10]", "[]"]);
    let context = assemble("torque", &candidates, &repo, &gateway, &config)
        .await
        .unwrap();

    // both sources contribute chunks, but at most one summary is included
    assert_eq!(context.chunks.len(), 2);
    assert_eq!(context.summaries.len(), 1);

    let spec = "Feature spec: document the torque budget.";
    let prompt = build_prompt("torque", &context, Some(spec), &gateway, &config).unwrap();

    let brief_at = prompt.system_prompt.find("Project brief text.").unwrap();
    let spec_at = prompt.system_prompt.find(spec).unwrap();
    let background_at = prompt
        .system_prompt
        .find("Background from sources (max 1):")
        .unwrap();
    let context_at = prompt.system_prompt.find("<context>").unwrap();
    let preamble_at = prompt.system_prompt.find(CONTEXT_PREAMBLE).unwrap();
    assert!(brief_at < spec_at);
    assert!(spec_at < background_at);
    assert!(background_at < context_at);
    assert!(context_at < preamble_at);
    assert!(prompt.system_prompt.ends_with("</context>"));
    assert_eq!(prompt.user_message, "torque");
    assert!(prompt.budget_warning.is_none());
}

#[tokio::test]
async fn scorer_failure_fails_open_and_includes_everything() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());

    // completion failure → every candidate scores 10 and conflicts are empty
    let gateway = StubGateway::failing_completions();
    let repo = open_repo(&config);
    let candidates = seed_candidates(
        &repo,
        &gateway,
        "doc.md",
        &["alpha text", "beta text"],
        "summary",
    );

    let context = assemble("q", &candidates, &repo, &gateway, &config)
        .await
        .unwrap();
    assert_eq!(context.chunks.len(), 2);
    assert!(context.conflicts.is_empty());
    assert!(context.relevance.values().all(|score| *score == 10));
}

#[tokio::test]
async fn empty_candidate_list_assembles_empty_context() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let gateway = StubGateway::new();
    let repo = open_repo(&config);

    let context = assemble("q", &[], &repo, &gateway, &config).await.unwrap();
    assert!(context.chunks.is_empty());
    assert!(context.conflicts.is_empty());
    assert_eq!(context.context_tokens, 0);
    assert_eq!(gateway.total_calls(), 0);
}

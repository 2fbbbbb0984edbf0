//! End-to-end ingest scenarios: idempotence, revision replacement, and
//! path-traversal rejection.

mod common;

use std::sync::atomic::Ordering;

use archivist::error::Error;
use archivist::ingest::{ingest_source, IngestOptions, IngestOutcome};

use common::{open_repo, test_config, StubGateway, EMBEDDING_DIM};

const MODEL: &str = "openai/text-embedding-3-small";

fn yes() -> IngestOptions {
    IngestOptions {
        dry_run: false,
        assume_yes: true,
    }
}

/// 2,400 bytes of seeded text: 300 eight-byte words.
fn seeded_text() -> String {
    (0..300).map(|i| format!("word{i:03} ")).collect()
}

#[tokio::test]
async fn idempotent_ingest_skips_and_issues_no_model_calls() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    // 50-token windows over 2,400 bytes → 12 chunks exactly
    config.chunkers.plaintext.chunk_size = 50;
    config.chunkers.plaintext.overlap = 0.0;

    std::fs::write(tmp.path().join("notes.txt"), seeded_text()).unwrap();
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    let outcome = ingest_source(&repo, &gateway, &config, "notes.txt", yes(), &|_| true)
        .await
        .unwrap();
    match outcome {
        IngestOutcome::Ingested {
            chunks, replaced, ..
        } => {
            assert_eq!(chunks, 12);
            assert!(!replaced);
        }
        other => panic!("expected Ingested, got {other:?}"),
    }

    assert_eq!(repo.count_sources().unwrap(), 1);
    assert_eq!(repo.count_chunks().unwrap(), 12);
    assert_eq!(repo.count_fts().unwrap(), 12);
    assert_eq!(repo.count_vec(MODEL).unwrap(), 12);
    assert_eq!(repo.count_summaries().unwrap(), 1);

    // 12 prefixes + 12 embeddings + 1 summary
    assert_eq!(gateway.complete_calls.load(Ordering::SeqCst), 13);
    assert_eq!(gateway.embed_calls.load(Ordering::SeqCst), 12);
    let calls_after_first = gateway.total_calls();

    // Second run over identical bytes: a no-op with zero model calls.
    let outcome = ingest_source(&repo, &gateway, &config, "notes.txt", yes(), &|_| true)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Skipped { chunks: 12, .. }));
    assert_eq!(repo.count_chunks().unwrap(), 12);
    assert_eq!(repo.count_fts().unwrap(), 12);
    assert_eq!(repo.count_vec(MODEL).unwrap(), 12);
    assert_eq!(repo.count_summaries().unwrap(), 1);
    assert_eq!(gateway.total_calls(), calls_after_first);
}

#[tokio::test]
async fn changed_bytes_at_same_path_replace_the_old_revision() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.chunkers.plaintext.chunk_size = 50;
    config.chunkers.plaintext.overlap = 0.0;

    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    // v1: 2,000 bytes → 10 chunks
    let v1: String = (0..250).map(|i| format!("alfa{i:03} ")).collect();
    std::fs::write(tmp.path().join("notes.txt"), v1).unwrap();
    ingest_source(&repo, &gateway, &config, "notes.txt", yes(), &|_| true)
        .await
        .unwrap();
    assert_eq!(repo.count_chunks().unwrap(), 10);

    // v2: different bytes, 2,800 bytes → 14 chunks
    let v2: String = (0..350).map(|i| format!("brav{i:03} ")).collect();
    std::fs::write(tmp.path().join("notes.txt"), v2).unwrap();
    let outcome = ingest_source(&repo, &gateway, &config, "notes.txt", yes(), &|_| true)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Ingested { replaced: true, .. }
    ));

    // one source row for the path; only the new revision's rows remain
    assert_eq!(repo.count_sources().unwrap(), 1);
    assert_eq!(repo.count_chunks().unwrap(), 14);
    assert_eq!(repo.count_fts().unwrap(), 14);
    assert_eq!(repo.count_vec(MODEL).unwrap(), 14);
    assert_eq!(repo.count_summaries().unwrap(), 1);

    let source = repo.find_source_by_path("notes.txt").unwrap().unwrap();
    assert_eq!(repo.count_chunks_for(&source.id).unwrap(), 14);
    for chunk in repo.list_sources().unwrap() {
        assert_eq!(chunk.path, "notes.txt");
    }
    // every stored chunk belongs to the new revision
    let hits = repo.search_bm25("alfa000", 5).unwrap();
    assert!(hits.is_empty());
    let hits = repo.search_bm25("brav000", 5).unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn traversal_path_is_refused_without_store_mutation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    let err = ingest_source(
        &repo,
        &gateway,
        &config,
        "../../etc/passwd",
        yes(),
        &|_| true,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::PathTraversal(_)));
    assert_eq!(repo.count_sources().unwrap(), 0);
    assert_eq!(repo.count_chunks().unwrap(), 0);
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn embedding_failure_is_fatal_and_commits_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::failing_embeddings();

    std::fs::write(tmp.path().join("doc.txt"), "some content to embed").unwrap();
    let err = ingest_source(&repo, &gateway, &config, "doc.txt", yes(), &|_| true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderFatal(_)));

    // nothing persisted: a later retry starts from scratch
    assert_eq!(repo.count_sources().unwrap(), 0);
    assert_eq!(repo.count_chunks().unwrap(), 0);
    assert_eq!(repo.count_summaries().unwrap(), 0);
}

#[tokio::test]
async fn declined_cost_preview_writes_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    std::fs::write(tmp.path().join("doc.txt"), "content").unwrap();
    let options = IngestOptions {
        dry_run: false,
        assume_yes: false,
    };
    let outcome = ingest_source(&repo, &gateway, &config, "doc.txt", options, &|_| false)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Declined { .. }));
    assert_eq!(repo.count_chunks().unwrap(), 0);
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn dry_run_reports_chunk_count_only() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    std::fs::write(tmp.path().join("doc.md"), "# Title\n\nBody text.").unwrap();
    let options = IngestOptions {
        dry_run: true,
        assume_yes: true,
    };
    let outcome = ingest_source(&repo, &gateway, &config, "doc.md", options, &|_| true)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::DryRun { chunks: 1, .. }));
    assert_eq!(repo.count_chunks().unwrap(), 0);
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    std::fs::write(tmp.path().join("tool.exe"), [0_u8; 16]).unwrap();
    let err = ingest_source(&repo, &gateway, &config, "tool.exe", yes(), &|_| true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSource(_)));
}

#[tokio::test]
async fn vec_index_matches_embedding_dimension() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let repo = open_repo(&config);
    let gateway = StubGateway::new();

    std::fs::write(tmp.path().join("a.txt"), "alpha beta gamma").unwrap();
    ingest_source(&repo, &gateway, &config, "a.txt", yes(), &|_| true)
        .await
        .unwrap();

    // the index created on demand carries the stub's dimension
    let err = repo.ensure_vec_index(MODEL, EMBEDDING_DIM + 1).unwrap_err();
    assert!(matches!(err, Error::StoreIntegrity(_)));
    repo.ensure_vec_index(MODEL, EMBEDDING_DIM).unwrap();
}

//! Hybrid retriever: BM25 + dense channels fused with Reciprocal Rank
//! Fusion, with optional HyDE query expansion on the dense side.
//!
//! The dense query vector always comes from the embedding model used at
//! ingest; a missing vector index for that model fails fast with a
//! directive to re-ingest. HyDE failure is a warning, never an error: the
//! raw query is embedded instead. BM25 always sees the raw query.

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionOptions, Gateway};
use crate::models::ScoredChunk;
use crate::store::Repository;

const HYDE_PROMPT: &str = "You are a helpful assistant. Write a concise, factual answer \
(1 paragraph, max 100 tokens) to the following question. Do not ask for clarification.";

const HYDE_MAX_TOKENS: u32 = 100;

/// Retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Hybrid,
    Dense,
    Bm25,
}

impl Mode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "hybrid" => Ok(Mode::Hybrid),
            "dense" => Ok(Mode::Dense),
            "bm25" => Ok(Mode::Bm25),
            other => Err(Error::Config(format!(
                "retrieval.mode must be one of hybrid, dense, bm25 (got '{other}')"
            ))),
        }
    }
}

/// Result of one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Fused candidates, best first, hydrated to full chunks.
    pub chunks: Vec<ScoredChunk>,
    /// True when HyDE was enabled but failed and the raw query was embedded.
    pub hyde_fell_back: bool,
}

pub async fn retrieve(
    query: &str,
    repo: &Repository,
    gateway: &dyn Gateway,
    config: &Config,
) -> Result<RetrievalOutcome> {
    let mode = Mode::parse(&config.retrieval.mode)?;
    let top_k = config.retrieval.top_k;
    let rrf_k = config.retrieval.rrf_k;
    let embedding_model = &config.embedding.model;

    // Fail fast when the configured embedding model has no index.
    if mode != Mode::Bm25 && !repo.vec_index_exists(embedding_model)? {
        return Err(Error::SchemaMismatch {
            model: embedding_model.clone(),
        });
    }

    let mut hyde_fell_back = false;

    let dense_ids: Vec<i64> = if mode == Mode::Bm25 {
        Vec::new()
    } else {
        let embed_text = if config.retrieval.hyde {
            match hypothetical_answer(gateway, &config.retrieval.hyde_model, query).await {
                Ok(answer) => answer,
                Err(err) => {
                    warn!(error = %err, "HyDE expansion failed, embedding the raw query");
                    hyde_fell_back = true;
                    query.to_string()
                }
            }
        } else {
            query.to_string()
        };
        let vector = gateway.embed(embedding_model, &embed_text).await?;
        repo.search_vec(embedding_model, &vector, top_k)?
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    };

    let bm25_ids: Vec<i64> = if mode == Mode::Dense {
        Vec::new()
    } else {
        repo.search_bm25(query, top_k)?
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    };

    let fused = fuse_rrf(&dense_ids, &bm25_ids, rrf_k);
    let selected: Vec<&FusedCandidate> = fused.iter().take(top_k).collect();
    debug!(
        dense = dense_ids.len(),
        bm25 = bm25_ids.len(),
        fused = fused.len(),
        "retrieval channels fused"
    );

    let ids: Vec<i64> = selected.iter().map(|c| c.chunk_id).collect();
    let chunks = repo.get_chunks(&ids)?;

    let scored = chunks
        .into_iter()
        .zip(selected)
        .map(|(chunk, candidate)| ScoredChunk {
            chunk,
            rrf_score: candidate.score,
            dense_rank: candidate.dense_rank,
            bm25_rank: candidate.bm25_rank,
        })
        .collect();

    Ok(RetrievalOutcome {
        chunks: scored,
        hyde_fell_back,
    })
}

async fn hypothetical_answer(
    gateway: &dyn Gateway,
    model: &str,
    query: &str,
) -> Result<String> {
    let messages = [
        ChatMessage::system(HYDE_PROMPT),
        ChatMessage::user(query.to_string()),
    ];
    let answer = gateway
        .complete(
            model,
            &messages,
            CompletionOptions::with_max_tokens(HYDE_MAX_TOKENS),
        )
        .await?;
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        Ok(query.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// A fused candidate before hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: i64,
    pub score: f64,
    pub dense_rank: Option<usize>,
    pub bm25_rank: Option<usize>,
}

/// Reciprocal Rank Fusion over two ranked id lists.
///
/// `score(c) = Σ 1/(k + rank_channel(c))` summed over the channels that
/// returned the chunk, ranks 1-based. Sorted by descending score with ties
/// broken by ascending chunk id, so identical inputs yield identical order.
pub fn fuse_rrf(dense: &[i64], bm25: &[i64], rrf_k: u32) -> Vec<FusedCandidate> {
    use std::collections::BTreeMap;

    let k = f64::from(rrf_k.max(1));
    let mut merged: BTreeMap<i64, FusedCandidate> = BTreeMap::new();

    for (index, id) in dense.iter().enumerate() {
        let rank = index + 1;
        let entry = merged.entry(*id).or_insert(FusedCandidate {
            chunk_id: *id,
            score: 0.0,
            dense_rank: None,
            bm25_rank: None,
        });
        entry.score += 1.0 / (k + rank as f64);
        entry.dense_rank = Some(rank);
    }
    for (index, id) in bm25.iter().enumerate() {
        let rank = index + 1;
        let entry = merged.entry(*id).or_insert(FusedCandidate {
            chunk_id: *id,
            score: 0.0,
            dense_rank: None,
            bm25_rank: None,
        });
        entry.score += 1.0 / (k + rank as f64);
        entry.bm25_rank = Some(rank);
    }

    // BTreeMap iteration gives ascending chunk id, which a stable sort by
    // score preserves for ties.
    let mut fused: Vec<FusedCandidate> = merged.into_values().collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

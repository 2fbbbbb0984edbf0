//! Context assembler: relevance scoring, conflict detection, and
//! token-budgeted packing of retrieved chunks.
//!
//! Scoring fails open: if the batched score call cannot be parsed, every
//! chunk scores 10 — better to include than to silently drop. Conflict
//! detection failure degrades to an empty report and never blocks
//! generation; resolving conflicts is the operator's job.

pub mod prompt;

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::chunk::floor_char_boundary;
use crate::config::Config;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, Gateway};
use crate::models::{Chunk, Conflict, ScoredChunk};
use crate::store::Repository;

const SCORE_SYSTEM: &str = "You are a relevance judge. For each numbered chunk, output a JSON \
array of integers (0-10) indicating how relevant the chunk is to the query. 10 = highly \
relevant, 0 = completely irrelevant. Output ONLY a JSON array of integers, no explanations.";

const CONFLICT_SYSTEM: &str = "You are a fact-checking assistant. Analyze the following chunks \
from different sources and identify factual contradictions between them, such as distinct \
values for the same physical quantity. Output a JSON array of conflict objects with keys: \
'chunk_a', 'chunk_b' (the numeric chunk ids), 'topic', 'excerpt_a', 'excerpt_b'. If there are \
no conflicts, output an empty array []. Output ONLY a JSON array, no explanations.";

const SCORE_EXCERPT_CHARS: usize = 500;
const CONFLICT_EXCERPT_CHARS: usize = 400;
const CONFLICT_MAX_CHUNKS: usize = 20;
const FAIL_OPEN_SCORE: u8 = 10;

/// The packed context handed to prompt assembly and generation.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Budget-packed chunks in inclusion order (relevance-descending).
    pub chunks: Vec<Chunk>,
    /// Relevance score per included-candidate chunk id.
    pub relevance: HashMap<i64, u8>,
    /// Factual contradictions among the surviving candidates.
    pub conflicts: Vec<Conflict>,
    /// Token count of the packed chunks under the generation model.
    pub context_tokens: usize,
    /// Source path per source id, for labels and attribution.
    pub source_paths: HashMap<String, String>,
    /// Selected source summaries as (source path, summary), capped.
    pub summaries: Vec<(String, String)>,
}

pub async fn assemble(
    query: &str,
    candidates: &[ScoredChunk],
    repo: &Repository,
    gateway: &dyn Gateway,
    config: &Config,
) -> Result<AssembledContext> {
    if candidates.is_empty() {
        return Ok(AssembledContext::default());
    }

    let scorer_model = &config.retrieval.scorer_model;
    let generation_model = &config.generation.model;

    // 1. Relevance scoring, one batched call.
    let scores = score_candidates(gateway, scorer_model, query, candidates).await;
    let relevance: HashMap<i64, u8> = candidates
        .iter()
        .zip(&scores)
        .map(|(c, score)| (c.chunk.id, *score))
        .collect();

    // 2. Threshold filter.
    let mut surviving: Vec<&ScoredChunk> = candidates
        .iter()
        .zip(&scores)
        .filter(|(_, score)| **score >= config.retrieval.relevance_threshold)
        .map(|(c, _)| c)
        .collect();
    debug!(
        candidates = candidates.len(),
        surviving = surviving.len(),
        "relevance filter applied"
    );
    if surviving.is_empty() {
        return Ok(AssembledContext {
            relevance,
            ..AssembledContext::default()
        });
    }

    // 3. Order: relevance desc, fusion score desc, chunk id asc.
    surviving.sort_by(|a, b| {
        relevance[&b.chunk.id]
            .cmp(&relevance[&a.chunk.id])
            .then_with(|| {
                b.rrf_score
                    .partial_cmp(&a.rrf_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });

    // 4. Conflict detection over the survivors (single call, non-fatal).
    let conflicts = detect_conflicts(gateway, scorer_model, &surviving).await;

    // 5. Greedy token-budget packing; stop at the first overflow.
    let mut packed: Vec<Chunk> = Vec::new();
    let mut context_tokens = 0;
    for candidate in &surviving {
        let tokens = gateway.count_tokens(generation_model, &candidate.chunk.text);
        if context_tokens + tokens > config.retrieval.token_budget {
            break;
        }
        context_tokens += tokens;
        packed.push(candidate.chunk.clone());
    }

    // 6. Source paths + summary selection for the packed set.
    let mut contributing: HashMap<String, usize> = HashMap::new();
    for chunk in &packed {
        *contributing.entry(chunk.source_id.clone()).or_default() += 1;
    }
    let mut source_paths = HashMap::new();
    for source_id in contributing.keys() {
        if let Some(source) = repo.get_source(source_id)? {
            source_paths.insert(source_id.clone(), source.path);
        }
    }

    let mut ranked_sources: Vec<(String, usize)> = contributing.into_iter().collect();
    ranked_sources.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            let path_a = source_paths.get(&a.0).cloned().unwrap_or_default();
            let path_b = source_paths.get(&b.0).cloned().unwrap_or_default();
            path_a.cmp(&path_b)
        })
    });

    let mut summaries = Vec::new();
    for (source_id, _) in ranked_sources
        .iter()
        .take(config.generation.max_source_summaries)
    {
        if let Some(summary) = repo.get_summary(source_id)? {
            if !summary.trim().is_empty() {
                let path = source_paths.get(source_id).cloned().unwrap_or_default();
                summaries.push((path, summary));
            }
        }
    }

    Ok(AssembledContext {
        chunks: packed,
        relevance,
        conflicts,
        context_tokens,
        source_paths,
        summaries,
    })
}

// ------------------------------------------------------------------
// Relevance scoring
// ------------------------------------------------------------------

async fn score_candidates(
    gateway: &dyn Gateway,
    model: &str,
    query: &str,
    candidates: &[ScoredChunk],
) -> Vec<u8> {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, excerpt(&c.chunk.text, SCORE_EXCERPT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");
    let messages = [
        ChatMessage::system(SCORE_SYSTEM),
        ChatMessage::user(format!("Query: {query}\n\nChunks:\n{listing}")),
    ];

    match gateway
        .complete(model, &messages, CompletionOptions::with_max_tokens(256))
        .await
    {
        Ok(raw) => parse_score_array(&raw, candidates.len()),
        Err(err) => {
            warn!(error = %err, "relevance scoring failed, including all candidates");
            vec![FAIL_OPEN_SCORE; candidates.len()]
        }
    }
}

/// Parse the scorer output. Any shortfall fails open to 10.
fn parse_score_array(raw: &str, expected: usize) -> Vec<u8> {
    let parsed = extract_json_array(raw).and_then(|value| {
        value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|v| v.as_i64().map(|n| n.clamp(0, 10) as u8))
                    .collect::<Vec<Option<u8>>>()
            })
            .map(|scores| {
                scores
                    .into_iter()
                    .map(|s| s.unwrap_or(FAIL_OPEN_SCORE))
                    .collect::<Vec<u8>>()
            })
    });

    match parsed {
        Some(mut scores) => {
            scores.truncate(expected);
            while scores.len() < expected {
                scores.push(FAIL_OPEN_SCORE);
            }
            scores
        }
        None => vec![FAIL_OPEN_SCORE; expected],
    }
}

// ------------------------------------------------------------------
// Conflict detection
// ------------------------------------------------------------------

async fn detect_conflicts(
    gateway: &dyn Gateway,
    model: &str,
    surviving: &[&ScoredChunk],
) -> Vec<Conflict> {
    if surviving.len() < 2 {
        return Vec::new();
    }

    let listing = surviving
        .iter()
        .take(CONFLICT_MAX_CHUNKS)
        .map(|c| {
            format!(
                "[chunk {}] (source {})\n{}",
                c.chunk.id,
                c.chunk.source_id,
                excerpt(&c.chunk.text, CONFLICT_EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let messages = [
        ChatMessage::system(CONFLICT_SYSTEM),
        ChatMessage::user(listing),
    ];

    match gateway
        .complete(model, &messages, CompletionOptions::with_max_tokens(512))
        .await
    {
        Ok(raw) => parse_conflicts(&raw),
        Err(err) => {
            warn!(error = %err, "conflict detection failed, reporting none");
            Vec::new()
        }
    }
}

fn parse_conflicts(raw: &str) -> Vec<Conflict> {
    let Some(value) = extract_json_array(raw) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let object = item.as_object()?;
            Some(Conflict {
                chunk_a: object.get("chunk_a")?.as_i64()?,
                chunk_b: object.get("chunk_b")?.as_i64()?,
                topic: object
                    .get("topic")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                excerpt_a: object
                    .get("excerpt_a")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                excerpt_b: object
                    .get("excerpt_b")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

// ------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------

fn extract_json_array(raw: &str) -> Option<serde_json::Value> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn excerpt(text: &str, limit: usize) -> &str {
    &text[..floor_char_boundary(text, limit.min(text.len()))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_parsing_clamps_and_fails_open() {
        assert_eq!(parse_score_array("[9, 8, 3, 7]", 4), vec![9, 8, 3, 7]);
        assert_eq!(parse_score_array("scores: [12, -3]", 2), vec![10, 0]);
        // short array pads with 10, long array truncates
        assert_eq!(parse_score_array("[5]", 3), vec![5, 10, 10]);
        assert_eq!(parse_score_array("[1, 2, 3, 4]", 2), vec![1, 2]);
        // garbage fails open
        assert_eq!(parse_score_array("no json here", 3), vec![10, 10, 10]);
        assert_eq!(parse_score_array("[\"a\", 4]", 2), vec![10, 4]);
    }

    #[test]
    fn conflict_parsing_tolerates_prose_and_garbage() {
        let raw = r#"Here are the conflicts:
        [{"chunk_a": 3, "chunk_b": 9, "topic": "operating temperature",
          "excerpt_a": "rated to 60C", "excerpt_b": "rated to 85C"}]"#;
        let conflicts = parse_conflicts(raw);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].chunk_a, 3);
        assert_eq!(conflicts[0].chunk_b, 9);
        assert_eq!(conflicts[0].topic, "operating temperature");

        assert!(parse_conflicts("[]").is_empty());
        assert!(parse_conflicts("total nonsense").is_empty());
        // entries missing required ids are dropped
        assert!(parse_conflicts(r#"[{"topic": "x"}]"#).is_empty());
    }
}

//! Query command: run retrieval and show the fused ranking.

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::llm::Gateway;
use crate::retrieve::retrieve;
use crate::store::Repository;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub chunk_id: i64,
    pub rrf_score: f64,
    pub dense_rank: Option<usize>,
    pub bm25_rank: Option<usize>,
    pub source_path: String,
    pub ordinal: i64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub mode: String,
    pub hyde_fell_back: bool,
    pub hits: Vec<QueryHit>,
}

pub async fn cmd_query(
    config: &Config,
    repo: &Repository,
    gateway: &dyn Gateway,
    query: &str,
    options: QueryOptions,
) -> Result<QueryReport> {
    let mut effective = config.clone();
    if let Some(top_k) = options.top_k {
        effective.retrieval.top_k = top_k;
    }
    if let Some(mode) = options.mode {
        effective.retrieval.mode = mode;
    }

    let outcome = retrieve(query, repo, gateway, &effective).await?;

    let mut hits = Vec::with_capacity(outcome.chunks.len());
    for scored in &outcome.chunks {
        let source_path = repo
            .get_source(&scored.chunk.source_id)?
            .map(|s| s.path)
            .unwrap_or_else(|| scored.chunk.source_id.clone());
        hits.push(QueryHit {
            chunk_id: scored.chunk.id,
            rrf_score: scored.rrf_score,
            dense_rank: scored.dense_rank,
            bm25_rank: scored.bm25_rank,
            source_path,
            ordinal: scored.chunk.ordinal,
            preview: preview(&scored.chunk.text),
        });
    }

    Ok(QueryReport {
        query: query.to_string(),
        mode: effective.retrieval.mode.clone(),
        hyde_fell_back: outcome.hyde_fell_back,
        hits,
    })
}

fn preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = flattened.len().min(200);
    while end > 0 && !flattened.is_char_boundary(end) {
        end -= 1;
    }
    if end < flattened.len() {
        format!("{}…", &flattened[..end])
    } else {
        flattened
    }
}

pub fn print_query_results(report: &QueryReport) {
    println!("Query: {} ({} mode)", report.query, report.mode);
    if report.hyde_fell_back {
        println!("  note: HyDE expansion failed; the raw query was embedded");
    }
    if report.hits.is_empty() {
        println!("  no results");
        return;
    }
    for (i, hit) in report.hits.iter().enumerate() {
        let channels = match (hit.dense_rank, hit.bm25_rank) {
            (Some(d), Some(b)) => format!("dense #{d}, bm25 #{b}"),
            (Some(d), None) => format!("dense #{d}"),
            (None, Some(b)) => format!("bm25 #{b}"),
            (None, None) => String::new(),
        };
        println!(
            "{}. [{:.4}] {} §chunk {} ({channels})",
            i + 1,
            hit.rrf_score,
            hit.source_path,
            hit.ordinal
        );
        println!("   {}", hit.preview);
    }
}

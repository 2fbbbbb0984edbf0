//! Status command: store counts and active model configuration.

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::store::Repository;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub db_file: String,
    pub sources: usize,
    pub chunks: usize,
    pub fts_rows: usize,
    pub summaries: usize,
    pub vec_indices: Vec<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub retrieval_mode: String,
}

pub fn cmd_status(config: &Config, repo: &Repository) -> Result<StatusReport> {
    Ok(StatusReport {
        db_file: config.paths.db_file.display().to_string(),
        sources: repo.count_sources()?,
        chunks: repo.count_chunks()?,
        fts_rows: repo.count_fts()?,
        summaries: repo.count_summaries()?,
        vec_indices: repo.list_vec_indices()?,
        embedding_model: config.embedding.model.clone(),
        generation_model: config.generation.model.clone(),
        retrieval_mode: config.retrieval.mode.clone(),
    })
}

pub fn print_status(report: &StatusReport) {
    println!("Store: {}", report.db_file);
    println!("  sources:   {}", report.sources);
    println!("  chunks:    {}", report.chunks);
    println!("  fts rows:  {}", report.fts_rows);
    println!("  summaries: {}", report.summaries);
    if report.vec_indices.is_empty() {
        println!("  vector indices: none (run 'archivist ingest')");
    } else {
        println!("  vector indices: {}", report.vec_indices.join(", "));
    }
    println!("Models:");
    println!("  embedding:  {}", report.embedding_model);
    println!("  generation: {}", report.generation_model);
    println!("  retrieval:  {} mode", report.retrieval_mode);
}

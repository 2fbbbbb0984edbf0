//! Remove command: purge a source and every dependent row.

use serde::Serialize;

use crate::error::Result;
use crate::store::Repository;

#[derive(Debug, Clone, Serialize)]
pub struct RemoveReport {
    pub path: String,
    pub chunks: usize,
    pub fts_rows: usize,
    pub vec_rows: usize,
}

pub fn cmd_remove(repo: &Repository, path: &str) -> Result<RemoveReport> {
    let stats = repo.purge_source(path)?;
    Ok(RemoveReport {
        path: path.to_string(),
        chunks: stats.chunks,
        fts_rows: stats.fts_rows,
        vec_rows: stats.vec_rows,
    })
}

pub fn print_remove_report(report: &RemoveReport) {
    println!("Removed '{}'", report.path);
    println!(
        "  purged {} chunks, {} fts rows, {} vector rows",
        report.chunks, report.fts_rows, report.vec_rows
    );
    println!("  note: existing generated documents may still cite this source");
}

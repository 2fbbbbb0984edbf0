//! Sources command: list the provenance records.

use crate::error::Result;
use crate::models::Source;
use crate::store::Repository;

pub fn cmd_list_sources(repo: &Repository) -> Result<Vec<Source>> {
    repo.list_sources()
}

pub fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        println!("No sources ingested yet. Run 'archivist ingest <path>'.");
        return;
    }
    for source in sources {
        println!(
            "{}  {}  {}  ({})",
            &source.content_hash[..source.content_hash.len().min(12)],
            source.ingested_at,
            source.path,
            source.embedding_model
        );
    }
}

//! Repository: the single data-access surface over the project store.
//!
//! Invariants enforced here: vector and full-text writes are rejected for
//! unknown chunk ids; replacing a source and purging a source are single
//! transactions, so observers see either the old revision in full or the
//! new one; chunk text is never mutated after insert.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::vectors::{encode_vector, model_slug, parse_vec0_dimension, vec_table_name};
use super::Store;
use crate::error::{Error, Result};
use crate::models::{Chunk, Source};

/// A chunk ready for commit: draft fields plus its generated context prefix.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub ordinal: i64,
    pub text: String,
    pub context_prefix: String,
    pub metadata: serde_json::Value,
}

impl PreparedChunk {
    /// Text stored in the full-text index and embedded at ingest.
    pub fn indexed_text(&self) -> String {
        if self.context_prefix.trim().is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", self.context_prefix, self.text)
        }
    }
}

/// Outcome of a [`Repository::commit_source`] call.
#[derive(Debug, Clone, Copy)]
pub struct CommitStats {
    pub chunks: usize,
    /// True when an older revision of the same path was purged first.
    pub replaced: bool,
}

/// Outcome of a [`Repository::purge_source`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeStats {
    pub chunks: usize,
    pub fts_rows: usize,
    pub vec_rows: usize,
}

/// Data access layer for sources, chunks, the FTS index, per-model vector
/// indices, and source summaries.
pub struct Repository {
    store: Store,
}

impl Repository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn open(path: &std::path::Path) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    fn conn(&self) -> &Connection {
        &self.store.conn
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    pub fn find_source_by_path(&self, path: &str) -> Result<Option<Source>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, path, content_hash, embedding_model, ingested_at
                 FROM sources WHERE path = ?1",
                [path],
                row_to_source,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, path, content_hash, embedding_model, ingested_at
                 FROM sources WHERE id = ?1",
                [id],
                row_to_source,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, path, content_hash, embedding_model, ingested_at
             FROM sources ORDER BY ingested_at, path",
        )?;
        let rows = stmt.query_map([], row_to_source)?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    // ------------------------------------------------------------------
    // Per-model vector indices
    // ------------------------------------------------------------------

    /// Create the vec table for *model* if it does not exist. A dimension
    /// mismatch against an existing table is fatal.
    pub fn ensure_vec_index(&self, model: &str, dimension: usize) -> Result<String> {
        if dimension == 0 {
            return Err(Error::StoreIntegrity(
                "embedding dimension must be at least 1".to_string(),
            ));
        }
        let table = vec_table_name(&model_slug(model))?;

        if let Some(create_sql) = self.table_sql(&table)? {
            match parse_vec0_dimension(&create_sql) {
                Some(existing) if existing == dimension => return Ok(table),
                Some(existing) => {
                    return Err(Error::StoreIntegrity(format!(
                        "vector index {table} stores {existing}-dimensional embeddings but \
                         '{model}' produced {dimension} dimensions; purge and re-ingest the \
                         affected sources"
                    )))
                }
                None => {
                    return Err(Error::StoreIntegrity(format!(
                        "table {table} exists but is not a vec0 index"
                    )))
                }
            }
        }

        debug!(table, dimension, "creating vector index");
        self.conn().execute_batch(&format!(
            "CREATE VIRTUAL TABLE {table} USING vec0(embedding float[{dimension}])"
        ))?;
        Ok(table)
    }

    pub fn vec_index_exists(&self, model: &str) -> Result<bool> {
        let table = vec_table_name(&model_slug(model))?;
        Ok(self.table_sql(&table)?.is_some())
    }

    /// Names of every per-model vector index present in the store.
    pub fn list_vec_indices(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name LIKE 'vec_chunks_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let sql = self
            .conn()
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(sql)
    }

    // ------------------------------------------------------------------
    // Chunk writes
    // ------------------------------------------------------------------

    /// Insert a batch of chunks for one source in a single transaction.
    /// Returns the assigned integer ids in input order.
    pub fn insert_chunks(&self, source_id: &str, chunks: &[PreparedChunk]) -> Result<Vec<i64>> {
        let tx = self.conn().unchecked_transaction()?;
        let ids = insert_chunk_rows(&tx, source_id, chunks)?;
        tx.commit()?;
        Ok(ids)
    }

    /// Insert one embedding into the index for *model*. The chunk id must
    /// already exist.
    pub fn insert_embedding(&self, model: &str, chunk_id: i64, vector: &[f32]) -> Result<()> {
        self.require_chunk(chunk_id)?;
        let table = vec_table_name(&model_slug(model))?;
        if self.table_sql(&table)?.is_none() {
            return Err(Error::SchemaMismatch {
                model: model.to_string(),
            });
        }
        self.conn().execute(
            &format!("INSERT INTO {table}(rowid, embedding) VALUES (?1, ?2)"),
            params![chunk_id, encode_vector(vector)],
        )?;
        Ok(())
    }

    /// Insert one full-text row. The chunk id must already exist.
    pub fn insert_fts(&self, chunk_id: i64, text: &str) -> Result<()> {
        self.require_chunk(chunk_id)?;
        self.conn().execute(
            "INSERT INTO chunks_fts(rowid, content) VALUES (?1, ?2)",
            params![chunk_id, text],
        )?;
        Ok(())
    }

    fn require_chunk(&self, chunk_id: i64) -> Result<()> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM chunks WHERE id = ?1)",
            [chunk_id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(Error::StoreIntegrity(format!(
                "chunk {chunk_id} does not exist; refusing orphan index row"
            )))
        }
    }

    // ------------------------------------------------------------------
    // Unit of work
    // ------------------------------------------------------------------

    /// Persist a fully prepared source in one transaction: source row,
    /// chunks, FTS rows, vector rows, and summary. If a source already
    /// exists at the same path its dependents are purged inside the same
    /// transaction, so no observer ever sees partial state.
    ///
    /// The vector index for `source.embedding_model` must already exist
    /// (see [`Repository::ensure_vec_index`]).
    pub fn commit_source(
        &self,
        source: &Source,
        chunks: &[PreparedChunk],
        embeddings: &[Vec<f32>],
        summary: &str,
    ) -> Result<CommitStats> {
        if chunks.len() != embeddings.len() {
            return Err(Error::StoreIntegrity(format!(
                "{} chunks but {} embeddings for source '{}'",
                chunks.len(),
                embeddings.len(),
                source.path
            )));
        }
        let vec_table = vec_table_name(&model_slug(&source.embedding_model))?;
        if self.table_sql(&vec_table)?.is_none() {
            return Err(Error::SchemaMismatch {
                model: source.embedding_model.clone(),
            });
        }

        let tx = self.conn().unchecked_transaction()?;

        let replaced = if let Some(old_id) = existing_source_id(&tx, &source.path)? {
            purge_dependents(&tx, &old_id)?;
            tx.execute("DELETE FROM sources WHERE id = ?1", [&old_id])?;
            true
        } else {
            false
        };

        tx.execute(
            "INSERT INTO sources (id, path, content_hash, embedding_model)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source.id,
                source.path,
                source.content_hash,
                source.embedding_model
            ],
        )?;

        let ids = insert_chunk_rows(&tx, &source.id, chunks)?;

        {
            let mut fts = tx.prepare("INSERT INTO chunks_fts(rowid, content) VALUES (?1, ?2)")?;
            let mut vec = tx.prepare(&format!(
                "INSERT INTO {vec_table}(rowid, embedding) VALUES (?1, ?2)"
            ))?;
            for ((id, chunk), embedding) in ids.iter().zip(chunks).zip(embeddings) {
                fts.execute(params![id, chunk.indexed_text()])?;
                vec.execute(params![id, encode_vector(embedding)])?;
            }
        }

        tx.execute(
            "INSERT INTO source_summaries (source_id, summary_text) VALUES (?1, ?2)
             ON CONFLICT(source_id) DO UPDATE SET
                 summary_text = excluded.summary_text,
                 generated_at = datetime('now')",
            params![source.id, summary],
        )?;

        tx.commit()?;
        debug!(path = %source.path, chunks = chunks.len(), replaced, "committed source");
        Ok(CommitStats {
            chunks: chunks.len(),
            replaced,
        })
    }

    /// Remove a source and every dependent row in one transaction.
    pub fn purge_source(&self, path: &str) -> Result<PurgeStats> {
        let tx = self.conn().unchecked_transaction()?;
        let Some(id) = existing_source_id(&tx, path)? else {
            return Err(Error::SourceNotFound(path.to_string()));
        };
        let stats = purge_dependents(&tx, &id)?;
        tx.execute("DELETE FROM sources WHERE id = ?1", [&id])?;
        tx.commit()?;
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// BM25 search over the full-text index. Returns `(chunk_id, score)`
    /// pairs, best first (bm25() scores are negative; lower is better).
    pub fn search_bm25(&self, query: &str, top_k: usize) -> Result<Vec<(i64, f64)>> {
        // FTS5 MATCH treats punctuation as syntax; strip it.
        let sanitized: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        if sanitized.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(
            "SELECT rowid, bm25(chunks_fts) AS score
             FROM chunks_fts WHERE chunks_fts MATCH ?1
             ORDER BY score LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitized.trim(), top_k as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Nearest-neighbour search in the index for *model*. Returns
    /// `(chunk_id, distance)` pairs, nearest first.
    pub fn search_vec(
        &self,
        model: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(i64, f64)>> {
        let table = vec_table_name(&model_slug(model))?;
        if self.table_sql(&table)?.is_none() {
            return Err(Error::SchemaMismatch {
                model: model.to_string(),
            });
        }

        // vec0 MATCH errors on an empty table.
        let has_rows: bool = self.conn().query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {table} LIMIT 1)"),
            [],
            |row| row.get(0),
        )?;
        if !has_rows {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(&format!(
            "SELECT rowid, distance FROM {table}
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance"
        ))?;
        let rows = stmt.query_map(
            params![encode_vector(query_vector), top_k as i64],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Hydrate chunk records by id, preserving input order. A missing id is
    /// an integrity violation (the indices must never outlive their chunks).
    pub fn get_chunks(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, source_id, ordinal, text, context_prefix, metadata, created_at
             FROM chunks WHERE id = ?1",
        )?;
        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            let chunk = stmt.query_row([id], row_to_chunk).optional()?;
            match chunk {
                Some(chunk) => chunks.push(chunk),
                None => {
                    return Err(Error::StoreIntegrity(format!(
                        "index row references missing chunk {id}"
                    )))
                }
            }
        }
        Ok(chunks)
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    pub fn upsert_summary(&self, source_id: &str, summary_text: &str) -> Result<()> {
        let updated = self.conn().execute(
            "INSERT INTO source_summaries (source_id, summary_text) VALUES (?1, ?2)
             ON CONFLICT(source_id) DO UPDATE SET
                 summary_text = excluded.summary_text,
                 generated_at = datetime('now')",
            params![source_id, summary_text],
        );
        match updated {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::StoreIntegrity(format!(
                    "summary references missing source {source_id}: {}",
                    msg.unwrap_or_default()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_summary(&self, source_id: &str) -> Result<Option<String>> {
        let row = self
            .conn()
            .query_row(
                "SELECT summary_text FROM source_summaries WHERE source_id = ?1",
                [source_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(row)
    }

    /// All summaries joined with their source path, newest first.
    pub fn list_summaries(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn().prepare(
            "SELECT s.path, ss.summary_text
             FROM source_summaries ss JOIN sources s ON s.id = ss.source_id
             ORDER BY ss.generated_at DESC, s.path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    // ------------------------------------------------------------------
    // Counts (status output and invariants)
    // ------------------------------------------------------------------

    pub fn count_sources(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM sources")
    }

    pub fn count_chunks(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM chunks")
    }

    pub fn count_chunks_for(&self, source_id: &str) -> Result<usize> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chunks WHERE source_id = ?1",
            [source_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn count_fts(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM chunks_fts")
    }

    pub fn count_vec(&self, model: &str) -> Result<usize> {
        let table = vec_table_name(&model_slug(model))?;
        if self.table_sql(&table)?.is_none() {
            return Ok(0);
        }
        self.count(&format!("SELECT COUNT(*) FROM {table}"))
    }

    pub fn count_summaries(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM source_summaries")
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

// ------------------------------------------------------------------
// Transaction helpers
// ------------------------------------------------------------------

fn existing_source_id(conn: &Connection, path: &str) -> Result<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM sources WHERE path = ?1", [path], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(id)
}

fn insert_chunk_rows(
    conn: &Connection,
    source_id: &str,
    chunks: &[PreparedChunk],
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "INSERT INTO chunks (source_id, ordinal, text, context_prefix, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        stmt.execute(params![
            source_id,
            chunk.ordinal,
            chunk.text,
            chunk.context_prefix,
            chunk.metadata.to_string(),
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

/// Delete every chunk-scoped row for *source_id*: FTS rows, rows in every
/// vector index, the chunks themselves, and the summary.
fn purge_dependents(conn: &Connection, source_id: &str) -> Result<PurgeStats> {
    let mut stats = PurgeStats::default();

    let chunk_ids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT id FROM chunks WHERE source_id = ?1")?;
        let rows = stmt.query_map([source_id], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        ids
    };

    if !chunk_ids.is_empty() {
        let placeholders = vec!["?"; chunk_ids.len()].join(",");
        let id_params = rusqlite::params_from_iter(chunk_ids.iter());
        stats.fts_rows = conn.execute(
            &format!("DELETE FROM chunks_fts WHERE rowid IN ({placeholders})"),
            id_params,
        )?;

        let vec_tables: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name LIKE 'vec_chunks_%'",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut names = Vec::new();
            for row in rows {
                names.push(row?);
            }
            names
        };
        for table in vec_tables {
            stats.vec_rows += conn.execute(
                &format!("DELETE FROM {table} WHERE rowid IN ({placeholders})"),
                rusqlite::params_from_iter(chunk_ids.iter()),
            )?;
        }
    }

    stats.chunks = conn.execute("DELETE FROM chunks WHERE source_id = ?1", [source_id])?;
    conn.execute(
        "DELETE FROM source_summaries WHERE source_id = ?1",
        [source_id],
    )?;

    Ok(stats)
}

// ------------------------------------------------------------------
// Row mapping
// ------------------------------------------------------------------

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        path: row.get(1)?,
        content_hash: row.get(2)?,
        embedding_model: row.get(3)?,
        ingested_at: row.get(4)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let metadata: String = row.get(5)?;
    Ok(Chunk {
        id: row.get(0)?,
        source_id: row.get(1)?,
        ordinal: row.get(2)?,
        text: row.get(3)?,
        context_prefix: row.get(4)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get(6)?,
    })
}

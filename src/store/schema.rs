//! Schema migrations for the project store.
//!
//! The migration list is append-only and forward-only. The runner applies
//! every migration whose version exceeds the recorded maximum, one
//! transaction per migration, and records each application in
//! `schema_version`. Running it twice is a no-op.
//!
//! `vec_chunks_*` virtual tables are NOT migration-managed; they are created
//! on demand when an embedding model is first seen (see `vectors`).

use rusqlite::Connection;

use crate::error::Result;

const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER NOT NULL,
    applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
)";

const V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS sources (
    id              TEXT PRIMARY KEY,
    path            TEXT NOT NULL,
    content_hash    TEXT NOT NULL,
    embedding_model TEXT NOT NULL,
    ingested_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS chunks (
    id              INTEGER PRIMARY KEY,
    source_id       TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    ordinal         INTEGER NOT NULL,
    text            TEXT NOT NULL,
    context_prefix  TEXT NOT NULL DEFAULT '',
    metadata        TEXT NOT NULL DEFAULT '{}',
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(source_id, ordinal)
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(content, tokenize='porter ascii');

CREATE TABLE IF NOT EXISTS source_summaries (
    source_id       TEXT PRIMARY KEY REFERENCES sources(id) ON DELETE CASCADE,
    summary_text    TEXT NOT NULL,
    generated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// Append-only: (version, statements).
pub const MIGRATIONS: &[(i64, &str)] = &[(1, V1_SQL)];

/// Apply all pending migrations in ascending version order. Idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(CREATE_SCHEMA_VERSION, [])?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for (version, sql) in MIGRATIONS {
        if *version > current {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
        }
    }

    Ok(())
}

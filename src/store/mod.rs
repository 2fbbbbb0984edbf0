//! Knowledge store: one SQLite file per project, with FTS5 and sqlite-vec.
//!
//! All reads and writes go through [`Repository`]; no SQL lives outside
//! this module. Connections are single-writer per process.

pub mod schema;
mod repository;
pub mod vectors;

pub use repository::{CommitStats, PreparedChunk, PurgeStats, Repository};

use std::path::Path;
use std::sync::Once;

use rusqlite::Connection;

use crate::error::Result;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto extension so every subsequent connection
/// gets the vec0 module.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| {
        // SAFETY: sqlite3_vec_init is the extension entry point exported by
        // the sqlite-vec crate; sqlite3_auto_extension expects the SQLite
        // extension init signature. This is the documented registration
        // pattern for the crate.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// An open project store with the schema migrated to the current version.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (or create) the store at *path* and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }
}

//! Domain records shared across the store, retriever, and assembler.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// A registered provenance record. One row per ingested revision of a path.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// Opaque stable identifier (UUID v4, assigned at ingest).
    pub id: String,
    /// Canonical path or URL the source was ingested from.
    pub path: String,
    /// SHA-256 hex digest of the raw bytes.
    pub content_hash: String,
    /// Embedding model (provider/model) used at ingest.
    pub embedding_model: String,
    /// UTC timestamp of the ingest commit.
    pub ingested_at: String,
}

/// A stored fragment of a source. The integer id keys both the FTS and
/// vector virtual tables; the text column is never mutated after insert.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub source_id: String,
    /// Position within the source, contiguous from 0.
    pub ordinal: i64,
    /// Verbatim chunk text.
    pub text: String,
    /// Model-generated situating sentence, empty when generation failed.
    pub context_prefix: String,
    /// Type-specific metadata (heading trail, page, commit hash, ...).
    pub metadata: serde_json::Value,
    pub created_at: String,
}

impl Chunk {
    /// Text as stored in the full-text index and embedded at ingest.
    pub fn indexed_text(&self) -> String {
        if self.context_prefix.trim().is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", self.context_prefix, self.text)
        }
    }

    /// Short human label used for footnote attribution, e.g.
    /// `notes.md §Installation` or `repo.git §commit 1a2b3c4`.
    pub fn attribution_label(&self, source_path: &str) -> String {
        let name = Path::new(source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.to_string());

        let detail = if let Some(heading) = self.metadata.get("heading").and_then(|v| v.as_str()) {
            heading.to_string()
        } else if let Some(commit) = self.metadata.get("commit").and_then(|v| v.as_str()) {
            format!("commit {}", &commit[..commit.len().min(10)])
        } else if let Some(chapter) = self.metadata.get("chapter").and_then(|v| v.as_i64()) {
            format!("chapter {chapter}")
        } else {
            format!("chunk {}", self.ordinal)
        };

        format!("{name} §{detail}")
    }
}

/// A chunk produced by a chunker, before it has a database identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub ordinal: usize,
    pub text: String,
    pub metadata: serde_json::Value,
}

impl ChunkDraft {
    pub fn new(ordinal: usize, text: String) -> Self {
        Self {
            ordinal,
            text,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(ordinal: usize, text: String, metadata: serde_json::Value) -> Self {
        Self {
            ordinal,
            text,
            metadata,
        }
    }
}

/// Source family, detected from URL scheme / extension / repository layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Markdown,
    Pdf,
    Epub,
    PlainText,
    Json,
    Git,
    Web,
    Audio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Markdown => "markdown",
            SourceKind::Pdf => "pdf",
            SourceKind::Epub => "epub",
            SourceKind::PlainText => "plaintext",
            SourceKind::Json => "json",
            SourceKind::Git => "git",
            SourceKind::Web => "web",
            SourceKind::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// A retrieved chunk together with its fusion score and per-channel ranks.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Reciprocal Rank Fusion score (higher = better).
    pub rrf_score: f64,
    /// 1-based rank in the dense channel, if retrieved there.
    pub dense_rank: Option<usize>,
    /// 1-based rank in the BM25 channel, if retrieved there.
    pub bm25_rank: Option<usize>,
}

/// A factual contradiction between two chunks, reported but never blocking.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub chunk_a: i64,
    pub chunk_b: i64,
    pub topic: String,
    pub excerpt_a: String,
    pub excerpt_b: String,
}

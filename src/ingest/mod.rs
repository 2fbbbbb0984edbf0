//! Ingest orchestrator.
//!
//! Drives one source through: path validation → digest → dedup decision →
//! chunking → cost preview → context prefixes → embeddings → summary →
//! a single-transaction commit. Interruption anywhere before the commit
//! leaves the store untouched; a prior partial or stale revision of the
//! same path is purged inside the commit transaction.
//!
//! There is no checkpointing by design: content digest + purge-on-replace
//! is the recovery mechanism.

mod prefix;
mod summary;

pub use prefix::generate_prefixes;
pub use summary::generate_summary;

use std::path::{Component, Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::{self, audio, epub, git, json, markdown, pdf, plaintext, web};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{is_cheap_tier, tokens::approx_tokens, Gateway};
use crate::models::{ChunkDraft, Source, SourceKind};
use crate::store::{PreparedChunk, Repository};

/// Caller-facing knobs for one ingest run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Chunk and report, but write nothing and call no model.
    pub dry_run: bool,
    /// Skip the cost-preview confirmation.
    pub assume_yes: bool,
}

/// What the cost-preview confirmation is asked about.
#[derive(Debug, Clone)]
pub struct CostPreview {
    pub kind: SourceKind,
    pub chunks: usize,
    pub total_tokens: usize,
    /// LLM calls this ingest will issue: one prefix and one embedding per
    /// chunk, plus one summary.
    pub estimated_llm_calls: usize,
    /// Set when the context model is not a recognised cheap tier.
    pub expensive_context_model: Option<String>,
}

/// Outcome of ingesting a single source.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// `(path, digest)` already present; nothing done, no model calls.
    Skipped { path: String, chunks: usize },
    /// Dry run: chunked only.
    DryRun { path: String, chunks: usize },
    /// The caller declined the cost preview.
    Declined { path: String },
    /// The source produced no chunks; nothing stored.
    Empty { path: String },
    Ingested {
        path: String,
        chunks: usize,
        replaced: bool,
        llm_calls: usize,
    },
}

/// Ingest one source path or URL.
pub async fn ingest_source(
    repo: &Repository,
    gateway: &dyn Gateway,
    config: &Config,
    raw: &str,
    options: IngestOptions,
    confirm: &dyn Fn(&CostPreview) -> bool,
) -> Result<IngestOutcome> {
    // Path validation precedes everything else for local sources; a
    // traversal attempt must fail before any read or store access.
    let (kind, identity) = identify(config, raw)?;
    debug!(path = %identity.canonical, %kind, "ingesting source");

    // Dedup before any chunking or model call.
    if let Some(existing) = repo.find_source_by_path(&identity.canonical)? {
        if existing.content_hash == identity.digest {
            let chunks = repo.count_chunks_for(&existing.id)?;
            if chunks > 0 {
                info!(path = %identity.canonical, chunks, "unchanged, skipping");
                return Ok(IngestOutcome::Skipped {
                    path: identity.canonical,
                    chunks,
                });
            }
            // Same digest but no chunks: an interrupted run left a record
            // the commit transaction will replace.
            info!(path = %identity.canonical, "recovering interrupted ingest");
        } else {
            info!(path = %identity.canonical, "content changed, re-ingesting");
        }
    }

    let drafts = run_chunker(kind, &identity, config, gateway).await?;
    if drafts.is_empty() {
        return Ok(IngestOutcome::Empty {
            path: identity.canonical,
        });
    }

    if options.dry_run {
        return Ok(IngestOutcome::DryRun {
            path: identity.canonical,
            chunks: drafts.len(),
        });
    }

    let preview = CostPreview {
        kind,
        chunks: drafts.len(),
        total_tokens: drafts.iter().map(|d| approx_tokens(&d.text)).sum(),
        estimated_llm_calls: drafts.len() * 2 + 1,
        expensive_context_model: (!is_cheap_tier(&config.embedding.context_model))
            .then(|| config.embedding.context_model.clone()),
    };
    if !options.assume_yes && !confirm(&preview) {
        return Ok(IngestOutcome::Declined {
            path: identity.canonical,
        });
    }

    gateway.validate_credentials(&config.embedding.model)?;
    gateway.validate_credentials(&config.embedding.context_model)?;
    gateway.validate_credentials(&config.ingest.summary_model)?;

    // Context prefixes (a failed call degrades to an empty prefix).
    let prefixes = generate_prefixes(
        gateway,
        &config.embedding.context_model,
        &drafts,
        config.ingest.fan_out,
    )
    .await?;

    let prepared: Vec<PreparedChunk> = drafts
        .iter()
        .zip(&prefixes)
        .map(|(draft, prefix)| PreparedChunk {
            ordinal: draft.ordinal as i64,
            text: draft.text.clone(),
            context_prefix: prefix.clone(),
            metadata: draft.metadata.clone(),
        })
        .collect();

    // Embeddings of prefix + text; any failure is fatal for this source.
    let embeddings = embed_chunks(
        gateway,
        &config.embedding.model,
        &prepared,
        config.ingest.fan_out,
    )
    .await?;

    let full_text: String = drafts
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let summary = generate_summary(
        gateway,
        &config.ingest.summary_model,
        config.ingest.summary_max_tokens,
        &full_text,
    )
    .await?;

    let dimension = embeddings.first().map(|v| v.len()).unwrap_or(0);
    repo.ensure_vec_index(&config.embedding.model, dimension)?;

    let source = Source {
        id: Uuid::new_v4().to_string(),
        path: identity.canonical.clone(),
        content_hash: identity.digest.clone(),
        embedding_model: config.embedding.model.clone(),
        ingested_at: String::new(),
    };
    let stats = repo.commit_source(&source, &prepared, &embeddings, &summary)?;

    info!(
        path = %identity.canonical,
        chunks = stats.chunks,
        replaced = stats.replaced,
        "source committed"
    );
    Ok(IngestOutcome::Ingested {
        path: identity.canonical,
        chunks: stats.chunks,
        replaced: stats.replaced,
        llm_calls: preview.estimated_llm_calls,
    })
}

async fn embed_chunks(
    gateway: &dyn Gateway,
    model: &str,
    prepared: &[PreparedChunk],
    fan_out: usize,
) -> Result<Vec<Vec<f32>>> {
    let results: Vec<Result<Vec<f32>>> =
        futures::stream::iter(prepared.iter().map(|chunk| {
            let text = chunk.indexed_text();
            async move { gateway.embed(model, &text).await }
        }))
        .buffered(fan_out.max(1))
        .collect()
        .await;
    results.into_iter().collect()
}

// ------------------------------------------------------------------
// Source identity: canonical path + content digest
// ------------------------------------------------------------------

struct SourceIdentity {
    /// Stable key for the sources table: project-relative path for local
    /// files, the URL itself for remote sources.
    canonical: String,
    /// SHA-256 hex digest of the raw bytes (the URL string for remotes).
    digest: String,
    /// Filesystem location for local kinds.
    resolved: Option<PathBuf>,
}

fn is_remote_source(raw: &str) -> bool {
    raw.starts_with("https://") || raw.starts_with("http://") || raw.starts_with("git@")
}

fn identify(config: &Config, raw: &str) -> Result<(SourceKind, SourceIdentity)> {
    if is_remote_source(raw) {
        let kind = chunk::detect_kind(raw)?;
        // Remote sources are fingerprinted by their URL string.
        return Ok((
            kind,
            SourceIdentity {
                canonical: raw.to_string(),
                digest: sha256_hex(raw.as_bytes()),
                resolved: None,
            },
        ));
    }

    let resolved = resolve_source_path(&config.paths.project_root, raw)?;
    let kind = chunk::detect_kind(&resolved.to_string_lossy())?;
    let digest = match kind {
        SourceKind::Git => hash_directory(&resolved)?,
        _ => sha256_file(&resolved)?,
    };
    Ok((
        kind,
        SourceIdentity {
            canonical: display_path(&config.paths.project_root, &resolved),
            digest,
            resolved: Some(resolved),
        },
    ))
}

/// Confine *raw* to the project root. Traversal outside the root is
/// rejected before anything is read.
pub fn resolve_source_path(project_root: &Path, raw: &str) -> Result<PathBuf> {
    let root = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let normalized = lexical_normalize(&joined);
    if !normalized.starts_with(&root) {
        return Err(Error::PathTraversal(raw.to_string()));
    }

    // Re-check through symlinks when the file exists.
    if let Ok(canonical) = normalized.canonicalize() {
        if !canonical.starts_with(&root) {
            return Err(Error::PathTraversal(raw.to_string()));
        }
        return Ok(canonical);
    }
    Ok(normalized)
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn display_path(project_root: &Path, resolved: &Path) -> String {
    let root = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    resolved
        .strip_prefix(&root)
        .unwrap_or(resolved)
        .to_string_lossy()
        .into_owned()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn sha256_file(path: &Path) -> Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 65_536];
    loop {
        let count = file.read(&mut buf)?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a local repository: sorted (name, size) pairs over the tree.
fn hash_directory(dir: &Path) -> Result<String> {
    let mut entries: Vec<(String, u64)> = Vec::new();
    collect_files(dir, &mut entries)?;
    entries.sort();
    let mut hasher = Sha256::new();
    for (name, size) in entries {
        hasher.update(name.as_bytes());
        hasher.update(size.to_le_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_files(dir: &Path, out: &mut Vec<(String, u64)>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_file() {
            out.push((
                path.to_string_lossy().into_owned(),
                entry.metadata()?.len(),
            ));
        } else if file_type.is_dir() {
            collect_files(&path, out)?;
        }
    }
    Ok(())
}

// ------------------------------------------------------------------
// Chunker dispatch
// ------------------------------------------------------------------

async fn run_chunker(
    kind: SourceKind,
    identity: &SourceIdentity,
    config: &Config,
    gateway: &dyn Gateway,
) -> Result<Vec<ChunkDraft>> {
    let policy = config.chunkers.for_kind(kind);
    match kind {
        SourceKind::Markdown => {
            let content = read_text(identity)?;
            Ok(markdown::chunk(
                &content,
                &policy,
                &config.chunkers.markdown.strategy,
            ))
        }
        SourceKind::PlainText => Ok(plaintext::chunk(&read_text(identity)?, &policy)),
        SourceKind::Json => Ok(json::chunk(&read_text(identity)?, &policy)),
        SourceKind::Pdf => pdf::chunk(require_path(identity)?, &policy),
        SourceKind::Epub => epub::chunk(require_path(identity)?, &policy),
        SourceKind::Audio => audio::chunk(require_path(identity)?, &policy, gateway).await,
        SourceKind::Git => {
            let target = match &identity.resolved {
                Some(path) => path.to_string_lossy().into_owned(),
                None => identity.canonical.clone(),
            };
            git::chunk(&target, &policy).await
        }
        SourceKind::Web => web::chunk(&identity.canonical, &policy).await,
    }
}

fn read_text(identity: &SourceIdentity) -> Result<String> {
    let path = require_path(identity)?;
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn require_path(identity: &SourceIdentity) -> Result<&Path> {
    identity
        .resolved
        .as_deref()
        .ok_or_else(|| Error::Other(format!("source '{}' has no local path", identity.canonical)))
}

//! Ingest command: expand directories, then drive each source through the
//! orchestrator.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::warn;

use crate::chunk::kind_for_extension;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{ingest_source, CostPreview, IngestOptions, IngestOutcome};
use crate::llm::Gateway;
use crate::store::Repository;

const MAX_SCAN_DEPTH: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct IngestCmdOptions {
    pub recursive: bool,
    pub exclude: Vec<String>,
    pub dry_run: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub empty: usize,
    pub declined: usize,
    pub chunks_written: usize,
    pub failures: Vec<(String, String)>,
}

pub async fn cmd_ingest(
    config: &Config,
    repo: &Repository,
    gateway: &dyn Gateway,
    sources: &[String],
    options: IngestCmdOptions,
) -> Result<IngestReport> {
    if sources.is_empty() {
        return Err(Error::Config(
            "no sources given; pass one or more paths or URLs".to_string(),
        ));
    }

    let excludes = build_globset(&options.exclude)?;
    let expanded = expand_sources(sources, options.recursive, &excludes)?;
    if expanded.is_empty() {
        return Err(Error::Config(
            "no supported files found in the given sources".to_string(),
        ));
    }

    let ingest_options = IngestOptions {
        dry_run: options.dry_run,
        assume_yes: options.assume_yes,
    };

    let mut report = IngestReport::default();
    for source in &expanded {
        let outcome = ingest_source(
            repo,
            gateway,
            config,
            source,
            ingest_options,
            &confirm_cost,
        )
        .await;
        match outcome {
            Ok(IngestOutcome::Ingested {
                chunks, replaced, ..
            }) => {
                report.ingested += 1;
                report.chunks_written += chunks;
                if replaced {
                    report.replaced += 1;
                }
            }
            Ok(IngestOutcome::Skipped { .. }) => report.skipped += 1,
            Ok(IngestOutcome::DryRun { path, chunks }) => {
                println!("{path}: {chunks} chunks (dry run)");
            }
            Ok(IngestOutcome::Empty { path }) => {
                warn!(path = %path, "source produced no chunks");
                report.empty += 1;
            }
            Ok(IngestOutcome::Declined { .. }) => report.declined += 1,
            Err(err) => {
                // One bad source does not abort the batch; the failure is
                // reported and the rest proceed.
                warn!(source = %source, error = %err, "ingest failed");
                report.failures.push((source.clone(), err.to_string()));
            }
        }
    }
    Ok(report)
}

fn confirm_cost(preview: &CostPreview) -> bool {
    eprintln!(
        "  {} chunks, ~{} tokens, {} LLM calls",
        preview.chunks, preview.total_tokens, preview.estimated_llm_calls
    );
    if let Some(model) = &preview.expensive_context_model {
        eprintln!(
            "  note: context model '{model}' is not a cheap tier; prefix generation may be \
             costly"
        );
    }
    super::confirm("  Proceed with embedding?", true)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid --exclude pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("could not compile exclude patterns: {e}")))
}

/// Expand directories into supported files; URLs and files pass through.
fn expand_sources(
    sources: &[String],
    recursive: bool,
    excludes: &GlobSet,
) -> Result<Vec<String>> {
    let mut expanded = Vec::new();
    for source in sources {
        if source.starts_with("https://")
            || source.starts_with("http://")
            || source.starts_with("git@")
        {
            expanded.push(source.clone());
            continue;
        }
        let path = Path::new(source);
        if path.is_dir() && !path.join(".git").exists() {
            let mut files = Vec::new();
            scan_dir(path, recursive, excludes, 0, &mut files)?;
            files.sort();
            expanded.extend(files.into_iter().map(|p| p.to_string_lossy().into_owned()));
        } else {
            expanded.push(source.clone());
        }
    }
    Ok(expanded)
}

fn scan_dir(
    dir: &Path,
    recursive: bool,
    excludes: &GlobSet,
    depth: usize,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    if depth > MAX_SCAN_DEPTH {
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        if excludes.is_match(name.as_os_str()) || excludes.is_match(&path) {
            continue;
        }
        if path.is_file() {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if kind_for_extension(&ext).is_some() {
                out.push(path);
            }
        } else if path.is_dir() && recursive {
            scan_dir(&path, recursive, excludes, depth + 1, out)?;
        }
    }
    Ok(())
}

pub fn print_ingest_report(report: &IngestReport) {
    println!("Ingest complete");
    println!("  sources ingested: {}", report.ingested);
    if report.replaced > 0 {
        println!("  revisions replaced: {}", report.replaced);
    }
    println!("  chunks written: {}", report.chunks_written);
    println!("  unchanged (skipped): {}", report.skipped);
    if report.empty > 0 {
        println!("  empty sources: {}", report.empty);
    }
    if report.declined > 0 {
        println!("  declined: {}", report.declined);
    }
    for (source, error) in &report.failures {
        println!("  failed: {source}: {error}");
    }
}

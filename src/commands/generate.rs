//! Generate command: retrieval → assembly → prompt → generation →
//! attribution → atomic write.

use std::path::PathBuf;

use serde::Serialize;

use crate::assemble::{assemble, prompt::build_prompt};
use crate::config::Config;
use crate::error::Result;
use crate::generate::{
    add_attribution, generate_document, needs_overwrite_confirmation, validate_output_path,
    write_output,
};
use crate::llm::Gateway;
use crate::models::Conflict;
use crate::retrieve::retrieve;
use crate::store::Repository;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Opaque feature document included verbatim in the prompt.
    pub feature_spec: Option<PathBuf>,
    /// Stop after assembly and report what would be sent.
    pub dry_run: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub topic: String,
    pub output_path: String,
    pub candidates: usize,
    pub packed_chunks: usize,
    pub context_tokens: usize,
    pub conflicts: Vec<Conflict>,
    pub budget_warning: Option<String>,
    pub hyde_fell_back: bool,
    pub wrote_output: bool,
}

pub async fn cmd_generate(
    config: &Config,
    repo: &Repository,
    gateway: &dyn Gateway,
    topic: &str,
    output: &str,
    options: GenerateOptions,
) -> Result<GenerateReport> {
    // Validate the destination before any model spend.
    let output_path = validate_output_path(&config.paths.project_root, output)?;
    if !options.dry_run
        && needs_overwrite_confirmation(&output_path, options.assume_yes)
        && !super::confirm(
            &format!("File exists: {}. Overwrite?", output_path.display()),
            false,
        )
    {
        return Ok(GenerateReport {
            topic: topic.to_string(),
            output_path: output_path.display().to_string(),
            candidates: 0,
            packed_chunks: 0,
            context_tokens: 0,
            conflicts: Vec::new(),
            budget_warning: None,
            hyde_fell_back: false,
            wrote_output: false,
        });
    }

    let feature_spec = match &options.feature_spec {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };

    let retrieval = retrieve(topic, repo, gateway, config).await?;
    let candidates = retrieval.chunks.len();

    let context = assemble(topic, &retrieval.chunks, repo, gateway, config).await?;
    let prompt = build_prompt(topic, &context, feature_spec.as_deref(), gateway, config)?;

    let mut report = GenerateReport {
        topic: topic.to_string(),
        output_path: output_path.display().to_string(),
        candidates,
        packed_chunks: context.chunks.len(),
        context_tokens: context.context_tokens,
        conflicts: context.conflicts.clone(),
        budget_warning: prompt.budget_warning.clone(),
        hyde_fell_back: retrieval.hyde_fell_back,
        wrote_output: false,
    };

    if options.dry_run {
        return Ok(report);
    }

    let content = generate_document(gateway, &config.generation.model, &prompt).await?;
    let attributed = add_attribution(&content, &context);
    write_output(&output_path, &attributed)?;
    report.wrote_output = true;

    Ok(report)
}

pub fn print_generate_report(report: &GenerateReport) {
    println!("Topic: {}", report.topic);
    if report.hyde_fell_back {
        println!("  note: HyDE expansion failed; the raw query was embedded");
    }
    println!(
        "  retrieved {} candidates, packed {} chunks ({} tokens)",
        report.candidates, report.packed_chunks, report.context_tokens
    );
    if !report.conflicts.is_empty() {
        println!("  conflicts detected (generation proceeded; resolve via source hierarchy):");
        for conflict in &report.conflicts {
            println!(
                "    chunk {} vs chunk {}: {}",
                conflict.chunk_a, conflict.chunk_b, conflict.topic
            );
            println!(
                "      a: {}\n      b: {}",
                conflict.excerpt_a, conflict.excerpt_b
            );
        }
    }
    if let Some(warning) = &report.budget_warning {
        println!("  {warning}");
    }
    if report.wrote_output {
        println!("Written to {}", report.output_path);
    } else {
        println!("No output written");
    }
}

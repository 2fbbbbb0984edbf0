//! Generation driver: invoke the gateway with the assembled prompt, attach
//! footnote attributions, and write the document atomically.

use std::path::{Path, PathBuf};

use crate::assemble::prompt::PromptParts;
use crate::assemble::AssembledContext;
use crate::error::{Error, Result};
use crate::ingest::resolve_source_path;
use crate::llm::{ChatMessage, CompletionOptions, Gateway};

const GENERATION_MAX_TOKENS: u32 = 4_096;

/// Run the generation model over the assembled prompt.
pub async fn generate_document(
    gateway: &dyn Gateway,
    model: &str,
    prompt: &PromptParts,
) -> Result<String> {
    gateway.validate_credentials(model)?;
    let messages = [
        ChatMessage::system(prompt.system_prompt.clone()),
        ChatMessage::user(prompt.user_message.clone()),
    ];
    gateway
        .complete(
            model,
            &messages,
            CompletionOptions::with_max_tokens(GENERATION_MAX_TOKENS),
        )
        .await
}

/// Append the footnote attribution trailer: one `[^N]: source §detail` line
/// per packed chunk, in packing order. Footnote references already present
/// in the model output are left untouched.
pub fn add_attribution(content: &str, context: &AssembledContext) -> String {
    if context.chunks.is_empty() {
        return content.to_string();
    }

    let footnotes = context
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let path = context
                .source_paths
                .get(&chunk.source_id)
                .map(String::as_str)
                .unwrap_or(chunk.source_id.as_str());
            format!("[^{}]: {}", i + 1, chunk.attribution_label(path))
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\n---\n\n{}\n", content.trim_end(), footnotes)
}

/// Validate that the output path stays inside the project root.
pub fn validate_output_path(project_root: &Path, raw: &str) -> Result<PathBuf> {
    resolve_source_path(project_root, raw)
}

/// True when writing to *path* needs user confirmation.
pub fn needs_overwrite_confirmation(path: &Path, assume_yes: bool) -> bool {
    !assume_yes && path.exists()
}

/// Write atomically: temp file in the destination directory, then rename.
pub fn write_output(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("output path '{}' has no parent", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    use std::io::Write;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path)
        .map_err(|e| Error::Other(format!("could not persist '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use std::collections::HashMap;

    fn context_with_chunks() -> AssembledContext {
        let chunk = |id: i64, ordinal: i64| Chunk {
            id,
            source_id: "src-1".to_string(),
            ordinal,
            text: "text".to_string(),
            context_prefix: String::new(),
            metadata: serde_json::json!({}),
            created_at: String::new(),
        };
        let mut source_paths = HashMap::new();
        source_paths.insert("src-1".to_string(), "docs/manual.md".to_string());
        AssembledContext {
            chunks: vec![chunk(11, 0), chunk(12, 3)],
            source_paths,
            ..AssembledContext::default()
        }
    }

    #[test]
    fn attribution_appends_numbered_footnotes() {
        let out = add_attribution("Generated body with a claim.[^1]", &context_with_chunks());
        assert!(out.contains("Generated body with a claim.[^1]"));
        assert!(out.contains("[^1]: manual.md §chunk 0"));
        assert!(out.contains("[^2]: manual.md §chunk 3"));
    }

    #[test]
    fn no_chunks_means_no_trailer() {
        let out = add_attribution("Body.", &AssembledContext::default());
        assert_eq!(out, "Body.");
    }

    #[test]
    fn output_path_is_confined_to_project_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(validate_output_path(tmp.path(), "drafts/out.md").is_ok());
        assert!(matches!(
            validate_output_path(tmp.path(), "../escape.md"),
            Err(Error::PathTraversal(_))
        ));
    }

    #[test]
    fn write_is_atomic_and_creates_parents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("drafts/out.md");
        write_output(&target, "first").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "first");
        write_output(&target, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        // no stray temp files left behind
        let stray: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(stray.len(), 1);
    }
}

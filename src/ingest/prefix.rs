//! Context-prefix generation.
//!
//! Each chunk gets a short model-generated sentence situating it inside its
//! document. The prefix is prepended to the chunk before embedding and
//! stored alongside it; the chunk text itself is never altered. Calls fan
//! out with bounded concurrency; a failed call degrades to an empty prefix
//! rather than aborting the ingest.

use futures::StreamExt;
use tracing::warn;

use crate::chunk::floor_char_boundary;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, Gateway};
use crate::models::ChunkDraft;

const PREFIX_PROMPT: &str = "You are a document assistant. Write a single concise sentence \
(max 40 words) that describes the broader context of the following chunk within the document. \
This context sentence will be prepended to the chunk text before embedding to improve \
retrieval precision.\n\nChunk:\n{chunk}\n\nContext sentence:";

const PREFIX_INPUT_CHAR_LIMIT: usize = 2_000;
const PREFIX_MAX_TOKENS: u32 = 60;

/// Generate one prefix per draft, in draft order.
pub async fn generate_prefixes(
    gateway: &dyn Gateway,
    model: &str,
    drafts: &[ChunkDraft],
    fan_out: usize,
) -> Result<Vec<String>> {
    let prefixes: Vec<String> = futures::stream::iter(drafts.iter().map(|draft| {
        let ordinal = draft.ordinal;
        let prompt = build_prompt(&draft.text);
        async move {
            let messages = [ChatMessage::user(prompt)];
            match gateway
                .complete(
                    model,
                    &messages,
                    CompletionOptions::with_max_tokens(PREFIX_MAX_TOKENS),
                )
                .await
            {
                Ok(prefix) => prefix.trim().to_string(),
                Err(err) => {
                    warn!(ordinal, error = %err, "context prefix failed, storing empty prefix");
                    String::new()
                }
            }
        }
    }))
    .buffered(fan_out.max(1))
    .collect()
    .await;

    Ok(prefixes)
}

fn build_prompt(chunk_text: &str) -> String {
    let end = floor_char_boundary(chunk_text, PREFIX_INPUT_CHAR_LIMIT.min(chunk_text.len()));
    PREFIX_PROMPT.replace("{chunk}", &chunk_text[..end])
}

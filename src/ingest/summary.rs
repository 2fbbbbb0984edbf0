//! Per-source summary generation.
//!
//! One document-level summary is generated per ingested source and stored
//! 1:1 with it. A failed summary is fatal for the source: degraded content
//! is never committed.

use crate::chunk::floor_char_boundary;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, Gateway};

const SUMMARY_PROMPT: &str = "You are a document assistant. Write a concise summary \
(max {max_tokens} tokens) of the following document that will be used as context for a \
retrieval-augmented generation system. Focus on the key topics, findings, and information \
present.\n\nDocument excerpt (first 8000 characters):\n{document}\n\nSummary:";

const SUMMARY_INPUT_CHAR_LIMIT: usize = 8_000;

pub async fn generate_summary(
    gateway: &dyn Gateway,
    model: &str,
    max_tokens: usize,
    full_text: &str,
) -> Result<String> {
    let end = floor_char_boundary(full_text, SUMMARY_INPUT_CHAR_LIMIT.min(full_text.len()));
    let prompt = SUMMARY_PROMPT
        .replace("{max_tokens}", &max_tokens.to_string())
        .replace("{document}", &full_text[..end]);

    let messages = [ChatMessage::user(prompt)];
    let summary = gateway
        .complete(
            model,
            &messages,
            CompletionOptions::with_max_tokens(max_tokens as u32),
        )
        .await?;
    Ok(summary.trim().to_string())
}

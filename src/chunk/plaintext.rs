//! Plain-text chunker: fixed window with overlap.

use crate::config::ChunkerTypeConfig;
use crate::models::ChunkDraft;

use super::{drafts_from_texts, split_fixed_window};

pub fn chunk(content: &str, config: &ChunkerTypeConfig) -> Vec<ChunkDraft> {
    drafts_from_texts(split_fixed_window(
        content,
        config.chunk_size,
        config.overlap,
    ))
}

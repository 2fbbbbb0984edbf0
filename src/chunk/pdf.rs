//! PDF chunker: text extraction then fixed-window splits.
//!
//! Pages that yield no text (scanned images) contribute nothing; there is
//! no OCR pass.

use std::path::Path;

use crate::config::ChunkerTypeConfig;
use crate::error::{Error, Result};
use crate::models::ChunkDraft;

use super::{drafts_from_texts, split_fixed_window};

pub fn chunk(path: &Path, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    let text = pdf_extract::extract_text(path).map_err(|e| {
        Error::UnsupportedSource(format!(
            "could not extract text from PDF '{}': {e}",
            path.display()
        ))
    })?;

    Ok(drafts_from_texts(split_fixed_window(
        &text,
        config.chunk_size,
        config.overlap,
    )))
}

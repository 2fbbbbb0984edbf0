//! Audio chunker: gateway transcription then plain-text splitting.
//!
//! The file-size ceiling is enforced before any API call is made.

use std::path::Path;

use crate::config::ChunkerTypeConfig;
use crate::error::{Error, Result};
use crate::llm::Gateway;
use crate::models::ChunkDraft;

use super::split_fixed_window;

pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["mp3", "wav", "m4a", "ogg", "flac", "mp4", "webm"];

const MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;

/// Transcription model used for audio sources.
pub const TRANSCRIPTION_MODEL: &str = "openai/whisper-1";

pub async fn chunk(
    path: &Path,
    config: &ChunkerTypeConfig,
    gateway: &dyn Gateway,
) -> Result<Vec<ChunkDraft>> {
    let extension = validate(path)?;

    let transcript = gateway.transcribe(TRANSCRIPTION_MODEL, path).await?;
    if transcript.trim().is_empty() {
        return Ok(Vec::new());
    }

    let drafts = split_fixed_window(&transcript, config.chunk_size, config.overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            ChunkDraft::with_metadata(
                i,
                piece,
                serde_json::json!({ "source_type": "audio", "format": extension }),
            )
        })
        .collect();
    Ok(drafts)
}

fn validate(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(Error::UnsupportedSource(format!(
            "unsupported audio format '.{extension}'; supported: {}",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let size = std::fs::metadata(path)?.len();
    if size > MAX_FILE_BYTES {
        return Err(Error::Other(format!(
            "audio file '{}' is {:.1} MB, over the 25 MB transcription limit; split it and \
             ingest the parts separately",
            path.display(),
            size as f64 / (1024.0 * 1024.0)
        )));
    }
    Ok(extension)
}

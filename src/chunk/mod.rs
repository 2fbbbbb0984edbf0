//! Chunkers: one implementation per source family behind one contract.
//!
//! Every chunker guarantees deterministic output for identical input,
//! non-empty chunk text, contiguous ordinals from 0, and token ceilings
//! honoured approximately (chars/4) with overlap applied at token
//! granularity. Dispatch is a pure function of URL scheme, file extension,
//! and repository layout.

pub mod audio;
pub mod epub;
pub mod git;
pub mod json;
pub mod markdown;
pub mod pdf;
pub mod plaintext;
pub mod web;

use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{ChunkDraft, SourceKind};

const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];
const TEXT_EXTENSIONS: [&str; 5] = ["txt", "rst", "text", "csv", "log"];
const GIT_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

/// Detect the source family for a path or URL.
pub fn detect_kind(raw: &str) -> Result<SourceKind> {
    if raw.starts_with("https://") || raw.starts_with("http://") {
        let host = url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default();
        if raw.ends_with(".git") || GIT_HOSTS.iter().any(|h| host == *h) {
            return Ok(SourceKind::Git);
        }
        return Ok(SourceKind::Web);
    }
    if raw.starts_with("git@") {
        return Ok(SourceKind::Git);
    }

    let path = Path::new(raw);
    if path.is_dir() {
        if path.join(".git").exists() {
            return Ok(SourceKind::Git);
        }
        return Err(Error::UnsupportedSource(format!(
            "'{raw}' is a directory without a .git repository; pass individual files or let \
             ingest expand it"
        )));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    kind_for_extension(&ext).ok_or_else(|| {
        Error::UnsupportedSource(format!(
            "no chunker registered for '.{ext}' files (source '{raw}')"
        ))
    })
}

/// Extension → family mapping shared with directory expansion.
pub fn kind_for_extension(ext: &str) -> Option<SourceKind> {
    if MARKDOWN_EXTENSIONS.contains(&ext) {
        return Some(SourceKind::Markdown);
    }
    if TEXT_EXTENSIONS.contains(&ext) {
        return Some(SourceKind::PlainText);
    }
    if audio::SUPPORTED_EXTENSIONS.contains(&ext) {
        return Some(SourceKind::Audio);
    }
    match ext {
        "pdf" => Some(SourceKind::Pdf),
        "epub" => Some(SourceKind::Epub),
        "json" => Some(SourceKind::Json),
        _ => None,
    }
}

/// Split text into fixed windows of roughly `chunk_size` tokens with the
/// given overlap fraction. Windows are measured in bytes (4 per token) and
/// snapped to char boundaries; segments are trimmed and never empty.
pub fn split_fixed_window(text: &str, chunk_size: usize, overlap: f32) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let window = chunk_size.saturating_mul(4).max(1);
    let overlap_len = (window as f32 * overlap) as usize;
    let step = window.saturating_sub(overlap_len).max(1);

    let mut segments = Vec::new();
    let mut pos = 0;
    let len = text.len();

    while pos < len {
        let start = ceil_char_boundary(text, pos);
        let end = floor_char_boundary(text, (pos + window).min(len));
        if start < end {
            let segment = text[start..end].trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
        }
        if pos + window >= len {
            break;
        }
        pos += step;
    }

    segments
}

/// Number sections into drafts with contiguous ordinals.
pub(crate) fn drafts_from_texts(texts: Vec<String>) -> Vec<ChunkDraft> {
    texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .enumerate()
        .map(|(i, t)| ChunkDraft::new(i, t))
        .collect()
}

pub(crate) fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

pub(crate) fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Strip an HTML document to readable text: script/style/nav/footer/head
/// subtrees are dropped, block elements become line breaks, and blank runs
/// collapse.
pub(crate) fn html_to_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let mut out = String::new();
    collect_text(document.tree.root(), &mut out);
    normalize_whitespace_blocks(&out)
}

const SKIPPED_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "head", "noscript"];
const BLOCK_TAGS: [&str; 17] = [
    "p", "div", "li", "br", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "tr",
    "ul", "ol", "blockquote", "pre",
];

fn collect_text(node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut String) {
    match node.value() {
        scraper::Node::Text(text) => out.push_str(&text.text),
        scraper::Node::Element(element) => {
            let name = element.name();
            if SKIPPED_TAGS.contains(&name) {
                return;
            }
            for child in node.children() {
                collect_text(child, out);
            }
            if BLOCK_TAGS.contains(&name) {
                out.push('\n');
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}

fn normalize_whitespace_blocks(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if lines.last().map(|l| l.is_empty()) != Some(true) {
                lines.push(String::new());
            }
        } else {
            lines.push(trimmed);
        }
    }
    lines.join("\n").trim().to_string()
}

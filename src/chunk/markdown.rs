//! Markdown chunker: heading-aware splits with fixed-window fallback.
//!
//! H1–H3 headings start a new section; the preamble before the first
//! heading is its own chunk. Sections over the token ceiling are further
//! split with the fixed-window splitter. Headingless documents fall back
//! to fixed-window splitting, as does the `fixed_window` strategy.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use crate::config::ChunkerTypeConfig;
use crate::llm::tokens::approx_tokens;
use crate::models::ChunkDraft;

use super::{drafts_from_texts, split_fixed_window};

pub fn chunk(content: &str, config: &ChunkerTypeConfig, strategy: &str) -> Vec<ChunkDraft> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    if strategy == "fixed_window" {
        return drafts_from_texts(split_fixed_window(
            content,
            config.chunk_size,
            config.overlap,
        ));
    }

    let headings = find_headings(content);
    if headings.is_empty() {
        return drafts_from_texts(split_fixed_window(
            content,
            config.chunk_size,
            config.overlap,
        ));
    }

    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    if headings[0].offset > 0 {
        let preamble = content[..headings[0].offset].trim();
        if !preamble.is_empty() {
            sections.push((None, preamble.to_string()));
        }
    }
    for (i, heading) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map(|h| h.offset)
            .unwrap_or(content.len());
        let body = content[heading.offset..end].trim();
        if !body.is_empty() {
            sections.push((Some(heading.text.clone()), body.to_string()));
        }
    }

    let mut drafts = Vec::new();
    for (heading, body) in sections {
        let pieces = if approx_tokens(&body) <= config.chunk_size {
            vec![body]
        } else {
            split_fixed_window(&body, config.chunk_size, config.overlap)
        };
        for piece in pieces {
            let metadata = match &heading {
                Some(text) => serde_json::json!({ "heading": text }),
                None => serde_json::json!({}),
            };
            drafts.push(ChunkDraft::with_metadata(drafts.len(), piece, metadata));
        }
    }
    drafts
}

struct HeadingMark {
    offset: usize,
    text: String,
}

/// Byte offsets and text of every H1–H3 heading. Parsing with
/// pulldown-cmark keeps `#` inside code fences from counting as headings.
fn find_headings(content: &str) -> Vec<HeadingMark> {
    let mut marks = Vec::new();
    let mut current: Option<(usize, Vec<String>)> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) if heading_depth(level) <= 3 => {
                current = Some((range.start, Vec::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, parts)) = current.as_mut() {
                    parts.push(text.to_string());
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((offset, parts)) = current.take() {
                    let text = parts.join("").trim().to_string();
                    if !text.is_empty() {
                        marks.push(HeadingMark { offset, text });
                    }
                }
            }
            _ => {}
        }
    }
    marks
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerTypeConfig {
        ChunkerTypeConfig {
            chunk_size: 512,
            overlap: 0.10,
        }
    }

    #[test]
    fn splits_on_headings_with_preamble() {
        let md = "intro text before any heading\n\n# Install\n\nsteps here\n\n## Configure\n\nmore here\n\n#### Deep\n\nnot a boundary";
        let drafts = chunk(md, &config(), "heading_aware");
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].text, "intro text before any heading");
        assert!(drafts[1].text.starts_with("# Install"));
        assert_eq!(drafts[1].metadata["heading"], "Install");
        // H4 stays inside the H2 section
        assert!(drafts[2].text.contains("#### Deep"));
        assert_eq!(drafts[2].metadata["heading"], "Configure");
    }

    #[test]
    fn hash_inside_code_fence_is_not_a_heading() {
        let md = "# Real\n\n```sh\n# just a comment\necho hi\n```\n";
        let drafts = chunk(md, &config(), "heading_aware");
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn headingless_input_falls_back_to_fixed_window() {
        let text = "plain prose without structure. ".repeat(200);
        let drafts = chunk(&text, &config(), "heading_aware");
        assert!(drafts.len() > 1);
        assert!(drafts.iter().all(|d| d.metadata.get("heading").is_none()));
    }

    #[test]
    fn oversized_section_is_window_split_and_keeps_heading() {
        let body = "details ".repeat(600);
        let md = format!("# Big Section\n\n{body}");
        let drafts = chunk(&md, &config(), "heading_aware");
        assert!(drafts.len() > 1);
        for draft in &drafts {
            assert_eq!(draft.metadata["heading"], "Big Section");
        }
    }

    #[test]
    fn fixed_window_strategy_ignores_headings() {
        let md = "# One\ntext\n# Two\ntext";
        let drafts = chunk(md, &config(), "fixed_window");
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].metadata.get("heading").is_none());
    }

    #[test]
    fn identical_input_chunks_identically() {
        let md = "# A\n\nbody one\n\n# B\n\nbody two";
        assert_eq!(
            chunk(md, &config(), "heading_aware"),
            chunk(md, &config(), "heading_aware")
        );
    }
}

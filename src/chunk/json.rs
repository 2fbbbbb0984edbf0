//! JSON chunker: object-level splits grouped by token budget.
//!
//! Array elements and top-level object entries become candidate segments,
//! grouped until the accumulated text would exceed the token ceiling.
//! Input that fails to parse as JSON falls back to fixed-window splitting.

use serde_json::Value;

use crate::config::ChunkerTypeConfig;
use crate::llm::tokens::approx_tokens;
use crate::models::ChunkDraft;

use super::{drafts_from_texts, split_fixed_window};

pub fn chunk(content: &str, config: &ChunkerTypeConfig) -> Vec<ChunkDraft> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return drafts_from_texts(split_fixed_window(
            content,
            config.chunk_size,
            config.overlap,
        ));
    };

    drafts_from_texts(group_items(segment(&value), config.chunk_size))
}

fn segment(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(|item| item.to_string()).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, v)| format!("\"{key}\": {v}"))
            .collect(),
        scalar => vec![scalar.to_string()],
    }
}

fn group_items(items: Vec<String>, chunk_size: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;

    for item in items {
        let item_tokens = approx_tokens(&item);
        if !current.is_empty() && current_tokens + item_tokens > chunk_size {
            segments.push(current.join("\n"));
            current.clear();
            current_tokens = 0;
        }
        current.push(item);
        current_tokens += item_tokens;
    }
    if !current.is_empty() {
        segments.push(current.join("\n"));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerTypeConfig {
        ChunkerTypeConfig {
            chunk_size: 300,
            overlap: 0.0,
        }
    }

    #[test]
    fn array_elements_group_by_budget() {
        let big = "x".repeat(600);
        let json = format!(r#"[{{"a": "{big}"}}, {{"b": "{big}"}}, {{"c": "{big}"}}]"#);
        let drafts = chunk(&json, &config());
        assert_eq!(drafts.len(), 3);
        assert!(drafts[0].text.contains("\"a\""));
    }

    #[test]
    fn small_array_is_one_chunk() {
        let drafts = chunk(r#"[1, 2, 3]"#, &config());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "1\n2\n3");
    }

    #[test]
    fn object_entries_become_key_value_lines() {
        let drafts = chunk(r#"{"name": "widget", "mass_kg": 4}"#, &config());
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].text.contains("\"name\": \"widget\""));
        assert!(drafts[0].text.contains("\"mass_kg\": 4"));
    }

    #[test]
    fn scalar_is_a_single_chunk() {
        let drafts = chunk("42", &config());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "42");
    }

    #[test]
    fn invalid_json_falls_back_to_fixed_window() {
        let drafts = chunk("not json at all {", &config());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "not json at all {");
    }
}

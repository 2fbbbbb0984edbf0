//! Token counting and context-window discovery.
//!
//! Counting is a provider-aware surface with a chars/4 heuristic behind it;
//! the ratio tracks GPT-family tokenisers closely enough for budget math.
//! Context windows come from a static table with a conservative fallback.

/// Approximate token count for *text* under *model*.
///
/// Unknown models use ceil(len / 4); known chat/embedding models currently
/// share the same ratio.
pub fn count_tokens(_model: &str, text: &str) -> usize {
    approx_tokens(text)
}

/// ceil(len / 4), minimum 1 for non-empty text.
pub fn approx_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4).max(1)
}

/// Best-effort context window in tokens for *model*.
pub fn context_window(model: &str) -> usize {
    match model {
        "openai/gpt-4o" | "openai/gpt-4o-mini" | "openai/gpt-4-turbo" => 128_000,
        "openai/gpt-3.5-turbo" => 16_384,
        "openai/text-embedding-3-small" | "openai/text-embedding-3-large" => 8_191,
        m if m.starts_with("anthropic/claude-") => 200_000,
        _ => DEFAULT_CONTEXT_WINDOW,
    }
}

/// Conservative default for unknown models.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8_192;

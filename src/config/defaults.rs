//! Default values for configuration

/// Default embedding model (provider/model format)
pub fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".to_string()
}

/// Default model for context-prefix generation (cheap tier)
pub fn default_context_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

/// Default generation model
pub fn default_generation_model() -> String {
    "openai/gpt-4o".to_string()
}

/// Default maximum source summaries included in a prompt
pub fn default_max_source_summaries() -> usize {
    10
}

/// Default retrieval mode
pub fn default_retrieval_mode() -> String {
    "hybrid".to_string()
}

/// Default number of candidates per retrieval channel
pub fn default_top_k() -> usize {
    10
}

/// Default Reciprocal Rank Fusion constant
pub fn default_rrf_k() -> u32 {
    60
}

/// Default: HyDE query expansion enabled
pub fn default_hyde() -> bool {
    true
}

/// Default model for HyDE hypothetical answers (cheap tier)
pub fn default_hyde_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

/// Default model for relevance scoring and conflict detection
pub fn default_scorer_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

/// Default relevance threshold on the 0-10 scale
pub fn default_relevance_threshold() -> u8 {
    4
}

/// Default token budget for the retrieved-chunk block
pub fn default_token_budget() -> usize {
    8_192
}

/// Default token ceiling for the project brief
pub fn default_brief_max_tokens() -> usize {
    3_000
}

/// Default model for per-source summaries (cheap tier)
pub fn default_summary_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

/// Default token ceiling for per-source summaries
pub fn default_summary_max_tokens() -> usize {
    500
}

/// Default bounded fan-out for network-bound per-chunk work
pub fn default_fan_out() -> usize {
    8
}

/// Default markdown chunking strategy
pub fn default_markdown_strategy() -> String {
    "heading_aware".to_string()
}

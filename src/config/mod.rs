//! Configuration management for archivist
//!
//! Layered YAML configuration, merged high to low:
//! CLI flags (applied at call sites) → `ARCHIVIST_*` environment variables →
//! per-project `archivist.yaml` → global `~/.archivist/config.yaml` →
//! built-in defaults.
//!
//! Credentials are never accepted from config files; provider API keys come
//! from the environment only (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `GIT_TOKEN` for private source-control access).

mod defaults;

pub use defaults::*;

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::SourceKind;

const PROJECT_CONFIG_NAME: &str = "archivist.yaml";
const DB_FILE_NAME: &str = ".archivist.db";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub chunkers: ChunkersConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Project-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Human-readable project name
    #[serde(default)]
    pub name: String,

    /// Local path to the project brief, loaded verbatim into the prompt.
    /// URLs are rejected at load time.
    #[serde(default)]
    pub brief: Option<String>,

    /// Token ceiling for the brief; warn and truncate past this
    #[serde(default = "default_brief_max_tokens")]
    pub brief_max_tokens: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model in provider/model format
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Completion model used to generate chunk context prefixes
    #[serde(default = "default_context_model")]
    pub context_model: String,
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_max_source_summaries")]
    pub max_source_summaries: usize,
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// hybrid | dense | bm25
    #[serde(default = "default_retrieval_mode")]
    pub mode: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// HyDE query expansion for the dense channel
    #[serde(default = "default_hyde")]
    pub hyde: bool,

    #[serde(default = "default_hyde_model")]
    pub hyde_model: String,

    #[serde(default = "default_scorer_model")]
    pub scorer_model: String,

    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: u8,

    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

/// Chunk size and overlap for a single source family
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerTypeConfig {
    pub chunk_size: usize,
    /// Overlap between adjacent chunks as a fraction of chunk_size
    pub overlap: f32,
}

impl ChunkerTypeConfig {
    fn new(chunk_size: usize, overlap: f32) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }
}

/// Markdown additionally carries its splitting strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownChunkerConfig {
    pub chunk_size: usize,
    pub overlap: f32,
    /// heading_aware | fixed_window
    #[serde(default = "default_markdown_strategy")]
    pub strategy: String,
}

impl MarkdownChunkerConfig {
    pub fn policy(&self) -> ChunkerTypeConfig {
        ChunkerTypeConfig {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

fn default_markdown_chunker() -> MarkdownChunkerConfig {
    MarkdownChunkerConfig {
        chunk_size: 512,
        overlap: 0.10,
        strategy: default_markdown_strategy(),
    }
}
fn default_pdf_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(400, 0.20)
}
fn default_epub_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(800, 0.10)
}
fn default_plaintext_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(512, 0.10)
}
fn default_json_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(300, 0.0)
}
fn default_git_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(600, 0.0)
}
fn default_web_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(512, 0.10)
}
fn default_audio_chunker() -> ChunkerTypeConfig {
    ChunkerTypeConfig::new(512, 0.10)
}

/// Per-family chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkersConfig {
    #[serde(default = "default_markdown_chunker")]
    pub markdown: MarkdownChunkerConfig,

    #[serde(default = "default_pdf_chunker")]
    pub pdf: ChunkerTypeConfig,

    #[serde(default = "default_epub_chunker")]
    pub epub: ChunkerTypeConfig,

    #[serde(default = "default_plaintext_chunker")]
    pub plaintext: ChunkerTypeConfig,

    #[serde(default = "default_json_chunker")]
    pub json: ChunkerTypeConfig,

    #[serde(default = "default_git_chunker")]
    pub git: ChunkerTypeConfig,

    #[serde(default = "default_web_chunker")]
    pub web: ChunkerTypeConfig,

    #[serde(default = "default_audio_chunker")]
    pub audio: ChunkerTypeConfig,
}

impl ChunkersConfig {
    /// Size/overlap policy for a source family.
    pub fn for_kind(&self, kind: SourceKind) -> ChunkerTypeConfig {
        match kind {
            SourceKind::Markdown => self.markdown.policy(),
            SourceKind::Pdf => self.pdf,
            SourceKind::Epub => self.epub,
            SourceKind::PlainText => self.plaintext,
            SourceKind::Json => self.json,
            SourceKind::Git => self.git,
            SourceKind::Web => self.web,
            SourceKind::Audio => self.audio,
        }
    }
}

/// Ingest-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,

    /// Bounded concurrency for context-prefix and embedding calls
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Project root (directory that holds archivist.yaml and the store)
    pub project_root: PathBuf,

    /// Path to the project config file
    pub config_file: PathBuf,

    /// Path to the SQLite store
    pub db_file: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            brief: None,
            brief_max_tokens: default_brief_max_tokens(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            context_model: default_context_model(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            max_source_summaries: default_max_source_summaries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_retrieval_mode(),
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            hyde: default_hyde(),
            hyde_model: default_hyde_model(),
            scorer_model: default_scorer_model(),
            relevance_threshold: default_relevance_threshold(),
            token_budget: default_token_budget(),
        }
    }
}

impl Default for ChunkersConfig {
    fn default() -> Self {
        Self {
            markdown: default_markdown_chunker(),
            pdf: default_pdf_chunker(),
            epub: default_epub_chunker(),
            plaintext: default_plaintext_chunker(),
            json: default_json_chunker(),
            git: default_git_chunker(),
            web: default_web_chunker(),
            audio: default_audio_chunker(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            summary_model: default_summary_model(),
            summary_max_tokens: default_summary_max_tokens(),
            fan_out: default_fan_out(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunkers: ChunkersConfig::default(),
            ingest: IngestConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Global config file path (~/.archivist/config.yaml)
    pub fn global_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".archivist")
            .join("config.yaml")
    }

    /// Load configuration for a project rooted at *project_root*.
    ///
    /// Merges global config, project config, and environment overrides over
    /// the built-in defaults. Either config file may be absent.
    pub fn load(project_root: &Path) -> Result<Self> {
        Self::load_with_global(project_root, &Self::global_config_path())
    }

    /// Same as [`Config::load`] with an explicit global config path (tests).
    pub fn load_with_global(project_root: &Path, global_path: &Path) -> Result<Self> {
        let project_path = project_root.join(PROJECT_CONFIG_NAME);

        let mut merged = serde_yaml::to_value(Config::default())?;
        for path in [global_path, project_path.as_path()] {
            if let Some(layer) = load_layer(path)? {
                merged = deep_merge(merged, layer);
            }
        }

        let mut config: Config = serde_yaml::from_value(merged)?;
        config.apply_env_overrides();
        config.paths = PathsConfig {
            project_root: project_root.to_path_buf(),
            config_file: project_path,
            db_file: project_root.join(DB_FILE_NAME),
        };

        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to the project config file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        debug!(path = %self.paths.config_file.display(), "saved project config");
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 6] = [
            ("ARCHIVIST_EMBEDDING_MODEL", &mut self.embedding.model),
            ("ARCHIVIST_CONTEXT_MODEL", &mut self.embedding.context_model),
            ("ARCHIVIST_GENERATION_MODEL", &mut self.generation.model),
            ("ARCHIVIST_RETRIEVAL_MODE", &mut self.retrieval.mode),
            ("ARCHIVIST_HYDE_MODEL", &mut self.retrieval.hyde_model),
            ("ARCHIVIST_SUMMARY_MODEL", &mut self.ingest.summary_model),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
        if let Ok(value) = std::env::var("ARCHIVIST_HYDE") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.retrieval.hyde = true,
                "0" | "false" | "no" => self.retrieval.hyde = false,
                other => warn!(value = other, "ignoring unparseable ARCHIVIST_HYDE"),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.retrieval.mode.as_str(), "hybrid" | "dense" | "bm25") {
            return Err(Error::Config(format!(
                "retrieval.mode must be one of hybrid, dense, bm25 (got '{}')",
                self.retrieval.mode
            )));
        }
        if !matches!(
            self.chunkers.markdown.strategy.as_str(),
            "heading_aware" | "fixed_window"
        ) {
            return Err(Error::Config(format!(
                "chunkers.markdown.strategy must be heading_aware or fixed_window (got '{}')",
                self.chunkers.markdown.strategy
            )));
        }
        if self.retrieval.relevance_threshold > 10 {
            return Err(Error::Config(
                "retrieval.relevance_threshold must be between 0 and 10".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.ingest.fan_out == 0 {
            return Err(Error::Config(
                "ingest.fan_out must be at least 1".to_string(),
            ));
        }
        for (family, c) in [
            ("markdown", self.chunkers.markdown.policy()),
            ("pdf", self.chunkers.pdf),
            ("epub", self.chunkers.epub),
            ("plaintext", self.chunkers.plaintext),
            ("json", self.chunkers.json),
            ("git", self.chunkers.git),
            ("web", self.chunkers.web),
            ("audio", self.chunkers.audio),
        ] {
            if c.chunk_size == 0 {
                return Err(Error::Config(format!(
                    "chunkers.{family}.chunk_size must be at least 1"
                )));
            }
            if !(0.0..1.0).contains(&c.overlap) {
                return Err(Error::Config(format!(
                    "chunkers.{family}.overlap must be in [0.0, 1.0)"
                )));
            }
        }
        if let Some(brief) = &self.project.brief {
            validate_brief_path(brief)?;
        }
        Ok(())
    }
}

/// Read one YAML layer from disk. Missing files are not an error.
fn load_layer(path: &Path) -> Result<Option<serde_yaml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading config layer");
    let content = std::fs::read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content)?;
    if let serde_yaml::Value::Mapping(map) = &value {
        reject_credential_keys(map, path, "")?;
        warn_unknown_sections(map, path);
    }
    Ok(Some(value))
}

/// Keys that look like credentials are refused in config files.
fn credential_key_pattern() -> Regex {
    Regex::new(
        r"(?i)api[_\-]?(key|secret)|_token$|^token$|_secret$|^secret$|passw(ord|d)|credential",
    )
    .expect("static pattern")
}

fn reject_credential_keys(map: &serde_yaml::Mapping, file: &Path, prefix: &str) -> Result<()> {
    let pattern = credential_key_pattern();
    for (key, value) in map {
        let key_str = key.as_str().unwrap_or_default();
        let full = if prefix.is_empty() {
            key_str.to_string()
        } else {
            format!("{prefix}.{key_str}")
        };
        if pattern.is_match(key_str) {
            return Err(Error::Config(format!(
                "config file '{}' contains forbidden key '{}'. API keys must be set via \
                 environment variables, not config files",
                file.display(),
                full
            )));
        }
        if let serde_yaml::Value::Mapping(nested) = value {
            reject_credential_keys(nested, file, &full)?;
        }
    }
    Ok(())
}

const KNOWN_SECTIONS: [&str; 6] = [
    "project",
    "embedding",
    "generation",
    "retrieval",
    "chunkers",
    "ingest",
];

fn warn_unknown_sections(map: &serde_yaml::Mapping, file: &Path) {
    for key in map.keys() {
        if let Some(name) = key.as_str() {
            if !KNOWN_SECTIONS.contains(&name) {
                warn!(key = name, file = %file.display(), "unknown config section ignored");
            }
        }
    }
}

/// project.brief must be a local file path; URLs are rejected.
fn validate_brief_path(brief: &str) -> Result<()> {
    let lowered = brief.trim().to_ascii_lowercase();
    if lowered.starts_with("http://")
        || lowered.starts_with("https://")
        || lowered.starts_with("ftp://")
        || lowered.starts_with("//")
        || lowered.starts_with("git@")
    {
        return Err(Error::Config(format!(
            "project.brief must be a local file path, not a URL: '{brief}'"
        )));
    }
    Ok(())
}

/// Deep-merge *over* onto *base*. Mappings merge recursively; any other
/// value in *over* replaces the base value.
fn deep_merge(base: serde_yaml::Value, over: serde_yaml::Value) -> serde_yaml::Value {
    match (base, over) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(over_map)) => {
            for (key, over_value) in over_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, over_value),
                    None => over_value,
                };
                base_map.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, over) => over,
    }
}

//! Custom error types for archivist

use thiserror::Error;

/// Main error type for archivist operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No API key for provider '{provider}'. Set the {env_var} environment variable")]
    Credential { provider: String, env_var: String },

    #[error("Path '{0}' resolves outside the project root. Use a path inside the project")]
    PathTraversal(String),

    #[error("URL resolves to a private or reserved address: {0}. Use a publicly reachable URL")]
    Ssrf(String),

    #[error("Unsupported source type: {0}")]
    UnsupportedSource(String),

    #[error("No vector index for embedding model '{model}'. Run 'archivist ingest' to populate it, or change embedding.model to match the store")]
    SchemaMismatch { model: String },

    #[error("Store integrity violation: {0}")]
    StoreIntegrity(String),

    #[error("Provider request failed after retries: {0}")]
    ProviderTransient(String),

    #[error("Provider request failed: {0}")]
    ProviderFatal(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("Source not found: {0}. Run 'archivist sources' to list ingested sources")]
    SourceNotFound(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures the gateway may retry (network, rate-limit, 5xx).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ProviderTransient(_))
    }
}

/// Result type alias for archivist
pub type Result<T> = std::result::Result<T, Error>;

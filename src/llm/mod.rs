//! Provider-agnostic LLM gateway
//!
//! One narrow capability for completion, embedding, transcription, token
//! counting, and context-window discovery. Models are named
//! `provider/model`; dispatch happens on the provider prefix and provider
//! identity never leaks into retrieval or assembly code.
//!
//! Credentials are read from the process environment at call time and are
//! never persisted or logged.

mod anthropic;
mod openai;
mod retry;
pub mod tokens;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// A single chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Options for a completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.0,
        }
    }
}

impl CompletionOptions {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }
}

/// The provider-agnostic capability the rest of the crate depends on.
///
/// Tests substitute a deterministic stub; production uses [`LlmGateway`].
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String>;

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>>;

    async fn transcribe(&self, model: &str, audio_path: &Path) -> Result<String>;

    fn count_tokens(&self, model: &str, text: &str) -> usize {
        tokens::count_tokens(model, text)
    }

    fn context_window(&self, model: &str) -> usize {
        tokens::context_window(model)
    }

    /// Check that the credential for *model*'s provider is present.
    fn validate_credentials(&self, model: &str) -> Result<()>;
}

/// Split `provider/model` into its two halves.
pub fn split_model(model: &str) -> Result<(&str, &str)> {
    match model.split_once('/') {
        Some((provider, rest)) if !provider.is_empty() && !rest.is_empty() => Ok((provider, rest)),
        _ => Err(Error::Config(format!(
            "model '{model}' is not in provider/model format (e.g. openai/gpt-4o-mini)"
        ))),
    }
}

/// Environment variable holding the credential for *provider*, if one is
/// required.
pub fn provider_env_var(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some(anthropic::ENV_VAR),
        "ollama" => None,
        _ => None,
    }
}

/// Heuristic cheap-tier check used by the ingest cost preview.
pub fn is_cheap_tier(model: &str) -> bool {
    let lowered = model.to_ascii_lowercase();
    lowered.starts_with("ollama/")
        || ["-mini", "-small", "-nano", "-haiku", ":free"]
            .iter()
            .any(|suffix| lowered.contains(suffix))
}

/// HTTP-backed gateway dispatching on the provider prefix.
pub struct LlmGateway {
    client: reqwest::Client,
}

impl LlmGateway {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("archivist/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn openai_endpoint(&self, provider: &str) -> Result<openai::Endpoint> {
        match provider {
            "openai" => openai::Endpoint::openai(),
            "ollama" => Ok(openai::Endpoint::ollama()),
            _ => Err(unknown_provider(provider)),
        }
    }
}

fn unknown_provider(provider: &str) -> Error {
    Error::Config(format!(
        "unknown provider '{provider}'. Supported: openai, anthropic, ollama"
    ))
}

#[async_trait]
impl Gateway for LlmGateway {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String> {
        let (provider, rest) = split_model(model)?;
        match provider {
            "openai" | "ollama" => {
                let endpoint = self.openai_endpoint(provider)?;
                openai::complete(&self.client, &endpoint, rest, messages, options).await
            }
            "anthropic" => anthropic::complete(&self.client, rest, messages, options).await,
            _ => Err(unknown_provider(provider)),
        }
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let (provider, rest) = split_model(model)?;
        match provider {
            "openai" | "ollama" => {
                let endpoint = self.openai_endpoint(provider)?;
                openai::embed(&self.client, &endpoint, rest, text).await
            }
            "anthropic" => Err(Error::Config(
                "provider 'anthropic' serves no embedding API; use an openai/ or ollama/ \
                 embedding.model"
                    .to_string(),
            )),
            _ => Err(unknown_provider(provider)),
        }
    }

    async fn transcribe(&self, model: &str, audio_path: &Path) -> Result<String> {
        let (provider, rest) = split_model(model)?;
        match provider {
            "openai" => {
                let endpoint = self.openai_endpoint(provider)?;
                openai::transcribe(&self.client, &endpoint, rest, audio_path).await
            }
            _ => Err(Error::Config(format!(
                "provider '{provider}' serves no transcription API; audio ingest requires an \
                 openai/ transcription model"
            ))),
        }
    }

    fn validate_credentials(&self, model: &str) -> Result<()> {
        let (provider, _) = split_model(model)?;
        if provider_env_var(provider).is_none() && provider != "ollama" {
            return Err(unknown_provider(provider));
        }
        if let Some(env_var) = provider_env_var(provider) {
            let present = std::env::var(env_var)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(Error::Credential {
                    provider: provider.to_string(),
                    env_var: env_var.to_string(),
                });
            }
        }
        Ok(())
    }
}

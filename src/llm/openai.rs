//! OpenAI-compatible HTTP backend.
//!
//! Serves both `openai/...` (api.openai.com, bearer auth) and `ollama/...`
//! (local OpenAI-compatible endpoint, no auth). Chat completions,
//! embeddings, and Whisper transcription share one request helper.

use std::path::Path;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::retry::{status_error, transport_error, with_retry};
use super::{ChatMessage, CompletionOptions, Role};
use crate::error::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434/v1";

/// Connection parameters for one OpenAI-compatible endpoint.
pub(crate) struct Endpoint {
    pub provider: &'static str,
    pub base_url: String,
    pub env_var: &'static str,
    pub api_key: Option<String>,
}

impl Endpoint {
    pub(crate) fn openai() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            return Err(Error::Credential {
                provider: "openai".to_string(),
                env_var: "OPENAI_API_KEY".to_string(),
            });
        }
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.to_string());
        Ok(Self {
            provider: "openai",
            base_url,
            env_var: "OPENAI_API_KEY",
            api_key,
        })
    }

    /// Local endpoint, no credential required.
    pub(crate) fn ollama() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| OLLAMA_BASE_URL.to_string());
        Self {
            provider: "ollama",
            base_url,
            env_var: "OLLAMA_BASE_URL",
            api_key: None,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub(crate) async fn complete(
    client: &Client,
    endpoint: &Endpoint,
    model: &str,
    messages: &[ChatMessage],
    options: CompletionOptions,
) -> Result<String> {
    let body = json!({
        "model": model,
        "messages": messages.iter().map(|m| json!({
            "role": match m.role { Role::System => "system", Role::User => "user" },
            "content": m.content,
        })).collect::<Vec<_>>(),
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
    });

    let response: ChatResponse = with_retry("chat completion", || {
        post_json(client, endpoint, "chat/completions", &body)
    })
    .await?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    Ok(content)
}

pub(crate) async fn embed(
    client: &Client,
    endpoint: &Endpoint,
    model: &str,
    text: &str,
) -> Result<Vec<f32>> {
    let body = json!({ "model": model, "input": [text] });

    let response: EmbeddingResponse =
        with_retry("embedding", || post_json(client, endpoint, "embeddings", &body)).await?;

    response
        .data
        .into_iter()
        .next()
        .map(|row| row.embedding)
        .ok_or_else(|| {
            Error::ProviderFatal(format!("{} returned no embedding rows", endpoint.provider))
        })
}

pub(crate) async fn transcribe(
    client: &Client,
    endpoint: &Endpoint,
    model: &str,
    audio_path: &Path,
) -> Result<String> {
    let bytes = tokio::fs::read(audio_path).await?;
    let file_name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    let model = model.to_string();

    let response: TranscriptionResponse = with_retry("transcription", || {
        let part = reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
        let form = reqwest::multipart::Form::new()
            .text("model", model.clone())
            .part("file", part);
        async {
            let url = format!("{}/audio/transcriptions", endpoint.base_url);
            let mut request = client.post(&url).multipart(form);
            if let Some(key) = &endpoint.api_key {
                request = request.bearer_auth(key);
            }
            let response = request
                .send()
                .await
                .map_err(|e| transport_error(endpoint.provider, e))?;
            read_json(endpoint, response).await
        }
    })
    .await?;

    Ok(response.text)
}

async fn post_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    endpoint: &Endpoint,
    path: &str,
    body: &serde_json::Value,
) -> Result<T> {
    let url = format!("{}/{}", endpoint.base_url, path);
    let mut request = client.post(&url).json(body);
    if let Some(key) = &endpoint.api_key {
        request = request.bearer_auth(key);
    }
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(endpoint.provider, e))?;
    read_json(endpoint, response).await
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    endpoint: &Endpoint,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(endpoint.provider, endpoint.env_var, status, &body));
    }
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str(&body).map_err(|e| {
        Error::ProviderFatal(format!(
            "{} returned an unparseable response: {e}",
            endpoint.provider
        ))
    })
}

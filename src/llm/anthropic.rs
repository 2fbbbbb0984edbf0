//! Anthropic messages backend.
//!
//! Completion only — Anthropic serves no embedding or transcription API, so
//! those capabilities surface a configuration error at the dispatch layer.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::retry::{status_error, transport_error, with_retry};
use super::{ChatMessage, CompletionOptions, Role};
use crate::error::{Error, Result};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) const ENV_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub(crate) fn api_key() -> Result<String> {
    std::env::var(ENV_VAR)
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Credential {
            provider: "anthropic".to_string(),
            env_var: ENV_VAR.to_string(),
        })
}

pub(crate) async fn complete(
    client: &Client,
    model: &str,
    messages: &[ChatMessage],
    options: CompletionOptions,
) -> Result<String> {
    let api_key = api_key()?;
    let base_url =
        std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| ANTHROPIC_BASE_URL.to_string());

    // The messages API takes the system prompt as a top-level field.
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": "user", "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": turns,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }

    let response: MessagesResponse = with_retry("chat completion", || async {
        let url = format!("{base_url}/messages");
        let response = client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("anthropic", ENV_VAR, status, &text));
        }
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text)
            .map_err(|e| Error::ProviderFatal(format!("anthropic returned an unparseable response: {e}")))
    })
    .await?;

    Ok(response
        .content
        .into_iter()
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join(""))
}

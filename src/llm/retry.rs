//! Retry policy for provider calls.
//!
//! At most three attempts. Exponential backoff (1s, 2s, 4s) with the total
//! sleep capped at 60 seconds. Only transient failures are retried: connect
//! and timeout errors, 408, 429, and 5xx responses. Everything else
//! surfaces immediately.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::error::{Error, Result};

const MAX_ATTEMPTS: u32 = 3;
const MAX_TOTAL_BACKOFF: Duration = Duration::from_secs(60);

/// Run *op* with the gateway retry policy.
pub(crate) async fn with_retry<F, Fut, T>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut slept = Duration::ZERO;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                if slept + delay > MAX_TOTAL_BACKOFF {
                    return Err(err);
                }
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                slept += delay;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1))
}

/// Map an HTTP error response to the transient/fatal taxonomy.
///
/// 401/403 become credential errors so the caller can name the env var.
pub(crate) fn status_error(provider: &str, env_var: &str, status: StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Credential {
            provider: provider.to_string(),
            env_var: env_var.to_string(),
        };
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Error::ProviderTransient(format!("{provider} returned {status}: {snippet}"))
    } else {
        Error::ProviderFatal(format!("{provider} returned {status}: {snippet}"))
    }
}

/// Map a reqwest transport error to the taxonomy.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        Error::ProviderTransient(format!("{provider} request failed: {err}"))
    } else {
        Error::ProviderFatal(format!("{provider} request failed: {err}"))
    }
}

//! Web chunker: fetch a public page, strip to text, then fixed windows.
//!
//! The SSRF guard resolves the hostname before any connection and refuses
//! private, loopback, link-local, multicast, unspecified, and other
//! reserved address space. Only http(s) is accepted, the response body is
//! capped at 5 MB, and only text/html and text/plain content types are
//! processed.

use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;
use url::{Host, Url};

use crate::config::ChunkerTypeConfig;
use crate::error::{Error, Result};
use crate::models::ChunkDraft;

use super::{html_to_text, split_fixed_window};

const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 3;

pub async fn chunk(url: &str, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    let parsed = validate_scheme(url)?;
    guard_ssrf(&parsed).await?;
    let text = fetch_text(&parsed).await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let drafts = split_fixed_window(&text, config.chunk_size, config.overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            ChunkDraft::with_metadata(i, piece, serde_json::json!({ "url": url }))
        })
        .collect();
    Ok(drafts)
}

fn validate_scheme(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "https" | "http" => Ok(parsed),
        other => Err(Error::UnsupportedSource(format!(
            "unsupported URL scheme '{other}'; only https:// and http:// can be ingested"
        ))),
    }
}

/// Resolve the host and refuse disallowed address space before connecting.
pub async fn guard_ssrf(url: &Url) -> Result<()> {
    let host = url
        .host()
        .ok_or_else(|| Error::Config(format!("URL has no host: {url}")))?;

    let addresses: Vec<IpAddr> = match host {
        Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
        Host::Domain(name) => {
            let port = url.port_or_known_default().unwrap_or(443);
            tokio::net::lookup_host((name, port))
                .await
                .map_err(|e| Error::Other(format!("DNS resolution failed for '{name}': {e}")))?
                .map(|addr| addr.ip())
                .collect()
        }
    };

    if addresses.is_empty() {
        return Err(Error::Other(format!("no addresses resolved for {url}")));
    }
    for ip in addresses {
        if is_disallowed(ip) {
            return Err(Error::Ssrf(format!("{url} → {ip}")));
        }
    }
    Ok(())
}

fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                // unique local fc00::/7
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // link local fe80::/10
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

async fn fetch_text(url: &Url) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(concat!("archivist/", env!("CARGO_PKG_VERSION")))
        .build()?;

    debug!(url = %url, "fetching page");
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Other(format!("fetch of {url} returned {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_else(|| "text/html".to_string());
    if content_type != "text/html" && content_type != "text/plain" {
        return Err(Error::UnsupportedSource(format!(
            "content type '{content_type}' for {url}; accepted: text/html, text/plain"
        )));
    }

    if let Some(length) = response.content_length() {
        if length as usize > MAX_BODY_BYTES {
            return Err(Error::Other(format!(
                "response body for {url} exceeds the 5 MB limit"
            )));
        }
    }
    let body = response.bytes().await?;
    if body.len() > MAX_BODY_BYTES {
        return Err(Error::Other(format!(
            "response body for {url} exceeds the 5 MB limit"
        )));
    }

    let text = String::from_utf8_lossy(&body);
    Ok(if content_type == "text/plain" {
        text.into_owned()
    } else {
        html_to_text(&text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_whitelist() {
        assert!(validate_scheme("https://example.com/docs").is_ok());
        assert!(validate_scheme("http://example.com").is_ok());
        assert!(matches!(
            validate_scheme("ftp://example.com/file"),
            Err(Error::UnsupportedSource(_))
        ));
        assert!(matches!(
            validate_scheme("file:///etc/passwd"),
            Err(Error::UnsupportedSource(_))
        ));
    }

    #[test]
    fn private_and_reserved_ranges_are_disallowed() {
        for addr in [
            "127.0.0.1",
            "10.0.0.8",
            "172.16.4.2",
            "192.168.1.1",
            "169.254.10.10",
            "0.0.0.0",
            "::1",
            "fc00::1",
            "fe80::1",
        ] {
            assert!(is_disallowed(addr.parse().unwrap()), "{addr}");
        }
        for addr in ["93.184.216.34", "2606:2800:220:1:248:1893:25c8:1946"] {
            assert!(!is_disallowed(addr.parse().unwrap()), "{addr}");
        }
    }

    #[tokio::test]
    async fn ip_literal_urls_are_guarded_without_dns() {
        let url = Url::parse("http://127.0.0.1:8080/admin").unwrap();
        let err = guard_ssrf(&url).await.unwrap_err();
        assert!(matches!(err, Error::Ssrf(_)));

        let url = Url::parse("http://[::1]/admin").unwrap();
        assert!(matches!(guard_ssrf(&url).await, Err(Error::Ssrf(_))));
    }
}

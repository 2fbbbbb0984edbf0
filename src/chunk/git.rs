//! Source-control chunker: one chunk per commit (message + stat summary).
//!
//! Remote repositories are cloned into an owner-only temporary directory
//! that is removed on every exit path. The clone URL scheme is whitelisted,
//! git is always invoked without a shell, and the `GIT_TOKEN` credential is
//! injected in memory only — it never reaches logs or error messages.

use std::path::Path;

use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::config::ChunkerTypeConfig;
use crate::error::{Error, Result};
use crate::models::ChunkDraft;

use super::floor_char_boundary;

const GIT_TOKEN_ENV: &str = "GIT_TOKEN";

pub async fn chunk(path_or_url: &str, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    if is_remote(path_or_url) {
        chunk_remote(path_or_url, config).await
    } else {
        let repo = Path::new(path_or_url);
        if !repo.join(".git").exists() {
            return Err(Error::UnsupportedSource(format!(
                "'{path_or_url}' is not a git repository (no .git directory)"
            )));
        }
        extract_commits(repo, config).await
    }
}

pub fn is_remote(path_or_url: &str) -> bool {
    path_or_url.contains("://") || path_or_url.starts_with("git@")
}

async fn chunk_remote(url: &str, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    validate_url(url)?;
    let clone_url = inject_token(url);

    let tmpdir = TempDir::with_prefix("archivist-git-")?;
    restrict_permissions(tmpdir.path())?;

    debug!(url = %scrub_credentials(url), "cloning repository");
    let output = Command::new("git")
        .arg("clone")
        .arg("--quiet")
        .arg("--")
        .arg(&clone_url)
        .arg(tmpdir.path())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = scrub_credentials(&String::from_utf8_lossy(&output.stderr));
        return Err(Error::Other(format!(
            "git clone failed for {}: {}",
            scrub_credentials(url),
            stderr.trim()
        )));
    }

    // tmpdir is removed on drop, including the error paths above
    extract_commits(tmpdir.path(), config).await
}

fn validate_url(url: &str) -> Result<()> {
    if url.starts_with("git@") {
        return Ok(());
    }
    let parsed = url::Url::parse(url)?;
    match parsed.scheme() {
        "https" | "http" => Ok(()),
        other => Err(Error::UnsupportedSource(format!(
            "unsupported URL scheme '{other}' for git sources; allowed: https://, http://, git@"
        ))),
    }
}

/// Inject `GIT_TOKEN` into an HTTP(S) clone URL for private repositories.
/// The result is used for the clone call only.
fn inject_token(url: &str) -> String {
    let Ok(token) = std::env::var(GIT_TOKEN_ENV) else {
        return url.to_string();
    };
    if token.is_empty() || !(url.starts_with("https://") || url.starts_with("http://")) {
        return url.to_string();
    }
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.set_username(&token).is_err() {
                return url.to_string();
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// Strip userinfo from URLs embedded in *text* so credentials never reach
/// logs or error messages.
pub(crate) fn scrub_credentials(text: &str) -> String {
    let pattern = Regex::new(r"(?i)(https?://)([^@/\s]+@)").expect("static pattern");
    let mut scrubbed = pattern.replace_all(text, "${1}***@").into_owned();
    if let Ok(token) = std::env::var(GIT_TOKEN_ENV) {
        if !token.is_empty() {
            scrubbed = scrubbed.replace(&token, "***");
        }
    }
    scrubbed
}

fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

async fn extract_commits(repo: &Path, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    let hashes = commit_hashes(repo).await?;
    let char_limit = config.chunk_size.saturating_mul(4);

    let mut drafts = Vec::new();
    for hash in hashes {
        let text = commit_text(repo, &hash).await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let end = floor_char_boundary(trimmed, char_limit.min(trimmed.len()));
        drafts.push(ChunkDraft::with_metadata(
            drafts.len(),
            trimmed[..end].trim_end().to_string(),
            serde_json::json!({ "commit": hash }),
        ));
    }
    Ok(drafts)
}

async fn commit_hashes(repo: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .arg("log")
        .arg("--format=%H")
        .arg("--no-merges")
        .current_dir(repo)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::Other(format!(
            "git log failed in {}: {}",
            repo.display(),
            scrub_credentials(&String::from_utf8_lossy(&output.stderr))
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

async fn commit_text(repo: &Path, hash: &str) -> Result<String> {
    let output = Command::new("git")
        .arg("show")
        .arg("--stat")
        .arg("--format=commit %H%nAuthor: %an <%ae>%nDate: %ad%n%nSubject: %s%n%n%b")
        .arg(hash)
        .current_dir(repo)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::Other(format!(
            "git show {hash} failed: {}",
            scrub_credentials(&String::from_utf8_lossy(&output.stderr))
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

//! X/Twitter helpers: status URL detection, the Nitter mirror, block
//! detection and the Bird reader.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use url::Url;

use crate::config::{NITTER_HOST, SOCIAL_BLOCKED_RE, SOCIAL_HOSTS};
use crate::error::CapabilityError;

static STATUS_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[^/]+/status(?:es)?/(\d+)").unwrap());

fn social_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if SOCIAL_HOSTS.contains(&host.as_str()) {
        Some(parsed)
    } else {
        None
    }
}

/// Numeric id of a post URL on an allowed host.
pub fn status_id(url: &str) -> Option<String> {
    let parsed = social_url(url)?;
    STATUS_PATH_RE
        .captures(parsed.path())
        .map(|caps| caps[1].to_string())
}

pub fn is_social_status_url(url: &str) -> bool {
    status_id(url).is_some()
}

/// Same path and query on the mirror host.
pub fn to_nitter_url(url: &str) -> Option<String> {
    let mut parsed = social_url(url)?;
    parsed.set_host(Some(NITTER_HOST)).ok()?;
    parsed.set_scheme("https").ok()?;
    Some(parsed.to_string())
}

/// Whether extracted post content is an interstitial rather than the post.
pub fn is_blocked_social_content(text: &str) -> bool {
    SOCIAL_BLOCKED_RE.is_match(text)
}

// ── Bird reader ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tweet {
    pub text: String,
    pub author: Option<String>,
}

/// Dedicated reader for a single post, bypassing the rendered page.
#[async_trait]
pub trait TweetReader: Send + Sync {
    async fn read_tweet(&self, url: &str, timeout_ms: u64)
        -> Result<Option<Tweet>, CapabilityError>;
}

/// Runs the `bird` CLI: `bird read <url> --json`.
#[derive(Debug, Clone)]
pub struct BirdCliReader {
    bin: String,
}

impl BirdCliReader {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn parse_output(stdout: &str) -> Result<Option<Tweet>, CapabilityError> {
        let value: Value =
            serde_json::from_str(stdout.trim()).map_err(|e| CapabilityError::Decode(e.to_string()))?;
        let tweet = value.get("tweet").unwrap_or(&value);

        let text = tweet
            .get("text")
            .or_else(|| tweet.get("full_text"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if text.is_empty() {
            return Ok(None);
        }

        let author = match tweet.get("author").or_else(|| tweet.get("user")) {
            Some(Value::String(handle)) => Some(handle.clone()),
            Some(Value::Object(obj)) => ["username", "screen_name", "handle", "name"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        };

        Ok(Some(Tweet {
            text: text.to_string(),
            author,
        }))
    }
}

#[async_trait]
impl TweetReader for BirdCliReader {
    async fn read_tweet(
        &self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<Option<Tweet>, CapabilityError> {
        let child = Command::new(&self.bin)
            .args(["read", url, "--json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Process(format!("failed to start {}: {}", self.bin, e)))?;

        let output = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CapabilityError::Timeout { after_ms: timeout_ms })?
        .map_err(|e| CapabilityError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Process(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Title for a post read through Bird: the author handle, `@`-prefixed.
pub fn author_title(author: Option<&str>) -> Option<String> {
    let author = author?.trim().trim_start_matches('@');
    if author.is_empty() {
        None
    } else {
        Some(format!("@{}", author))
    }
}

use crate::models::{AttemptOutcome, AttemptRecord, Stage};

/// Failure of a single injected capability (fetch, scrape, convert, read).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("URL did not return HTML")]
    NotHtml,
    #[error("{0}")]
    Request(String),
    #[error("{0}")]
    Process(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CapabilityError::Request(format!("TimeoutError: {}", e))
        } else if e.is_connect() {
            CapabilityError::Request(format!("ConnectError: {}", e))
        } else if e.is_decode() {
            CapabilityError::Decode(e.to_string())
        } else {
            CapabilityError::Request(format!("RequestError: {}", e))
        }
    }
}

/// Unrecoverable failure of a whole extraction call.
///
/// Every message names the strategies that were tried and why each one failed.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error(
        "{platform} episodes need audio transcription, but neither OPENAI_API_KEY nor FAL_KEY is configured (HTML extraction is skipped because the page is a CAPTCHA wall)"
    )]
    TranscriptionUnavailable { platform: &'static str },

    #[error("{platform} transcript unavailable: {detail}")]
    TranscriptUnavailable { platform: &'static str, detail: String },

    #[error("{0}")]
    Exhausted(String),

    #[error("{0}")]
    SocialBlocked(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

// ── Aggregated messages ──────────────────────────────────────────────────────

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Html => "HTML fetch",
        Stage::Firecrawl => "Firecrawl",
        Stage::Bird => "Bird reader",
        Stage::Nitter => "Nitter mirror",
        Stage::Transcript => "transcript",
    }
}

fn outcome_label(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Ok => "succeeded".to_string(),
        AttemptOutcome::Unavailable(why) => format!("unavailable ({})", why),
        AttemptOutcome::Failed(why) => format!("failed ({})", why),
        AttemptOutcome::Empty => "returned nothing".to_string(),
        AttemptOutcome::Blocked => "blocked".to_string(),
    }
}

/// Render attempts as `"Bird reader failed (...); Nitter mirror blocked"`.
///
/// Only the last record per stage is reported, in first-seen order.
pub fn describe_attempts(attempts: &[AttemptRecord]) -> String {
    let mut order: Vec<Stage> = Vec::new();
    for record in attempts {
        if !order.contains(&record.stage) {
            order.push(record.stage);
        }
    }

    order
        .into_iter()
        .filter_map(|stage| {
            attempts
                .iter()
                .rev()
                .find(|r| r.stage == stage)
                .map(|r| format!("{} {}", stage_label(stage), outcome_label(&r.outcome)))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error for a generic page where neither the direct fetch nor Firecrawl produced content.
pub fn exhausted(url: &str, attempts: &[AttemptRecord]) -> LinkError {
    LinkError::Exhausted(format!(
        "Failed to extract content from {}: {}",
        url,
        describe_attempts(attempts)
    ))
}

/// Error for a social status blocked at every tier.
pub fn social_blocked(url: &str, attempts: &[AttemptRecord]) -> LinkError {
    LinkError::SocialBlocked(format!(
        "Unable to read post {}: {}",
        url,
        describe_attempts(attempts)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_attempts_reports_last_outcome_per_stage() {
        let attempts = vec![
            AttemptRecord::new(Stage::Firecrawl, AttemptOutcome::Empty),
            AttemptRecord::new(Stage::Html, AttemptOutcome::Failed("HTTP 503".into())),
            AttemptRecord::new(Stage::Firecrawl, AttemptOutcome::Failed("quota".into())),
        ];
        assert_eq!(
            describe_attempts(&attempts),
            "Firecrawl failed (quota); HTML fetch failed (HTTP 503)"
        );
    }

    #[test]
    fn social_error_names_every_tier() {
        let attempts = vec![
            AttemptRecord::new(Stage::Bird, AttemptOutcome::Unavailable("not configured".into())),
            AttemptRecord::new(Stage::Nitter, AttemptOutcome::Blocked),
            AttemptRecord::new(Stage::Html, AttemptOutcome::Blocked),
        ];
        let message = social_blocked("https://x.com/a/status/1", &attempts).to_string();
        assert!(message.contains("Bird reader unavailable (not configured)"));
        assert!(message.contains("Nitter mirror blocked"));
        assert!(message.contains("HTML fetch blocked"));
    }

    #[test]
    fn transcription_error_mentions_both_keys() {
        let message = LinkError::TranscriptionUnavailable { platform: "Spotify" }.to_string();
        assert!(message.contains("OPENAI_API_KEY"));
        assert!(message.contains("FAL_KEY"));
    }
}

//! Contract with the external transcript resolver.
//!
//! The pipeline only decides *when* to call the resolver and how to merge
//! what it returns; how a transcript is produced is not its concern.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::TranscriptionKeys;
use crate::error::CapabilityError;
use crate::models::{
    AttemptOutcome, AttemptRecord, CacheMode, Stage, TranscriptDiagnostics, YoutubeTranscriptMode,
};
use crate::normalize::{char_len, normalize_for_prompt, word_count};
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptOptions {
    pub youtube_transcript_mode: YoutubeTranscriptMode,
    pub cache_mode: CacheMode,
    pub timeout_ms: u64,
    pub keys: TranscriptionKeys,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptResolution {
    pub text: Option<String>,
    pub source: Option<String>,
    pub provider: Option<String>,
    pub segments: Vec<TranscriptSegment>,
    pub media_duration_seconds: Option<f64>,
    pub diagnostics: TranscriptDiagnostics,
}

/// Resolves spoken-word text for a page. `html` is `None` when the page was not fetched.
#[async_trait]
pub trait TranscriptResolver: Send + Sync {
    async fn resolve(
        &self,
        url: &str,
        html: Option<&str>,
        options: TranscriptOptions,
    ) -> Result<TranscriptResolution, CapabilityError>;
}

/// Resolver that never finds a transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscriptResolver;

#[async_trait]
impl TranscriptResolver for NoTranscriptResolver {
    async fn resolve(
        &self,
        _url: &str,
        _html: Option<&str>,
        _options: TranscriptOptions,
    ) -> Result<TranscriptResolution, CapabilityError> {
        Ok(TranscriptResolution {
            diagnostics: TranscriptDiagnostics {
                notes: Some("No transcript resolver configured".to_string()),
                ..TranscriptDiagnostics::default()
            },
            ..TranscriptResolution::default()
        })
    }
}

/// Stamp the effective cache mode onto the resolver's diagnostics when it left it unset.
pub fn ensure_transcript_diagnostics(
    mut resolution: TranscriptResolution,
    cache_mode: CacheMode,
) -> TranscriptResolution {
    if resolution.diagnostics.cache_mode.is_none() {
        resolution.diagnostics.cache_mode = Some(cache_mode);
    }
    resolution
}

/// Call the resolver, normalizing its text and folding failures into diagnostics.
pub async fn resolve_transcript(
    resolver: &dyn TranscriptResolver,
    url: &str,
    html: Option<&str>,
    options: TranscriptOptions,
    progress: &ProgressSink,
    attempts: &mut Vec<AttemptRecord>,
) -> TranscriptResolution {
    progress.emit(ProgressEvent::TranscriptStart {
        url: url.to_string(),
    });

    let timeout = Duration::from_millis(options.timeout_ms);
    let result = match tokio::time::timeout(timeout, resolver.resolve(url, html, options)).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            after_ms: options.timeout_ms,
        }),
    };

    let resolution = match result {
        Ok(mut resolution) => {
            resolution.text = resolution
                .text
                .map(|t| normalize_for_prompt(&t))
                .filter(|t| !t.is_empty());
            resolution
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "transcript resolution failed");
            TranscriptResolution {
                diagnostics: TranscriptDiagnostics {
                    notes: Some(format!("Transcript resolution failed: {}", e)),
                    ..TranscriptDiagnostics::default()
                },
                ..TranscriptResolution::default()
            }
        }
    };

    let outcome = if resolution.text.is_some() {
        AttemptOutcome::Ok
    } else {
        match &resolution.diagnostics.notes {
            Some(note) => AttemptOutcome::Failed(note.clone()),
            None => AttemptOutcome::Empty,
        }
    };
    attempts.push(AttemptRecord::new(Stage::Transcript, outcome));

    progress.emit(ProgressEvent::TranscriptDone {
        url: url.to_string(),
        ok: resolution.text.is_some(),
        source: resolution.source.clone(),
    });

    ensure_transcript_diagnostics(resolution, options.cache_mode)
}

// ── Derived transcript fields ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptStats {
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
}

pub fn transcript_stats(text: &str) -> TranscriptStats {
    TranscriptStats {
        characters: char_len(text),
        words: word_count(text),
        lines: text.lines().filter(|l| !l.trim().is_empty()).count(),
    }
}

fn format_timestamp(ms: u64) -> String {
    let total = ms / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// `[mm:ss] text` lines, or `None` when the resolver gave no timing.
pub fn format_timed_text(segments: &[TranscriptSegment]) -> Option<String> {
    let lines: Vec<String> = segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| format!("[{}] {}", format_timestamp(s.start_ms), s.text.trim()))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TranscriptOptions {
        TranscriptOptions {
            youtube_transcript_mode: YoutubeTranscriptMode::Auto,
            cache_mode: CacheMode::Bypass,
            timeout_ms: 1_000,
            keys: TranscriptionKeys::default(),
        }
    }

    #[test]
    fn stamps_cache_mode_only_when_missing() {
        let stamped = ensure_transcript_diagnostics(TranscriptResolution::default(), CacheMode::Bypass);
        assert_eq!(stamped.diagnostics.cache_mode, Some(CacheMode::Bypass));

        let mut preset = TranscriptResolution::default();
        preset.diagnostics.cache_mode = Some(CacheMode::Default);
        let kept = ensure_transcript_diagnostics(preset, CacheMode::Bypass);
        assert_eq!(kept.diagnostics.cache_mode, Some(CacheMode::Default));
    }

    #[test]
    fn formats_timed_text() {
        let segments = vec![
            TranscriptSegment { start_ms: 0, text: "Hello".into() },
            TranscriptSegment { start_ms: 65_000, text: " there ".into() },
            TranscriptSegment { start_ms: 3_725_000, text: "late".into() },
        ];
        assert_eq!(
            format_timed_text(&segments).as_deref(),
            Some("[00:00] Hello\n[01:05] there\n[1:02:05] late")
        );
        assert_eq!(format_timed_text(&[]), None);
    }

    #[test]
    fn computes_stats() {
        let stats = transcript_stats("one two\n\nthree");
        assert_eq!(stats, TranscriptStats { characters: 14, words: 3, lines: 2 });
    }

    #[tokio::test]
    async fn null_resolver_records_note_and_cache_mode() {
        let mut attempts = Vec::new();
        let resolution = resolve_transcript(
            &NoTranscriptResolver,
            "https://example.com",
            None,
            options(),
            &ProgressSink::none(),
            &mut attempts,
        )
        .await;
        assert!(resolution.text.is_none());
        assert_eq!(resolution.diagnostics.cache_mode, Some(CacheMode::Bypass));
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed(_)));
    }

    struct SlowResolver;

    #[async_trait]
    impl TranscriptResolver for SlowResolver {
        async fn resolve(
            &self,
            _url: &str,
            _html: Option<&str>,
            _options: TranscriptOptions,
        ) -> Result<TranscriptResolution, CapabilityError> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(TranscriptResolution {
                text: Some("too late".into()),
                ..TranscriptResolution::default()
            })
        }
    }

    #[tokio::test]
    async fn slow_resolver_is_cut_off_at_the_timeout() {
        let mut attempts = Vec::new();
        let started = std::time::Instant::now();
        let resolution = resolve_transcript(
            &SlowResolver,
            "https://example.com/episode",
            None,
            TranscriptOptions {
                timeout_ms: 100,
                ..options()
            },
            &ProgressSink::none(),
            &mut attempts,
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(resolution.text.is_none());
        let notes = resolution.diagnostics.notes.unwrap_or_default();
        assert!(notes.contains("100"), "{notes}");
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed(_)));
    }
}

use serde::{Deserialize, Serialize};

use crate::config::thresholds;

// ── Request side ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
    #[serde(default)]
    pub options: FetchOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Default,
    Bypass,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirecrawlMode {
    Off,
    #[default]
    Auto,
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    #[default]
    Text,
    Markdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkdownMode {
    #[default]
    Auto,
    Llm,
    Readability,
}

/// Passed through untouched to the transcript resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YoutubeTranscriptMode {
    #[default]
    Auto,
    Web,
    YtDlp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchOptions {
    pub timeout_ms: u64,
    pub cache_mode: CacheMode,
    pub max_characters: Option<usize>,
    pub youtube_transcript: YoutubeTranscriptMode,
    pub firecrawl_mode: FirecrawlMode,
    pub format: ContentFormat,
    pub markdown_mode: MarkdownMode,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_ms: thresholds::DEFAULT_TIMEOUT_MS,
            cache_mode: CacheMode::default(),
            max_characters: None,
            youtube_transcript: YoutubeTranscriptMode::default(),
            firecrawl_mode: FirecrawlMode::default(),
            format: ContentFormat::default(),
            markdown_mode: MarkdownMode::default(),
        }
    }
}

// ── Attempt ledger ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Html,
    Firecrawl,
    Bird,
    Nitter,
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AttemptOutcome {
    Ok,
    /// The capability is not configured or not allowed for this URL.
    Unavailable(String),
    Failed(String),
    Empty,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    pub fn new(stage: Stage, outcome: AttemptOutcome) -> Self {
        Self { stage, outcome }
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Html,
    Firecrawl,
    Bird,
    Nitter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirecrawlDiagnostics {
    pub attempted: bool,
    pub used: bool,
    pub cache_mode: CacheMode,
    pub cache_status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkdownProvider {
    Firecrawl,
    Llm,
    Readability,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownDiagnostics {
    pub requested: bool,
    pub used: bool,
    pub provider: Option<MarkdownProvider>,
    pub notes: Option<String>,
}

/// Owned by the transcript resolver; the pipeline only stamps `cache_mode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptDiagnostics {
    pub cache_mode: Option<CacheMode>,
    pub cache_status: Option<String>,
    pub provider: Option<String>,
    pub attempted_providers: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDiagnostics {
    pub strategy: Strategy,
    pub firecrawl: FirecrawlDiagnostics,
    pub markdown: MarkdownDiagnostics,
    pub transcript: TranscriptDiagnostics,
    pub attempts: Vec<AttemptRecord>,
}

// ── Output record ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLinkContent {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub content: String,
    pub truncated: bool,
    pub total_characters: usize,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_characters: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_timed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_duration_seconds: Option<f64>,
    pub diagnostics: ContentDiagnostics,
}

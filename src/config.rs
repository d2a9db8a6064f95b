use once_cell::sync::Lazy;
use regex::Regex;

// ── Thresholds ───────────────────────────────────────────────────────────────

/// Tunable heuristics used by the fallback gate and content selection.
///
/// All lengths are measured in characters of *normalized* text, except
/// `MIN_DOCUMENT_LEN_FOR_FALLBACK` which is measured on the raw HTML.
pub mod thresholds {
    /// Below this, extracted body text is considered thin.
    pub const MIN_CONTENT_CHARS: usize = 200;
    /// Readability output must reach this before it can replace the plain text.
    pub const MIN_READABILITY_CHARS: usize = 200;
    /// A metadata description shorter than this is never preferred over body text.
    pub const MIN_DESCRIPTION_CHARS: usize = 120;
    /// "At least comparably substantial" ratio between two candidates.
    pub const COMPARABLE_RATIO: f64 = 0.6;
    /// Raw HTML at or above this size with thin text looks like an app shell.
    pub const MIN_DOCUMENT_LEN_FOR_FALLBACK: usize = 5_000;
    /// Per-stage timeout when the caller gives none.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
}

// ── Social platform ──────────────────────────────────────────────────────────

pub const NITTER_HOST: &str = "nitter.net";

pub const SOCIAL_HOSTS: &[&str] = &[
    "x.com",
    "www.x.com",
    "mobile.x.com",
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
];

// ── Block detection patterns ─────────────────────────────────────────────────

/// Matched against a page's visible text to detect bot walls.
pub static BLOCKED_HTML_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(access denied|attention required|captcha|enable javascript|enable cookies|verify you are human|are you a robot|unusual traffic|please turn javascript on|just a moment\.\.\.|checking your browser)",
    )
    .unwrap()
});

/// Matched against extracted social-post content to detect an interstitial.
pub static SOCIAL_BLOCKED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(something went wrong|privacy related extensions|please disable them and try again|javascript is not available|enable javascript|rate limit exceeded|log in to x|sign in to x)",
    )
    .unwrap()
});

// ── Environment settings ─────────────────────────────────────────────────────

/// Process-wide settings read once at startup.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub bind_addr: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub fal_key: Option<String>,
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_base_url: String,
    pub bird_bin: Option<String>,
    pub deadline_ms: Option<u64>,
    pub insecure_ssl: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            bind_addr: get("LINK_CONTENT_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            fal_key: get("FAL_KEY"),
            firecrawl_api_key: get("FIRECRAWL_API_KEY"),
            firecrawl_base_url: get("FIRECRAWL_BASE_URL")
                .unwrap_or_else(|| "https://api.firecrawl.dev/v1".to_string()),
            bird_bin: get("BIRD_BIN"),
            deadline_ms: get("LINK_CONTENT_DEADLINE_MS").and_then(|v| v.parse().ok()),
            insecure_ssl: get("LINK_CONTENT_INSECURE_SSL").as_deref() == Some("1"),
        }
    }

    pub fn transcription_keys(&self) -> TranscriptionKeys {
        TranscriptionKeys {
            openai: self.openai_api_key.is_some(),
            fal: self.fal_key.is_some(),
        }
    }
}

/// Which speech-to-text backends the transcript resolver can reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscriptionKeys {
    pub openai: bool,
    pub fal: bool,
}

impl TranscriptionKeys {
    pub fn any(&self) -> bool {
        self.openai || self.fal
    }
}

//! Firecrawl scraping-service adapter.
//!
//! Used as a paid fallback for pages the direct fetch cannot handle: bot
//! walls, and large SPA shells whose server-rendered text is thin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::article::extract_article_text;
use crate::config::thresholds::{MIN_CONTENT_CHARS, MIN_DOCUMENT_LEN_FOR_FALLBACK};
use crate::config::BLOCKED_HTML_HINT_RE;
use crate::dom::visible_text;
use crate::error::CapabilityError;
use crate::models::{
    AttemptOutcome, AttemptRecord, CacheMode, FirecrawlDiagnostics, FirecrawlMode, Stage,
};
use crate::normalize::{char_len, normalize_for_prompt};
use crate::progress::{ProgressEvent, ProgressSink};

/// What a scrape returned: markdown plus, when available, raw HTML and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FirecrawlPayload {
    pub markdown: String,
    pub html: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub cache_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    pub timeout_ms: u64,
    pub cache_mode: CacheMode,
}

/// Server-side render-and-scrape capability. `Ok(None)` means "nothing usable".
#[async_trait]
pub trait FirecrawlScraper: Send + Sync {
    async fn scrape(
        &self,
        url: &str,
        options: ScrapeOptions,
    ) -> Result<Option<FirecrawlPayload>, CapabilityError>;
}

// ── Fallback decision ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackDecision {
    /// A bot-wall hint was found in the page text.
    Blocked,
    /// Little extractable text inside a large document: probably an app shell.
    Thin {
        content_chars: usize,
        document_chars: usize,
    },
    Accept,
}

impl FallbackDecision {
    pub fn should_fallback(&self) -> bool {
        !matches!(self, FallbackDecision::Accept)
    }

    pub fn reason(&self) -> String {
        match self {
            FallbackDecision::Blocked => "HTML looks blocked (bot wall hint)".to_string(),
            FallbackDecision::Thin {
                content_chars,
                document_chars,
            } => format!(
                "HTML content too thin ({} chars in a {} char document)",
                content_chars, document_chars
            ),
            FallbackDecision::Accept => "HTML accepted".to_string(),
        }
    }
}

/// Decide whether directly fetched HTML needs the scraping service.
///
/// Small documents with little text are accepted as-is: they are genuinely
/// small pages, and scraping them again would cost money for nothing.
pub fn should_fallback_to_firecrawl(html: &str) -> FallbackDecision {
    let document = Html::parse_document(html);
    if BLOCKED_HTML_HINT_RE.is_match(&visible_text(&document)) {
        return FallbackDecision::Blocked;
    }

    let content_chars = char_len(&extract_article_text(html));
    let document_chars = char_len(html);
    if content_chars < MIN_CONTENT_CHARS && document_chars >= MIN_DOCUMENT_LEN_FOR_FALLBACK {
        return FallbackDecision::Thin {
            content_chars,
            document_chars,
        };
    }
    FallbackDecision::Accept
}

// ── Per-call memoizing gate ──────────────────────────────────────────────────

/// Wraps the optional scraper for one extraction call.
///
/// The service is contacted at most once; later triggers reuse the first
/// outcome and only add their reason to the diagnostics notes.
pub struct FirecrawlGate<'a> {
    scraper: Option<&'a dyn FirecrawlScraper>,
    disabled_reason: Option<&'static str>,
    options: ScrapeOptions,
    outcome: Option<Option<FirecrawlPayload>>,
    reasons: Vec<String>,
    result_note: Option<String>,
    diagnostics: FirecrawlDiagnostics,
}

impl<'a> FirecrawlGate<'a> {
    pub fn new(
        scraper: Option<&'a dyn FirecrawlScraper>,
        mode: FirecrawlMode,
        is_video_url: bool,
        options: ScrapeOptions,
    ) -> Self {
        let disabled_reason = if mode == FirecrawlMode::Off {
            Some("firecrawlMode is off")
        } else if is_video_url {
            Some("not used for video pages")
        } else if scraper.is_none() {
            Some("not configured")
        } else {
            None
        };

        Self {
            scraper,
            disabled_reason,
            options,
            outcome: None,
            reasons: Vec::new(),
            result_note: None,
            diagnostics: FirecrawlDiagnostics {
                cache_mode: options.cache_mode,
                ..FirecrawlDiagnostics::default()
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled_reason.is_none()
    }

    pub fn mark_used(&mut self) {
        self.diagnostics.used = true;
    }

    pub fn diagnostics(&self) -> FirecrawlDiagnostics {
        let mut diagnostics = self.diagnostics.clone();
        let mut notes = self.reasons.clone();
        if let Some(note) = &self.result_note {
            notes.push(note.clone());
        }
        if let Some(disabled) = self.disabled_reason {
            if !notes.is_empty() {
                notes.push(format!("Firecrawl skipped: {}", disabled));
            }
        }
        diagnostics.notes = if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        };
        diagnostics
    }

    /// Scrape `url` once, recording `reason`. Returns a usable payload or `None`.
    pub async fn attempt(
        &mut self,
        url: &str,
        reason: &str,
        progress: &ProgressSink,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Option<FirecrawlPayload> {
        if let Some(outcome) = &self.outcome {
            self.reasons.push(format!("{} (reused earlier attempt)", reason));
            return outcome.clone();
        }

        let scraper = match (self.disabled_reason, self.scraper) {
            (None, Some(scraper)) => scraper,
            (disabled, _) => {
                let why = disabled.unwrap_or("not configured");
                self.reasons.push(reason.to_string());
                self.outcome = Some(None);
                attempts.push(AttemptRecord::new(
                    Stage::Firecrawl,
                    AttemptOutcome::Unavailable(why.to_string()),
                ));
                return None;
            }
        };

        self.reasons.push(reason.to_string());
        self.diagnostics.attempted = true;
        progress.emit(ProgressEvent::FirecrawlStart {
            url: url.to_string(),
            reason: reason.to_string(),
        });
        tracing::info!(url = %url, reason = %reason, "trying Firecrawl");

        let timeout = Duration::from_millis(self.options.timeout_ms);
        let result = match tokio::time::timeout(timeout, scraper.scrape(url, self.options)).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout {
                after_ms: self.options.timeout_ms,
            }),
        };

        let (payload, outcome) = match result {
            Ok(Some(payload)) if !normalize_for_prompt(&payload.markdown).is_empty() => {
                self.diagnostics.cache_status = payload.cache_status.clone();
                self.result_note = None;
                (Some(payload), AttemptOutcome::Ok)
            }
            Ok(_) => {
                self.result_note = Some("Firecrawl returned no content".to_string());
                (None, AttemptOutcome::Empty)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Firecrawl scrape failed");
                self.result_note = Some(format!("Firecrawl failed: {}", e));
                (None, AttemptOutcome::Failed(e.to_string()))
            }
        };

        progress.emit(ProgressEvent::FirecrawlDone {
            url: url.to_string(),
            ok: payload.is_some(),
            markdown_chars: payload.as_ref().map(|p| char_len(&p.markdown)).unwrap_or(0),
        });
        attempts.push(AttemptRecord::new(Stage::Firecrawl, outcome));
        self.outcome = Some(payload.clone());
        payload
    }
}

// ── HTTP client ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 2],
    only_main_content: bool,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_age: Option<u64>,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    html: Option<String>,
    metadata: Option<Map<String, Value>>,
}

/// Client for Firecrawl's `/scrape` endpoint.
#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn into_payload(data: ScrapeData) -> Option<FirecrawlPayload> {
        let markdown = data.markdown.filter(|m| !m.trim().is_empty())?;
        let cache_status = data
            .metadata
            .as_ref()
            .and_then(|m| m.get("cacheState"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(FirecrawlPayload {
            markdown,
            html: data.html.filter(|h| !h.trim().is_empty()),
            metadata: data.metadata,
            cache_status,
        })
    }
}

#[async_trait]
impl FirecrawlScraper for FirecrawlClient {
    async fn scrape(
        &self,
        url: &str,
        options: ScrapeOptions,
    ) -> Result<Option<FirecrawlPayload>, CapabilityError> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown", "html"],
            only_main_content: true,
            timeout: options.timeout_ms,
            max_age: match options.cache_mode {
                CacheMode::Bypass => Some(0),
                CacheMode::Default => None,
            },
        };

        let response = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status, body = %text, "Firecrawl API error");
            return Err(CapabilityError::Status { status });
        }

        let body: ScrapeResponse = response.json().await?;
        if !body.success {
            return Err(CapabilityError::Other(
                body.error
                    .unwrap_or_else(|| "Firecrawl scrape failed".to_string()),
            ));
        }

        Ok(body.data.and_then(Self::into_payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn padded_shell(visible: &str) -> String {
        let bundle = "x".repeat(MIN_DOCUMENT_LEN_FOR_FALLBACK);
        format!(
            "<html><head><script>{}</script></head><body><div id=\"root\">{}</div></body></html>",
            bundle, visible
        )
    }

    #[test]
    fn small_page_is_accepted() {
        let html = "<html><head><title>Example Domain</title></head><body><p>This domain is for use in examples.</p></body></html>";
        assert_eq!(should_fallback_to_firecrawl(html), FallbackDecision::Accept);
    }

    #[test]
    fn large_shell_with_thin_text_falls_back() {
        let decision = should_fallback_to_firecrawl(&padded_shell("Loading"));
        assert!(matches!(decision, FallbackDecision::Thin { content_chars: 7, .. }));
    }

    #[test]
    fn captcha_hint_always_falls_back() {
        let html = "<html><body><p>Please verify you are human to continue.</p></body></html>";
        assert_eq!(should_fallback_to_firecrawl(html), FallbackDecision::Blocked);
    }

    #[test]
    fn large_page_with_real_text_is_accepted() {
        let text = "Plenty of genuine article text. ".repeat(20);
        assert_eq!(
            should_fallback_to_firecrawl(&padded_shell(&text)),
            FallbackDecision::Accept
        );
    }

    struct CountingScraper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FirecrawlScraper for CountingScraper {
        async fn scrape(
            &self,
            _url: &str,
            _options: ScrapeOptions,
        ) -> Result<Option<FirecrawlPayload>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(FirecrawlPayload {
                markdown: "# Scraped".to_string(),
                html: None,
                metadata: None,
                cache_status: Some("miss".to_string()),
            }))
        }
    }

    fn options() -> ScrapeOptions {
        ScrapeOptions {
            timeout_ms: 1_000,
            cache_mode: CacheMode::Default,
        }
    }

    #[tokio::test]
    async fn gate_scrapes_once_and_reuses() {
        let scraper = CountingScraper {
            calls: AtomicUsize::new(0),
        };
        let mut gate = FirecrawlGate::new(
            Some(&scraper as &dyn FirecrawlScraper),
            FirecrawlMode::Auto,
            false,
            options(),
        );
        let mut attempts = Vec::new();
        let sink = ProgressSink::none();

        assert!(gate.attempt("https://a.test", "first", &sink, &mut attempts).await.is_some());
        assert!(gate.attempt("https://a.test", "second", &sink, &mut attempts).await.is_some());

        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.len(), 1);
        let diagnostics = gate.diagnostics();
        assert!(diagnostics.attempted);
        assert_eq!(diagnostics.cache_status.as_deref(), Some("miss"));
        assert_eq!(
            diagnostics.notes.as_deref(),
            Some("first; second (reused earlier attempt)")
        );
    }

    #[tokio::test]
    async fn gate_is_disabled_for_video_urls() {
        let scraper = CountingScraper {
            calls: AtomicUsize::new(0),
        };
        let mut gate = FirecrawlGate::new(
            Some(&scraper as &dyn FirecrawlScraper),
            FirecrawlMode::Always,
            true,
            options(),
        );
        let mut attempts = Vec::new();
        assert!(!gate.is_enabled());
        assert!(gate
            .attempt(
                "https://youtube.com/watch?v=x",
                "forced",
                &ProgressSink::none(),
                &mut attempts
            )
            .await
            .is_none());
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn client_posts_scrape_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://example.com/app",
                "formats": ["markdown", "html"],
                "maxAge": 0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "markdown": "# Rendered",
                    "html": "<h1>Rendered</h1>",
                    "metadata": {"title": "Rendered", "cacheState": "hit"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("fc-test", server.uri());
        let payload = client
            .scrape(
                "https://example.com/app",
                ScrapeOptions {
                    timeout_ms: 5_000,
                    cache_mode: CacheMode::Bypass,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.markdown, "# Rendered");
        assert_eq!(payload.html.as_deref(), Some("<h1>Rendered</h1>"));
        assert_eq!(payload.cache_status.as_deref(), Some("hit"));
    }

    #[tokio::test]
    async fn client_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(402))
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("fc-test", server.uri());
        let result = client.scrape("https://example.com", options()).await;
        assert!(matches!(result, Err(CapabilityError::Status { status: 402 })));
    }
}

//! Entry point: route the URL, run the strategy cascade, finalize the record.

use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use url::Url;

use crate::article::extract_article_text;
use crate::config::TranscriptionKeys;
use crate::error::{
    describe_attempts, exhausted, social_blocked, CapabilityError, LinkError, Result,
};
use crate::fetcher::{fetch_html_document, HtmlFetcher};
use crate::finalize::{finalize_extracted_link_content, FinalizeInput};
use crate::firecrawl::{
    should_fallback_to_firecrawl, FallbackDecision, FirecrawlGate, FirecrawlPayload,
    FirecrawlScraper, ScrapeOptions,
};
use crate::markdown::{convert_to_markdown, MarkdownConverter, MarkdownInput};
use crate::metadata::{
    extract_html_metadata, extract_json_ld, extract_scraped_metadata,
    extract_youtube_short_description, first_heading, merge_metadata, JsonLdMetadata,
    PageMetadata,
};
use crate::models::{
    AttemptOutcome, AttemptRecord, ContentFormat, ExtractedLinkContent, FetchOptions,
    FirecrawlDiagnostics, FirecrawlMode, MarkdownDiagnostics, MarkdownProvider, Stage, Strategy,
};
use crate::normalize::normalize_for_prompt;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::readability::{extract_readability, ReadabilityResult};
use crate::router::{is_podcast_host, is_youtube_url, Route};
use crate::selection::{select_content, Candidates, ContentSource, Selection};
use crate::social::{author_title, is_blocked_social_content, to_nitter_url, TweetReader};
use crate::transcript::{
    ensure_transcript_diagnostics, resolve_transcript, TranscriptOptions, TranscriptResolution,
    TranscriptResolver,
};

const PODCAST_HTML_SKIPPED: &str = "HTML fetch skipped: podcast directory pages are CAPTCHA walls";

/// Capabilities an extraction call may use. Only the fetcher and the
/// transcript resolver are required.
#[derive(Clone)]
pub struct LinkDeps {
    pub fetcher: Arc<dyn HtmlFetcher>,
    pub firecrawl: Option<Arc<dyn FirecrawlScraper>>,
    pub markdown: Option<Arc<dyn MarkdownConverter>>,
    pub tweet_reader: Option<Arc<dyn TweetReader>>,
    pub transcripts: Arc<dyn TranscriptResolver>,
    pub keys: TranscriptionKeys,
    pub progress: ProgressSink,
}

impl LinkDeps {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>, transcripts: Arc<dyn TranscriptResolver>) -> Self {
        Self {
            fetcher,
            firecrawl: None,
            markdown: None,
            tweet_reader: None,
            transcripts,
            keys: TranscriptionKeys::default(),
            progress: ProgressSink::none(),
        }
    }

    pub fn with_firecrawl(mut self, scraper: Arc<dyn FirecrawlScraper>) -> Self {
        self.firecrawl = Some(scraper);
        self
    }

    pub fn with_markdown(mut self, converter: Arc<dyn MarkdownConverter>) -> Self {
        self.markdown = Some(converter);
        self
    }

    pub fn with_tweet_reader(mut self, reader: Arc<dyn TweetReader>) -> Self {
        self.tweet_reader = Some(reader);
        self
    }

    pub fn with_keys(mut self, keys: TranscriptionKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }
}

impl std::fmt::Debug for LinkDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkDeps")
            .field("firecrawl", &self.firecrawl.is_some())
            .field("markdown", &self.markdown.is_some())
            .field("tweet_reader", &self.tweet_reader.is_some())
            .field("keys", &self.keys)
            .field("progress", &self.progress)
            .finish()
    }
}

/// Per-call context shared by every stage.
struct Call<'a> {
    url: &'a str,
    route: Route,
    options: &'a FetchOptions,
    deps: &'a LinkDeps,
}

impl Call<'_> {
    /// Any page on the video platform, not only resolved video ids.
    fn is_video_platform(&self) -> bool {
        self.route.is_video() || is_youtube_url(self.url)
    }

    fn progress(&self) -> &ProgressSink {
        &self.deps.progress
    }

    fn transcript_options(&self) -> TranscriptOptions {
        TranscriptOptions {
            youtube_transcript_mode: self.options.youtube_transcript,
            cache_mode: self.options.cache_mode,
            timeout_ms: self.options.timeout_ms,
            keys: self.deps.keys,
        }
    }

    fn idle_firecrawl(&self) -> FirecrawlDiagnostics {
        FirecrawlDiagnostics {
            cache_mode: self.options.cache_mode,
            ..FirecrawlDiagnostics::default()
        }
    }

    fn idle_transcript(&self) -> TranscriptResolution {
        ensure_transcript_diagnostics(TranscriptResolution::default(), self.options.cache_mode)
    }

    fn idle_markdown(&self, note: &str) -> MarkdownDiagnostics {
        let requested = self.options.format == ContentFormat::Markdown;
        MarkdownDiagnostics {
            requested,
            notes: requested.then(|| note.to_string()),
            ..MarkdownDiagnostics::default()
        }
    }
}

/// Extract LLM-ready content for `url`.
///
/// Per-stage failures only move the cascade on to the next strategy; an
/// error is returned once every strategy for the URL class is exhausted.
pub async fn fetch_link_content(
    url: &str,
    options: &FetchOptions,
    deps: &LinkDeps,
) -> Result<ExtractedLinkContent> {
    let url = validate_url(url)?;
    let call = Call {
        url: &url,
        route: Route::resolve(&url),
        options,
        deps,
    };
    tracing::debug!(url = %url, route = ?call.route, "resolved route");

    let record = match &call.route {
        Route::SpotifyEpisode { .. } | Route::ApplePodcast { .. } => extract_podcast(&call).await?,
        Route::SocialStatus { .. } => extract_social(&call).await?,
        Route::YouTube { .. } | Route::Generic => extract_generic(&call, Vec::new()).await?,
    };

    tracing::info!(
        url = %url,
        strategy = ?record.diagnostics.strategy,
        characters = record.total_characters,
        truncated = record.truncated,
        "extracted link content"
    );
    Ok(record)
}

fn validate_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let parsed =
        Url::parse(trimmed).map_err(|_| LinkError::InvalidUrl(format!("Invalid URL: {}", trimmed)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(LinkError::InvalidUrl(format!(
                "Only http and https URLs are supported (got {})",
                other
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(LinkError::InvalidUrl(format!("URL has no host: {}", trimmed)));
    }
    Ok(trimmed.to_string())
}

// ── Podcast directories ──────────────────────────────────────────────────────

async fn extract_podcast(call: &Call<'_>) -> Result<ExtractedLinkContent> {
    let platform = call.route.podcast_platform().unwrap_or("Podcast");
    if !call.deps.keys.any() {
        return Err(LinkError::TranscriptionUnavailable { platform });
    }

    let mut attempts = vec![AttemptRecord::new(
        Stage::Html,
        AttemptOutcome::Unavailable("skipped for podcast directory pages".to_string()),
    )];
    let transcript = resolve_transcript(
        call.deps.transcripts.as_ref(),
        call.url,
        None,
        call.transcript_options(),
        call.progress(),
        &mut attempts,
    )
    .await;

    let Some(text) = transcript.text.clone() else {
        return Err(LinkError::TranscriptUnavailable {
            platform,
            detail: describe_attempts(&attempts),
        });
    };

    Ok(finalize_extracted_link_content(FinalizeInput {
        url: call.url.to_string(),
        base_content: text,
        max_characters: call.options.max_characters,
        metadata: PageMetadata::default(),
        transcript,
        strategy: Strategy::Html,
        firecrawl: FirecrawlDiagnostics {
            notes: Some(PODCAST_HTML_SKIPPED.to_string()),
            ..call.idle_firecrawl()
        },
        markdown: call.idle_markdown(PODCAST_HTML_SKIPPED),
        attempts,
    }))
}

// ── Social posts ─────────────────────────────────────────────────────────────

async fn extract_social(call: &Call<'_>) -> Result<ExtractedLinkContent> {
    let mut attempts = Vec::new();

    if let Some(record) = try_bird(call, &mut attempts).await {
        return Ok(record);
    }
    if let Some(record) = try_nitter(call, &mut attempts).await {
        return Ok(record);
    }

    let record = extract_generic(call, attempts).await?;
    if !is_blocked_social_content(&record.content) {
        return Ok(record);
    }

    let mut attempts = record.diagnostics.attempts;
    attempts.push(AttemptRecord::new(Stage::Html, AttemptOutcome::Blocked));
    tracing::warn!(url = %call.url, "post blocked at every tier");
    Err(social_blocked(call.url, &attempts))
}

async fn try_bird(
    call: &Call<'_>,
    attempts: &mut Vec<AttemptRecord>,
) -> Option<ExtractedLinkContent> {
    let Some(reader) = call.deps.tweet_reader.as_deref() else {
        attempts.push(AttemptRecord::new(
            Stage::Bird,
            AttemptOutcome::Unavailable("not configured".to_string()),
        ));
        return None;
    };

    call.progress().emit(ProgressEvent::BirdStart {
        url: call.url.to_string(),
    });
    let timeout_ms = call.options.timeout_ms;
    let result = match tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        reader.read_tweet(call.url, timeout_ms),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout { after_ms: timeout_ms }),
    };

    let tweet = match result {
        Ok(Some(tweet)) if !normalize_for_prompt(&tweet.text).is_empty() => Some(tweet),
        Ok(_) => {
            attempts.push(AttemptRecord::new(Stage::Bird, AttemptOutcome::Empty));
            None
        }
        Err(e) => {
            tracing::warn!(url = %call.url, error = %e, "Bird reader failed");
            attempts.push(AttemptRecord::new(
                Stage::Bird,
                AttemptOutcome::Failed(e.to_string()),
            ));
            None
        }
    };
    call.progress().emit(ProgressEvent::BirdDone {
        url: call.url.to_string(),
        ok: tweet.is_some(),
    });

    let tweet = tweet?;
    attempts.push(AttemptRecord::new(Stage::Bird, AttemptOutcome::Ok));
    Some(finalize_extracted_link_content(FinalizeInput {
        url: call.url.to_string(),
        base_content: tweet.text,
        max_characters: call.options.max_characters,
        metadata: PageMetadata {
            title: author_title(tweet.author.as_deref()),
            ..PageMetadata::default()
        },
        transcript: call.idle_transcript(),
        strategy: Strategy::Bird,
        firecrawl: call.idle_firecrawl(),
        markdown: call.idle_markdown("Bird returns plain text"),
        attempts: attempts.clone(),
    }))
}

async fn try_nitter(
    call: &Call<'_>,
    attempts: &mut Vec<AttemptRecord>,
) -> Option<ExtractedLinkContent> {
    let Some(mirror_url) = to_nitter_url(call.url) else {
        attempts.push(AttemptRecord::new(
            Stage::Nitter,
            AttemptOutcome::Unavailable("no mirror URL for this host".to_string()),
        ));
        return None;
    };

    call.progress().emit(ProgressEvent::NitterStart {
        url: mirror_url.clone(),
    });
    let fetched = fetch_html_document(
        call.deps.fetcher.as_ref(),
        &mirror_url,
        call.options.timeout_ms,
        call.progress(),
    )
    .await;

    let outcome = match fetched {
        Ok(html) => {
            let page = analyze_page(&html, &mirror_url, false);
            let metadata = page.metadata(None);
            let selection = page.select(&metadata, None, None, false);
            if selection.content.is_empty() {
                Err(AttemptOutcome::Empty)
            } else if is_blocked_social_content(&selection.content) {
                Err(AttemptOutcome::Blocked)
            } else {
                Ok((metadata, selection))
            }
        }
        Err(e) => Err(AttemptOutcome::Failed(e.to_string())),
    };
    call.progress().emit(ProgressEvent::NitterDone {
        url: mirror_url,
        ok: outcome.is_ok(),
    });

    match outcome {
        Ok((metadata, selection)) => {
            attempts.push(AttemptRecord::new(Stage::Nitter, AttemptOutcome::Ok));
            Some(finalize_extracted_link_content(FinalizeInput {
                url: call.url.to_string(),
                base_content: selection.content,
                max_characters: call.options.max_characters,
                metadata,
                transcript: call.idle_transcript(),
                strategy: Strategy::Nitter,
                firecrawl: call.idle_firecrawl(),
                markdown: call.idle_markdown("Markdown is not produced for mirror pages"),
                attempts: attempts.clone(),
            }))
        }
        Err(outcome) => {
            tracing::debug!(url = %call.url, ?outcome, "Nitter mirror unusable");
            attempts.push(AttemptRecord::new(Stage::Nitter, outcome));
            None
        }
    }
}

// ── Generic pages ────────────────────────────────────────────────────────────

async fn extract_generic(
    call: &Call<'_>,
    mut attempts: Vec<AttemptRecord>,
) -> Result<ExtractedLinkContent> {
    let options = call.options;
    let mut gate = FirecrawlGate::new(
        call.deps.firecrawl.as_deref(),
        options.firecrawl_mode,
        call.is_video_platform(),
        ScrapeOptions {
            timeout_ms: options.timeout_ms,
            cache_mode: options.cache_mode,
        },
    );
    tracing::debug!(url = %call.url, firecrawl = gate.is_enabled(), "running generic pipeline");

    if options.firecrawl_mode == FirecrawlMode::Always {
        let scraped = gate
            .attempt(call.url, "firecrawlMode is always", call.progress(), &mut attempts)
            .await;
        if let Some(payload) = scraped {
            return Ok(build_from_firecrawl(call, payload, None, gate, attempts).await);
        }
    }

    let html = match fetch_html_document(
        call.deps.fetcher.as_ref(),
        call.url,
        options.timeout_ms,
        call.progress(),
    )
    .await
    {
        Ok(html) => html,
        Err(e) => {
            attempts.push(AttemptRecord::new(
                Stage::Html,
                AttemptOutcome::Failed(e.to_string()),
            ));
            let reason = format!("HTML fetch failed: {}", e);
            let scraped = gate
                .attempt(call.url, &reason, call.progress(), &mut attempts)
                .await;
            return match scraped {
                Some(payload) => Ok(build_from_firecrawl(call, payload, None, gate, attempts).await),
                None => Err(exhausted(call.url, &attempts)),
            };
        }
    };

    let decision = should_fallback_to_firecrawl(&html);
    // Thin pages are still used when nothing better arrives; the gate notes
    // carry the reason.
    let outcome = match &decision {
        FallbackDecision::Blocked => AttemptOutcome::Blocked,
        FallbackDecision::Accept | FallbackDecision::Thin { .. } => AttemptOutcome::Ok,
    };
    attempts.push(AttemptRecord::new(Stage::Html, outcome));

    if decision.should_fallback() {
        let reason = decision.reason();
        call.progress().emit(ProgressEvent::FetchHtmlBlocked {
            url: call.url.to_string(),
            reason: reason.clone(),
        });
        let scraped = gate
            .attempt(call.url, &reason, call.progress(), &mut attempts)
            .await;
        if let Some(payload) = scraped {
            return Ok(build_from_firecrawl(call, payload, Some(&html), gate, attempts).await);
        }
    }

    Ok(build_from_html(call, &html, gate, attempts).await)
}

/// Everything the parsed page yields, extracted up front so no DOM is held
/// across an await point.
struct PageAnalysis {
    json_ld: JsonLdMetadata,
    meta_tags: PageMetadata,
    heading: Option<String>,
    article_text: String,
    readability: Option<ReadabilityResult>,
    youtube_short_description: Option<String>,
}

fn analyze_page(html: &str, url: &str, is_youtube: bool) -> PageAnalysis {
    let (json_ld, meta_tags, heading) = {
        let document = Html::parse_document(html);
        (
            extract_json_ld(&document),
            extract_html_metadata(&document),
            first_heading(&document),
        )
    };

    PageAnalysis {
        json_ld,
        meta_tags,
        heading,
        article_text: normalize_for_prompt(&extract_article_text(html)),
        readability: extract_readability(html, url),
        youtube_short_description: if is_youtube {
            extract_youtube_short_description(html).map(|d| normalize_for_prompt(&d))
        } else {
            None
        },
    }
}

impl PageAnalysis {
    fn empty() -> Self {
        PageAnalysis {
            json_ld: JsonLdMetadata::default(),
            meta_tags: PageMetadata::default(),
            heading: None,
            article_text: String::new(),
            readability: None,
            youtube_short_description: None,
        }
    }

    fn metadata(&self, scraped: Option<&PageMetadata>) -> PageMetadata {
        let mut merged = merge_metadata(&self.json_ld.metadata, scraped, &self.meta_tags);
        if merged.title.is_none() {
            merged.title = self.heading.clone();
        }
        merged
    }

    fn select(
        &self,
        metadata: &PageMetadata,
        markdown: Option<&str>,
        transcript: Option<&str>,
        podcast_host: bool,
    ) -> Selection {
        let description = metadata.description.as_deref().map(normalize_for_prompt);
        let candidates = Candidates {
            article_text: &self.article_text,
            readability_text: self.readability.as_ref().map(|r| r.text.as_str()),
            markdown,
            description: description.as_deref(),
            youtube_short_description: self.youtube_short_description.as_deref(),
            podcast_like: self.json_ld.podcast_like || podcast_host,
            is_youtube: self.youtube_short_description.is_some(),
            title: metadata.title.as_deref(),
        };
        select_content(&candidates, transcript)
    }
}

async fn build_from_html(
    call: &Call<'_>,
    html: &str,
    gate: FirecrawlGate<'_>,
    mut attempts: Vec<AttemptRecord>,
) -> ExtractedLinkContent {
    let page = analyze_page(html, call.url, call.route.is_video());
    let metadata = page.metadata(None);

    let transcript = resolve_transcript(
        call.deps.transcripts.as_ref(),
        call.url,
        Some(html),
        call.transcript_options(),
        call.progress(),
        &mut attempts,
    )
    .await;

    let selection = page.select(
        &metadata,
        None,
        transcript.text.as_deref(),
        is_podcast_host(call.url),
    );

    let (base_content, markdown) = if call.options.format != ContentFormat::Markdown {
        (selection.content, MarkdownDiagnostics::default())
    } else if selection.source == ContentSource::Transcript {
        (
            selection.content,
            call.idle_markdown("Skipped: transcript selected as content"),
        )
    } else {
        let (converted, diagnostics) = convert_to_markdown(
            call.deps.markdown.as_deref(),
            call.options.markdown_mode,
            MarkdownInput {
                url: call.url,
                html,
                readability_html: page.readability.as_ref().map(|r| r.html.as_str()),
                title: metadata.title.as_deref(),
                site_name: metadata.site_name.as_deref(),
                timeout_ms: call.options.timeout_ms,
                is_video_url: call.is_video_platform(),
            },
            call.progress(),
        )
        .await;
        (converted.unwrap_or(selection.content), diagnostics)
    };

    finalize_extracted_link_content(FinalizeInput {
        url: call.url.to_string(),
        base_content,
        max_characters: call.options.max_characters,
        metadata,
        transcript,
        strategy: Strategy::Html,
        firecrawl: gate.diagnostics(),
        markdown,
        attempts,
    })
}

async fn build_from_firecrawl(
    call: &Call<'_>,
    payload: FirecrawlPayload,
    fetched_html: Option<&str>,
    mut gate: FirecrawlGate<'_>,
    mut attempts: Vec<AttemptRecord>,
) -> ExtractedLinkContent {
    gate.mark_used();
    let html = payload.html.as_deref().or(fetched_html);
    let page = html
        .map(|h| analyze_page(h, call.url, false))
        .unwrap_or_else(PageAnalysis::empty);
    let scraped = payload.metadata.as_ref().map(extract_scraped_metadata);
    let metadata = page.metadata(scraped.as_ref());
    let markdown_text = normalize_for_prompt(&payload.markdown);

    let transcript = resolve_transcript(
        call.deps.transcripts.as_ref(),
        call.url,
        html,
        call.transcript_options(),
        call.progress(),
        &mut attempts,
    )
    .await;

    let selection = page.select(
        &metadata,
        Some(&markdown_text),
        transcript.text.as_deref(),
        is_podcast_host(call.url),
    );

    let markdown = if call.options.format == ContentFormat::Markdown {
        let used = selection.source == ContentSource::Markdown;
        MarkdownDiagnostics {
            requested: true,
            used,
            provider: used.then_some(MarkdownProvider::Firecrawl),
            notes: (!used).then(|| "Scraped markdown was not selected".to_string()),
        }
    } else {
        MarkdownDiagnostics::default()
    };

    finalize_extracted_link_content(FinalizeInput {
        url: call.url.to_string(),
        base_content: selection.content,
        max_characters: call.options.max_characters,
        metadata,
        transcript,
        strategy: Strategy::Firecrawl,
        firecrawl: gate.diagnostics(),
        markdown,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_urls() {
        assert_eq!(
            validate_url("  https://example.com/a ").unwrap(),
            "https://example.com/a"
        );
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(LinkError::InvalidUrl(_))
        ));
        assert!(matches!(validate_url("not a url"), Err(LinkError::InvalidUrl(_))));
    }

    #[test]
    fn analysis_falls_back_to_heading_for_title() {
        let page = analyze_page(
            "<html><body><h1>Only Heading</h1><p>Body text.</p></body></html>",
            "https://example.com/",
            false,
        );
        assert_eq!(page.metadata(None).title.as_deref(), Some("Only Heading"));
        assert!(page.youtube_short_description.is_none());
    }

    #[test]
    fn scraped_metadata_sits_between_json_ld_and_meta_tags() {
        let page = analyze_page(
            r#"<html><head><meta property="og:title" content="Meta"><meta name="description" content="Meta description"></head></html>"#,
            "https://example.com/",
            false,
        );
        let scraped = PageMetadata {
            title: Some("Scraped".into()),
            ..PageMetadata::default()
        };
        let merged = page.metadata(Some(&scraped));
        assert_eq!(merged.title.as_deref(), Some("Scraped"));
        assert_eq!(merged.description.as_deref(), Some("Meta description"));
    }
}

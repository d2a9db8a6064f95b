//! HTML → Markdown conversion.
//!
//! Two providers: an LLM behind an OpenAI-compatible `chat/completions`
//! endpoint, and a local DOM walker over the readability fragment.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::{collect_text, find_first_tag, normalize_text, HIDDEN_TAGS};
use crate::error::CapabilityError;
use crate::models::{MarkdownDiagnostics, MarkdownMode, MarkdownProvider};
use crate::normalize::normalize_for_prompt;
use crate::progress::{ProgressEvent, ProgressSink};

static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

const MAX_LLM_INPUT_CHARS: usize = 200_000;

const SYSTEM_PROMPT: &str = "You convert HTML documents into clean GitHub-flavored Markdown. \
Keep the main content only: headings, paragraphs, lists, links, quotes, code and tables. \
Drop navigation, ads, cookie banners and footers. Do not summarize or add commentary. \
Reply with Markdown only.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownRequest {
    pub url: String,
    pub html: String,
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub timeout_ms: u64,
}

/// LLM-backed HTML → Markdown conversion.
#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    async fn convert(&self, request: MarkdownRequest) -> Result<String, CapabilityError>;
}

// ── Conversion stage ─────────────────────────────────────────────────────────

/// Inputs for the optional markdown pass over an HTML page.
pub struct MarkdownInput<'a> {
    pub url: &'a str,
    pub html: &'a str,
    pub readability_html: Option<&'a str>,
    pub title: Option<&'a str>,
    pub site_name: Option<&'a str>,
    pub timeout_ms: u64,
    pub is_video_url: bool,
}

/// Run the markdown pass. Returns normalized markdown when a provider produced some.
///
/// `Llm` needs a converter; `Readability` always renders locally; `Auto`
/// tries the converter first and falls back to the local renderer.
pub async fn convert_to_markdown(
    converter: Option<&dyn MarkdownConverter>,
    mode: MarkdownMode,
    input: MarkdownInput<'_>,
    progress: &ProgressSink,
) -> (Option<String>, MarkdownDiagnostics) {
    let mut diagnostics = MarkdownDiagnostics {
        requested: true,
        ..MarkdownDiagnostics::default()
    };

    if input.is_video_url {
        diagnostics.notes = Some("Skipped for video pages".to_string());
        return (None, diagnostics);
    }

    let mut notes = Vec::new();

    if matches!(mode, MarkdownMode::Llm | MarkdownMode::Auto) {
        match converter {
            Some(converter) => match run_converter(converter, &input, progress).await {
                Ok(markdown) => {
                    diagnostics.used = true;
                    diagnostics.provider = Some(MarkdownProvider::Llm);
                    return (Some(markdown), diagnostics);
                }
                Err(note) => notes.push(note),
            },
            None => notes.push("No markdown converter configured".to_string()),
        }
    }

    if matches!(mode, MarkdownMode::Readability | MarkdownMode::Auto) {
        let source = input.readability_html.unwrap_or(input.html);
        let markdown = normalize_for_prompt(&html_to_markdown(source, input.url, input.title));
        if markdown.is_empty() {
            notes.push("Readability markdown was empty".to_string());
        } else {
            diagnostics.used = true;
            diagnostics.provider = Some(MarkdownProvider::Readability);
            diagnostics.notes = join_notes(notes);
            return (Some(markdown), diagnostics);
        }
    }

    diagnostics.notes = join_notes(notes);
    (None, diagnostics)
}

fn join_notes(notes: Vec<String>) -> Option<String> {
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}

async fn run_converter(
    converter: &dyn MarkdownConverter,
    input: &MarkdownInput<'_>,
    progress: &ProgressSink,
) -> Result<String, String> {
    progress.emit(ProgressEvent::MarkdownStart {
        url: input.url.to_string(),
    });

    let request = MarkdownRequest {
        url: input.url.to_string(),
        html: input.html.to_string(),
        title: input.title.map(str::to_string),
        site_name: input.site_name.map(str::to_string),
        timeout_ms: input.timeout_ms,
    };
    let timeout = Duration::from_millis(input.timeout_ms);
    let result = match tokio::time::timeout(timeout, converter.convert(request)).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            after_ms: input.timeout_ms,
        }),
    };

    let outcome = match result {
        Ok(markdown) => {
            let markdown = normalize_for_prompt(&markdown);
            if markdown.is_empty() {
                Err("Markdown converter returned nothing".to_string())
            } else {
                Ok(markdown)
            }
        }
        Err(e) => {
            tracing::warn!(url = %input.url, error = %e, "markdown conversion failed");
            Err(format!("Markdown conversion failed: {}", e))
        }
    };

    progress.emit(ProgressEvent::MarkdownDone {
        url: input.url.to_string(),
        ok: outcome.is_ok(),
    });
    outcome
}

// ── OpenAI-compatible converter ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct OpenAiMarkdownConverter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiMarkdownConverter {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn user_prompt(request: &MarkdownRequest) -> String {
        let html: String = request.html.chars().take(MAX_LLM_INPUT_CHARS).collect();
        let mut prompt = format!("URL: {}\n", request.url);
        if let Some(title) = &request.title {
            prompt.push_str(&format!("Title: {}\n", title));
        }
        if let Some(site) = &request.site_name {
            prompt.push_str(&format!("Site: {}\n", site));
        }
        prompt.push_str("\nHTML:\n");
        prompt.push_str(&html);
        prompt
    }
}

#[async_trait]
impl MarkdownConverter for OpenAiMarkdownConverter {
    async fn convert(&self, request: MarkdownRequest) -> Result<String, CapabilityError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_prompt(&request),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CapabilityError::Status {
                status: response.status().as_u16(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CapabilityError::Decode("no choices in completion".to_string()))
    }
}

// ── Local DOM walker → Markdown ──────────────────────────────────────────────

/// Render an HTML document or fragment to Markdown without any network call.
pub fn html_to_markdown(html: &str, base_url: &str, title: Option<&str>) -> String {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let body = document.root_element();
    let markdown = walk_element(body, base.as_ref());
    let markdown = MULTI_NEWLINE_RE
        .replace_all(&markdown, "\n\n")
        .trim()
        .to_string();

    match title {
        Some(t) => ensure_markdown_title(&markdown, t),
        None => markdown,
    }
}

fn resolve(base_url: Option<&Url>, href: &str) -> String {
    base_url
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

fn walk_element(el: ElementRef<'_>, base_url: Option<&Url>) -> String {
    let name = el.value().name();

    if HIDDEN_TAGS.contains(&name)
        || matches!(
            name,
            "form" | "button" | "audio" | "video" | "source" | "track" | "nav" | "footer" | "aside"
        )
    {
        return String::new();
    }

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = normalize_text(collect_text(el));
            if text.is_empty() {
                return String::new();
            }
            format!("{} {}\n\n", "#".repeat(level), text)
        }

        "img" => match resolve_img_src(el, base_url) {
            Some(src) => {
                let alt = el.value().attr("alt").map(str::trim).unwrap_or("");
                format!("![{}]({})\n\n", alt, src)
            }
            None => String::new(),
        },

        "picture" | "figure" => {
            let Some(img) = find_first_tag(el, "img") else {
                return String::new();
            };
            let Some(src) = resolve_img_src(img, base_url) else {
                return String::new();
            };
            let alt = img.value().attr("alt").map(str::trim).unwrap_or("");
            let mut result = format!("![{}]({})\n\n", alt, src);
            if let Some(caption) = find_first_tag(el, "figcaption")
                .map(|fc| normalize_text(collect_text(fc)))
                .filter(|s| !s.is_empty())
            {
                result.push_str(&format!("*{}*\n\n", caption));
            }
            result
        }

        "a" => {
            let href = el.value().attr("href").map(|h| resolve(base_url, h));
            let content = walk_children(el, base_url);
            let trimmed = content.trim().to_string();
            if trimmed.is_empty() {
                return String::new();
            }
            match href {
                Some(href) if !href.starts_with("javascript:") => format!("[{}]({})", trimmed, href),
                _ => trimmed,
            }
        }

        "p" => {
            let content = walk_children(el, base_url);
            let trimmed = content.trim().to_string();
            if trimmed.is_empty() {
                return String::new();
            }
            format!("{}\n\n", trimmed)
        }

        "br" => "\n".to_string(),
        "hr" => "\n---\n\n".to_string(),

        "ul" => handle_list(el, base_url, false),
        "ol" => handle_list(el, base_url, true),

        "strong" | "b" => wrap_inline(el, base_url, "**"),
        "em" | "i" => wrap_inline(el, base_url, "*"),

        "blockquote" => {
            let content = walk_children(el, base_url);
            let quoted = content
                .trim()
                .lines()
                .map(|l| format!("> {}", l))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}\n\n", quoted)
        }

        "pre" => format!("```\n{}\n```\n\n", collect_text(el).trim_end()),
        "code" => format!("`{}`", collect_text(el)),

        "div" | "section" | "article" | "main" | "header" | "li" => {
            let content = walk_children(el, base_url);
            if content.trim().is_empty() {
                return String::new();
            }
            format!("{}\n\n", content.trim())
        }

        _ => walk_children(el, base_url),
    }
}

fn wrap_inline(el: ElementRef<'_>, base_url: Option<&Url>, marker: &str) -> String {
    let content = walk_children(el, base_url);
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{}{}{}", marker, trimmed, marker)
}

fn walk_children(el: ElementRef<'_>, base_url: Option<&Url>) -> String {
    let mut result = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                result.push_str(&text.text);
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    result.push_str(&walk_element(child_el, base_url));
                }
            }
            _ => {}
        }
    }
    result
}

fn handle_list(el: ElementRef<'_>, base_url: Option<&Url>, ordered: bool) -> String {
    let mut result = String::new();
    let mut idx = 1usize;

    for child in el.children().filter_map(ElementRef::wrap) {
        if child.value().name() != "li" {
            continue;
        }
        let content = walk_children(child, base_url);
        let trimmed = normalize_text(content);
        if trimmed.is_empty() {
            continue;
        }
        if ordered {
            result.push_str(&format!("{}. {}\n", idx, trimmed));
            idx += 1;
        } else {
            result.push_str(&format!("- {}\n", trimmed));
        }
    }

    if !result.is_empty() {
        result.push('\n');
    }
    result
}

fn resolve_img_src(el: ElementRef<'_>, base_url: Option<&Url>) -> Option<String> {
    let v = el.value();

    // Priority: data-src → src → srcset (largest candidate).
    let src = v
        .attr("data-src")
        .or_else(|| v.attr("src"))
        .map(str::to_string)
        .or_else(|| {
            v.attr("srcset")
                .or_else(|| v.attr("data-srcset"))
                .and_then(best_src_from_srcset)
        })?;

    if src.starts_with("data:") {
        return None;
    }
    Some(resolve(base_url, &src))
}

fn best_src_from_srcset(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split_whitespace();
            let url = pieces.next()?;
            let score = pieces
                .next()
                .filter(|d| d.ends_with('w') || d.ends_with('x'))
                .and_then(|d| d[..d.len() - 1].parse::<f64>().ok())
                .unwrap_or(0.0);
            Some((score, url.to_string()))
        })
        .fold(None, |best: Option<(f64, String)>, candidate| match best {
            Some(b) if b.0 > candidate.0 => Some(b),
            _ => Some(candidate),
        })
        .map(|(_, url)| url)
}

fn ensure_markdown_title(markdown: &str, title: &str) -> String {
    let expected = format!("# {}", title);
    let mut lines: Vec<String> = markdown.lines().map(str::to_string).collect();
    match lines.iter().position(|l| !l.trim().is_empty()) {
        Some(idx) if lines[idx].trim() == title => {
            lines[idx] = expected;
            lines.join("\n")
        }
        _ => markdown.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_common_blocks() {
        let html = r#"<div><h2>Section</h2><p>Some <strong>bold</strong> and <em>soft</em> text
            with a <a href="/more">link</a>.</p><ul><li>one</li><li>two</li></ul>
            <ol><li>first</li></ol><blockquote>quoted</blockquote><pre>let x = 1;</pre></div>"#;
        let md = html_to_markdown(html, "https://example.com/post", None);
        assert!(md.contains("## Section"));
        assert!(md.contains("**bold**"));
        assert!(md.contains("*soft*"));
        assert!(md.contains("[link](https://example.com/more)"));
        assert!(md.contains("- one\n- two"));
        assert!(md.contains("1. first"));
        assert!(md.contains("> quoted"));
        assert!(md.contains("```\nlet x = 1;\n```"));
    }

    #[test]
    fn picks_largest_srcset_candidate() {
        assert_eq!(
            best_src_from_srcset("a.jpg 320w, b.jpg 1024w, c.jpg 640w").as_deref(),
            Some("b.jpg")
        );
    }

    #[test]
    fn promotes_plain_title_line_to_heading() {
        assert_eq!(ensure_markdown_title("My Post\n\nBody", "My Post"), "# My Post\n\nBody");
        assert_eq!(ensure_markdown_title("Body", "My Post"), "Body");
    }

    struct FixedConverter(Result<String, CapabilityError>);

    #[async_trait]
    impl MarkdownConverter for FixedConverter {
        async fn convert(&self, _request: MarkdownRequest) -> Result<String, CapabilityError> {
            self.0.clone()
        }
    }

    fn input<'a>(html: &'a str, video: bool) -> MarkdownInput<'a> {
        MarkdownInput {
            url: "https://example.com/a",
            html,
            readability_html: None,
            title: None,
            site_name: None,
            timeout_ms: 1_000,
            is_video_url: video,
        }
    }

    #[tokio::test]
    async fn llm_mode_uses_converter() {
        let converter = FixedConverter(Ok("# From LLM\n\n\n\nBody".to_string()));
        let (markdown, diagnostics) = convert_to_markdown(
            Some(&converter as &dyn MarkdownConverter),
            MarkdownMode::Llm,
            input("<p>x</p>", false),
            &ProgressSink::none(),
        )
        .await;
        assert_eq!(markdown.as_deref(), Some("# From LLM\n\nBody"));
        assert!(diagnostics.used);
        assert_eq!(diagnostics.provider, Some(MarkdownProvider::Llm));
    }

    #[tokio::test]
    async fn llm_mode_without_converter_is_skipped() {
        let (markdown, diagnostics) = convert_to_markdown(
            None,
            MarkdownMode::Llm,
            input("<p>x</p>", false),
            &ProgressSink::none(),
        )
        .await;
        assert!(markdown.is_none());
        assert!(diagnostics.requested);
        assert!(!diagnostics.used);
        assert_eq!(diagnostics.notes.as_deref(), Some("No markdown converter configured"));
    }

    #[tokio::test]
    async fn auto_mode_falls_back_to_local_rendering() {
        let converter = FixedConverter(Err(CapabilityError::Status { status: 500 }));
        let (markdown, diagnostics) = convert_to_markdown(
            Some(&converter as &dyn MarkdownConverter),
            MarkdownMode::Auto,
            input("<h1>Hi</h1><p>Local body</p>", false),
            &ProgressSink::none(),
        )
        .await;
        assert_eq!(markdown.as_deref(), Some("# Hi\n\nLocal body"));
        assert_eq!(diagnostics.provider, Some(MarkdownProvider::Readability));
        assert!(diagnostics.notes.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn skipped_for_video_pages() {
        let (markdown, diagnostics) = convert_to_markdown(
            None,
            MarkdownMode::Readability,
            input("<p>x</p>", true),
            &ProgressSink::none(),
        )
        .await;
        assert!(markdown.is_none());
        assert!(!diagnostics.used);
    }
}

//! Plain article text: the raw "extracted text" candidate.
//!
//! Picks a content container and flattens it to block-separated text,
//! dropping navigation, forms and short chrome blocks along the way.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};

use crate::config::thresholds::MIN_CONTENT_CHARS;
use crate::dom::{class_and_id, collect_text, normalize_text, selector, BLOCK_TAGS, HIDDEN_TAGS};
use crate::normalize::normalize_for_prompt;

static KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(article|content|post|entry|story|body|text)").unwrap());

static CHROME_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(cookie|consent|newsletter|subscribe|share|social|promo|related|breadcrumb|sidebar|menu|navbar|banner|popup|modal)",
    )
    .unwrap()
});

const CHROME_MAX_TEXT_LEN: usize = 250;

struct WalkCtx {
    in_article_or_main: bool,
}

/// Extract the main text of a document, normalized.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);
    match find_container(&document) {
        Some(container) => {
            let ctx = WalkCtx {
                in_article_or_main: matches!(container.value().name(), "article" | "main"),
            };
            normalize_for_prompt(&walk_element(container, &ctx))
        }
        None => String::new(),
    }
}

// ── Container selection ──────────────────────────────────────────────────────

fn find_container(document: &Html) -> Option<ElementRef<'_>> {
    // 1. Prefer the <article> with the most text.
    let article = document
        .select(&selector("article"))
        .max_by_key(|el| collect_text(*el).len());
    if article.is_some() {
        return article;
    }

    // 2. Fall back to <main>
    if let Some(el) = document.select(&selector("main")).next() {
        return Some(el);
    }

    // 3. Best <div> with a content-like class/id and sufficient text.
    let mut best: Option<ElementRef<'_>> = None;
    let mut best_len: usize = 0;

    for div in document.select(&selector("div")) {
        if !KEYWORD_RE.is_match(&class_and_id(div)) {
            continue;
        }

        let text_len = normalize_text(collect_text(div)).len();
        if text_len > best_len {
            best_len = text_len;
            best = Some(div);
        }
    }

    if best_len >= MIN_CONTENT_CHARS {
        return best;
    }

    // 4. Whole body.
    document.select(&selector("body")).next()
}

// ── DOM tree walker → text ───────────────────────────────────────────────────

fn walk_element(el: ElementRef<'_>, ctx: &WalkCtx) -> String {
    let name = el.value().name();

    if HIDDEN_TAGS.contains(&name)
        || matches!(name, "form" | "button" | "select" | "input" | "audio" | "video")
    {
        return String::new();
    }

    // Skip layout / navigation chrome.
    if matches!(name, "nav" | "footer" | "aside") {
        return String::new();
    }

    // Skip <header> unless we are already inside article/main.
    if name == "header" && !ctx.in_article_or_main {
        return String::new();
    }

    if el.value().attr("aria-hidden") == Some("true") || el.value().attr("hidden").is_some() {
        return String::new();
    }

    if matches!(name, "div" | "section" | "ul" | "ol" | "p" | "span") {
        let class_id = class_and_id(el);
        if !class_id.trim().is_empty() && CHROME_CLASS_RE.is_match(&class_id) {
            let text_len = normalize_text(collect_text(el)).len();
            if text_len <= CHROME_MAX_TEXT_LEN {
                return String::new();
            }
        }
    }

    let child_ctx = WalkCtx {
        in_article_or_main: ctx.in_article_or_main || matches!(name, "article" | "main"),
    };

    let inner = walk_children(el, &child_ctx);
    if BLOCK_TAGS.contains(&name) {
        format!("\n{}\n", inner)
    } else {
        inner
    }
}

fn walk_children(el: ElementRef<'_>, ctx: &WalkCtx) -> String {
    let mut result = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                result.push_str(&text.text);
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    result.push_str(&walk_element(child_el, ctx));
                }
            }
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_and_drops_navigation() {
        let html = r#"<html><body>
            <nav>Home | About</nav>
            <article><h1>Title</h1><p>First paragraph.</p><p>Second paragraph.</p>
              <aside>Related links</aside></article>
            <footer>Copyright</footer>
        </body></html>"#;
        let text = extract_article_text(html);
        assert!(text.starts_with("Title"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Related links"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn separates_blocks_with_newlines() {
        let html = "<html><body><main><p>One</p><p>Two</p></main></body></html>";
        assert_eq!(extract_article_text(html), "One\n\nTwo");
    }

    #[test]
    fn drops_short_chrome_blocks() {
        let html = r#"<html><body><main>
            <div class="share-buttons">Share on Twitter</div>
            <p>Actual body text.</p>
        </main></body></html>"#;
        let text = extract_article_text(html);
        assert_eq!(text, "Actual body text.");
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><p>Tiny page.</p><script>track()</script></body></html>";
        assert_eq!(extract_article_text(html), "Tiny page.");
    }
}

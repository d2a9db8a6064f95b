use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Tags whose contents never count as readable text.
pub const HIDDEN_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "canvas", "iframe", "object", "embed",
    "head",
];

/// Block-level tags that introduce a line break in extracted text.
pub const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "li", "ul", "ol", "dl", "dt", "dd",
    "blockquote", "pre", "figure", "figcaption", "table", "tr", "h1", "h2", "h3", "h4", "h5",
    "h6", "br", "hr",
];

pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid static selector: {}", css))
}

/// Recursively collect all text from an element and its descendants.
pub fn collect_text(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => parts.push((&*text.text).to_string()),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !HIDDEN_TAGS.contains(&child_el.value().name()) {
                        parts.push(collect_text(child_el));
                    }
                }
            }
            _ => {}
        }
    }
    parts.join("")
}

/// Collapse whitespace and trim.
pub fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `id` and class names joined into one string for pattern checks.
pub fn class_and_id(el: ElementRef<'_>) -> String {
    let id = el.value().id().unwrap_or("");
    let classes = el.value().classes().collect::<Vec<_>>().join(" ");
    format!("{} {}", id, classes)
}

/// Depth-first search for the first element with the given tag name.
pub fn find_first_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    for child in el.children() {
        if let Node::Element(_) = child.value() {
            if let Some(child_el) = ElementRef::wrap(child) {
                if child_el.value().name() == tag {
                    return Some(child_el);
                }
                if let Some(found) = find_first_tag(child_el, tag) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Content of the document `<title>`, whitespace-collapsed.
pub fn document_title(document: &Html) -> Option<String> {
    document
        .select(&selector("title"))
        .next()
        .map(|el| normalize_text(collect_text(el)))
        .filter(|s| !s.is_empty())
}

/// Every visible text node of the document, whitespace-collapsed.
///
/// The `<title>` is included because bot walls often only announce
/// themselves there.
pub fn visible_text(document: &Html) -> String {
    let body = document
        .select(&selector("body"))
        .next()
        .map(collect_text)
        .unwrap_or_default();
    let title = document_title(document).unwrap_or_default();
    normalize_text(format!("{} {}", title, body))
}

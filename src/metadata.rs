//! Page metadata from three sources, merged with a fixed precedence:
//! JSON-LD, then the scraping service's metadata, then `<meta>` tags.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};

use crate::dom::{collect_text, document_title, normalize_text, selector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub page_type: Option<String>,
}

impl PageMetadata {
    /// Fill every empty field from `other`.
    fn or(self, other: &PageMetadata) -> PageMetadata {
        PageMetadata {
            title: self.title.or_else(|| other.title.clone()),
            description: self.description.or_else(|| other.description.clone()),
            site_name: self.site_name.or_else(|| other.site_name.clone()),
            page_type: self.page_type.or_else(|| other.page_type.clone()),
        }
    }
}

/// JSON-LD metadata plus whether the structured data describes audio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonLdMetadata {
    pub metadata: PageMetadata,
    pub podcast_like: bool,
}

static YOUTUBE_SHORT_DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""shortDescription"\s*:\s*"((?:\\.|[^"\\])*)""#).unwrap());

const AUDIO_TYPES: &[&str] = &["audioobject", "radioepisode", "radioseries", "musicrecording"];

/// Merge the three sources; the first non-empty value wins per field.
pub fn merge_metadata(
    json_ld: &PageMetadata,
    scraped: Option<&PageMetadata>,
    html: &PageMetadata,
) -> PageMetadata {
    let merged = json_ld.clone();
    let merged = match scraped {
        Some(scraped) => merged.or(scraped),
        None => merged,
    };
    merged.or(html)
}

fn clean(value: &str) -> Option<String> {
    let value = normalize_text(value.to_string());
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// ── <meta> tags ──────────────────────────────────────────────────────────────

fn meta_content(document: &Html, checks: &[(&str, &str)]) -> Option<String> {
    for (attr, value) in checks {
        let sel_str = format!("meta[{}=\"{}\"]", attr, value);
        // Use .ok() immediately to drop SelectorErrorKind<'_> before sel_str is dropped.
        let sel = scraper::Selector::parse(&sel_str).ok();
        if let Some(sel) = sel {
            for el in document.select(&sel) {
                if let Some(content) = el.value().attr("content").and_then(clean) {
                    return Some(content);
                }
            }
        }
    }
    None
}

pub fn extract_html_metadata(document: &Html) -> PageMetadata {
    let title = meta_content(
        document,
        &[("property", "og:title"), ("name", "twitter:title")],
    )
    .or_else(|| document_title(document));

    let description = meta_content(
        document,
        &[
            ("property", "og:description"),
            ("name", "twitter:description"),
            ("name", "description"),
            ("itemprop", "description"),
        ],
    );

    let site_name = meta_content(
        document,
        &[("property", "og:site_name"), ("name", "application-name")],
    );

    let page_type = meta_content(document, &[("property", "og:type")]);

    PageMetadata {
        title,
        description,
        site_name,
        page_type,
    }
}

// ── JSON-LD ──────────────────────────────────────────────────────────────────

pub fn extract_json_ld(document: &Html) -> JsonLdMetadata {
    let mut result = JsonLdMetadata::default();
    for script in document.select(&selector(r#"script[type="application/ld+json"]"#)) {
        let raw = script.text().collect::<String>();
        let value = match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable JSON-LD block");
                continue;
            }
        };

        let mut nodes = Vec::new();
        flatten_nodes(&value, &mut nodes);
        for node in nodes {
            let types = node_types(node);
            if types.iter().any(|t| is_audio_type(t)) {
                result.podcast_like = true;
            }
            result.metadata = result.metadata.or(&node_metadata(node, &types));
        }
    }
    result
}

fn flatten_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_nodes(item, out)),
        Value::Object(map) => {
            if map.contains_key("@type") {
                out.push(map);
            }
            if let Some(graph) = map.get("@graph") {
                flatten_nodes(graph, out);
            }
        }
        _ => {}
    }
}

fn node_types(node: &Map<String, Value>) -> Vec<String> {
    match node.get("@type") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_audio_type(t: &str) -> bool {
    let lower = t.to_lowercase();
    lower.contains("podcast") || AUDIO_TYPES.contains(&lower.as_str())
}

fn string_field(node: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| node.get(*k))
        .find_map(|v| v.as_str().and_then(clean))
}

fn node_metadata(node: &Map<String, Value>, types: &[String]) -> PageMetadata {
    let site_name = node
        .get("publisher")
        .or_else(|| node.get("partOfSeries"))
        .and_then(|p| match p {
            Value::Object(obj) => string_field(obj, &["name"]),
            Value::String(s) => clean(s),
            _ => None,
        });

    // WebSite/Organization nodes only describe the site, not the page.
    let site_level = types
        .iter()
        .any(|t| matches!(t.as_str(), "WebSite" | "Organization" | "BreadcrumbList"));
    if site_level {
        return PageMetadata {
            site_name: string_field(node, &["name"]),
            ..PageMetadata::default()
        };
    }

    PageMetadata {
        title: string_field(node, &["headline", "name"]),
        description: string_field(node, &["description", "abstract"]),
        site_name,
        page_type: types.first().cloned(),
    }
}

// ── Scraping-service metadata ────────────────────────────────────────────────

/// Read the metadata object a scraping service returns alongside its markdown.
pub fn extract_scraped_metadata(raw: &Map<String, Value>) -> PageMetadata {
    let field = |keys: &[&str]| -> Option<String> {
        keys.iter().filter_map(|k| raw.get(*k)).find_map(|v| match v {
            Value::String(s) => clean(s),
            Value::Array(items) => items.iter().find_map(|i| i.as_str().and_then(clean)),
            _ => None,
        })
    };

    PageMetadata {
        title: field(&["title", "ogTitle", "og:title"]),
        description: field(&["description", "ogDescription", "og:description"]),
        site_name: field(&["ogSiteName", "og:site_name", "siteName"]),
        page_type: field(&["ogType", "og:type"]),
    }
}

/// Text of the first `<h1>`, used when nothing better names the page.
pub fn first_heading(document: &Html) -> Option<String> {
    document
        .select(&selector("h1"))
        .next()
        .map(|el| normalize_text(collect_text(el)))
        .filter(|s| !s.is_empty())
}

/// Video description embedded in a YouTube watch page's player response.
pub fn extract_youtube_short_description(html: &str) -> Option<String> {
    let caps = YOUTUBE_SHORT_DESCRIPTION_RE.captures(html)?;
    let decoded: String = serde_json::from_str(&format!("\"{}\"", &caps[1])).ok()?;
    let decoded = decoded.trim().to_string();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Fallback Title</title>
        <meta property="og:title" content="OG Title">
        <meta name="description" content="Meta description">
        <meta property="og:site_name" content="Example Site">
        <script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
            {"@type":"WebSite","name":"Graph Site"},
            {"@type":"PodcastEpisode","name":"Episode 12","description":"Episode summary",
             "partOfSeries":{"@type":"PodcastSeries","name":"The Show"}}
        ]}
        </script>
    </head><body><h1>Heading</h1></body></html>"#;

    #[test]
    fn reads_meta_tags() {
        let doc = Html::parse_document(PAGE);
        let meta = extract_html_metadata(&doc);
        assert_eq!(meta.title.as_deref(), Some("OG Title"));
        assert_eq!(meta.description.as_deref(), Some("Meta description"));
        assert_eq!(meta.site_name.as_deref(), Some("Example Site"));
    }

    #[test]
    fn reads_json_ld_graph_and_flags_podcasts() {
        let doc = Html::parse_document(PAGE);
        let ld = extract_json_ld(&doc);
        assert!(ld.podcast_like);
        assert_eq!(ld.metadata.title.as_deref(), Some("Episode 12"));
        assert_eq!(ld.metadata.description.as_deref(), Some("Episode summary"));
        assert_eq!(ld.metadata.site_name.as_deref(), Some("Graph Site"));
        assert_eq!(ld.metadata.page_type.as_deref(), Some("PodcastEpisode"));
    }

    #[test]
    fn merge_prefers_json_ld_then_scraped_then_html() {
        let json_ld = PageMetadata {
            title: Some("LD".into()),
            ..PageMetadata::default()
        };
        let scraped = PageMetadata {
            title: Some("Scraped".into()),
            description: Some("Scraped description".into()),
            ..PageMetadata::default()
        };
        let html = PageMetadata {
            title: Some("Html".into()),
            description: Some("Html description".into()),
            site_name: Some("Html site".into()),
            page_type: None,
        };
        let merged = merge_metadata(&json_ld, Some(&scraped), &html);
        assert_eq!(merged.title.as_deref(), Some("LD"));
        assert_eq!(merged.description.as_deref(), Some("Scraped description"));
        assert_eq!(merged.site_name.as_deref(), Some("Html site"));
    }

    #[test]
    fn ignores_broken_json_ld() {
        let doc = Html::parse_document(
            r#"<html><head><script type="application/ld+json">{not json</script></head></html>"#,
        );
        assert_eq!(extract_json_ld(&doc), JsonLdMetadata::default());
    }

    #[test]
    fn reads_scraped_metadata_arrays() {
        let raw: Map<String, Value> = serde_json::from_str(
            r#"{"title":"T","ogDescription":["  first  ","second"],"ogSiteName":"S"}"#,
        )
        .unwrap();
        let meta = extract_scraped_metadata(&raw);
        assert_eq!(meta.title.as_deref(), Some("T"));
        assert_eq!(meta.description.as_deref(), Some("first"));
        assert_eq!(meta.site_name.as_deref(), Some("S"));
    }

    #[test]
    fn decodes_youtube_short_description() {
        let html = r#"<script>var ytInitialPlayerResponse = {"videoDetails":{"videoId":"x","shortDescription":"Line one\nLine \"two\" \u0026 more","isCrawlable":true}};</script>"#;
        assert_eq!(
            extract_youtube_short_description(html).as_deref(),
            Some("Line one\nLine \"two\" & more")
        );
        assert_eq!(extract_youtube_short_description("<html></html>"), None);
    }
}

//! Picks the content that goes to the summarizer among the candidates a page
//! yields: transcript, scraped markdown, readability text, plain text,
//! metadata description and the YouTube short description.
//!
//! Every candidate handed in here is already normalized, so all length
//! comparisons use normalized lengths.

use crate::config::thresholds::{
    COMPARABLE_RATIO, MIN_CONTENT_CHARS, MIN_DESCRIPTION_CHARS, MIN_READABILITY_CHARS,
};
use crate::normalize::{char_len, strip_leading_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Transcript,
    YoutubeDescription,
    Description,
    Markdown,
    Readability,
    ArticleText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub content: String,
    pub source: ContentSource,
}

#[derive(Debug, Clone, Default)]
pub struct Candidates<'a> {
    pub article_text: &'a str,
    pub readability_text: Option<&'a str>,
    pub markdown: Option<&'a str>,
    pub description: Option<&'a str>,
    pub youtube_short_description: Option<&'a str>,
    pub podcast_like: bool,
    pub is_youtube: bool,
    pub title: Option<&'a str>,
}

fn comparable(candidate: usize, reference: usize) -> bool {
    candidate as f64 >= COMPARABLE_RATIO * reference as f64
}

/// Readability wins when it is long enough and at least comparably substantial.
pub fn prefer_readability(readability: &str, article_text: &str) -> bool {
    let readability_len = char_len(readability);
    let article_len = char_len(article_text);
    readability_len >= MIN_READABILITY_CHARS
        && (article_len < MIN_CONTENT_CHARS || comparable(readability_len, article_len))
}

/// A long description beats body text on podcast pages, over thin bodies,
/// or when it is comparably substantial.
pub fn prefer_description(description: &str, body: &str, podcast_like: bool) -> bool {
    let description_len = char_len(description);
    let body_len = char_len(body);
    description_len >= MIN_DESCRIPTION_CHARS
        && (podcast_like || body_len < MIN_CONTENT_CHARS || comparable(description_len, body_len))
}

fn body_candidate(candidates: &Candidates<'_>) -> Selection {
    if let Some(markdown) = candidates.markdown.filter(|m| !m.is_empty()) {
        return Selection {
            content: markdown.to_string(),
            source: ContentSource::Markdown,
        };
    }
    if let Some(readability) = candidates.readability_text {
        if prefer_readability(readability, candidates.article_text) {
            return Selection {
                content: readability.to_string(),
                source: ContentSource::Readability,
            };
        }
    }
    Selection {
        content: candidates.article_text.to_string(),
        source: ContentSource::ArticleText,
    }
}

/// Body text, description or YouTube description, before any transcript merge.
pub fn select_candidate(candidates: &Candidates<'_>) -> Selection {
    let body = body_candidate(candidates);

    if candidates.is_youtube {
        if let Some(short) = candidates.youtube_short_description.filter(|d| !d.is_empty()) {
            return Selection {
                content: short.to_string(),
                source: ContentSource::YoutubeDescription,
            };
        }
    }

    if let Some(description) = candidates.description {
        if prefer_description(description, &body.content, candidates.podcast_like) {
            return Selection {
                content: description.to_string(),
                source: ContentSource::Description,
            };
        }
    }

    body
}

/// A resolved transcript replaces whatever the page offered.
pub fn select_base_content(candidate: Selection, transcript: Option<&str>) -> Selection {
    match transcript.filter(|t| !t.is_empty()) {
        Some(text) => Selection {
            content: text.to_string(),
            source: ContentSource::Transcript,
        },
        None => candidate,
    }
}

/// Full selection: candidate choice, transcript merge, then leading-title strip
/// when the raw plain text was chosen.
pub fn select_content(candidates: &Candidates<'_>, transcript: Option<&str>) -> Selection {
    let mut selection = select_base_content(select_candidate(candidates), transcript);
    if selection.source == ContentSource::ArticleText {
        if let Some(title) = candidates.title {
            selection.content = strip_leading_title(&selection.content, title);
        }
    }
    selection
}

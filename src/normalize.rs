//! Whitespace and control-character cleanup applied to every text candidate.
//!
//! Length checks anywhere in the crate are made against the output of
//! [`normalize_for_prompt`], never against raw text.

use once_cell::sync::Lazy;
use regex::Regex;

static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\u{200B}-\u{200D}\u{FEFF}]").unwrap());

static HORIZONTAL_WS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\u{00A0}\u{2000}-\u{200A}\u{202F}\u{3000}]+").unwrap());

static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static LEADING_SEPARATORS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\p{Cc}.:|\-\u{2013}\u{2014}]+").unwrap());

/// Collapse horizontal whitespace, trim every line, cap blank runs at one
/// empty line and drop control characters.
pub fn normalize_for_prompt(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned = CONTROL_RE.replace_all(&unified, "");
    let collapsed = HORIZONTAL_WS_RE.replace_all(&cleaned, " ");

    let lines = collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_NEWLINE_RE
        .replace_all(&lines, "\n\n")
        .trim()
        .to_string()
}

pub fn char_len(input: &str) -> usize {
    input.chars().count()
}

pub fn word_count(input: &str) -> usize {
    input.split_whitespace().count()
}

/// Hard cut to at most `max` characters. Returns the text and whether it was cut.
pub fn truncate_chars(input: &str, max: usize) -> (String, bool) {
    match input.char_indices().nth(max) {
        Some((byte_idx, _)) => (input[..byte_idx].to_string(), true),
        None => (input.to_string(), false),
    }
}

/// Remove `title` from the start of `content` when it is repeated there,
/// along with the punctuation and whitespace that separates it from the body.
pub fn strip_leading_title(content: &str, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return content.to_string();
    }

    let mut content_chars = content.char_indices();
    for title_char in title.chars() {
        match content_chars.next() {
            Some((_, c)) if c.to_lowercase().eq(title_char.to_lowercase()) => {}
            _ => return content.to_string(),
        }
    }

    let rest = match content_chars.next() {
        Some((_, c)) if c.is_alphanumeric() => return content.to_string(),
        Some((idx, _)) => &content[idx..],
        None => "",
    };
    LEADING_SEPARATORS_RE.replace(rest, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_blank_runs() {
        let raw = "  Hello \t  world\u{00A0}again\r\n\r\n\r\n\n  Next   line  ";
        assert_eq!(normalize_for_prompt(raw), "Hello world again\n\nNext line");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(normalize_for_prompt("a\u{0007}b\u{200B}c"), "abc");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let (cut, truncated) = truncate_chars("héllo wörld", 4);
        assert_eq!(cut, "héll");
        assert!(truncated);

        let (same, truncated) = truncate_chars("short", 5);
        assert_eq!(same, "short");
        assert!(!truncated);
    }

    #[test]
    fn strip_leading_title_removes_prefix_and_separator() {
        assert_eq!(
            strip_leading_title("Example. Lorem ipsum dolor", "Example"),
            "Lorem ipsum dolor"
        );
        assert_eq!(
            strip_leading_title("EXAMPLE\n\n— Lorem ipsum", "example"),
            "Lorem ipsum"
        );
    }

    #[test]
    fn strip_leading_title_keeps_body_punctuation() {
        assert_eq!(
            strip_leading_title("Example \"Quoted\" start", "Example"),
            "\"Quoted\" start"
        );
        assert_eq!(
            strip_leading_title("Example | (Draft) notes", "Example"),
            "(Draft) notes"
        );
    }

    #[test]
    fn strip_leading_title_keeps_unrelated_content() {
        assert_eq!(strip_leading_title("Lorem ipsum", "Example"), "Lorem ipsum");
        assert_eq!(strip_leading_title("Exam", "Example"), "Exam");
        assert_eq!(strip_leading_title("Examples abound", "Example"), "Examples abound");
        assert_eq!(strip_leading_title("Body", "  "), "Body");
    }

    #[test]
    fn counts_words() {
        assert_eq!(word_count("one  two\nthree"), 3);
        assert_eq!(word_count("   "), 0);
    }
}

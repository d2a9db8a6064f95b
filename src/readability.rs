//! Main content isolation with Mozilla's readability algorithm.

use url::Url;

use crate::normalize::normalize_for_prompt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadabilityResult {
    pub text: String,
    pub html: String,
}

/// Run readability over `html`. `None` when the URL is unusable, the
/// extractor fails, or the isolated content has no text.
pub fn extract_readability(html: &str, url: &str) -> Option<ReadabilityResult> {
    let base = match Url::parse(url) {
        Ok(base) => base,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "readability skipped: bad base URL");
            return None;
        }
    };

    let product = match readability::extractor::extract(&mut html.as_bytes(), &base) {
        Ok(product) => product,
        Err(e) => {
            tracing::debug!(url = %url, error = ?e, "readability extraction failed");
            return None;
        }
    };

    let text = normalize_for_prompt(&product.text);
    if text.is_empty() {
        return None;
    }
    Some(ReadabilityResult {
        text,
        html: product.content,
    })
}

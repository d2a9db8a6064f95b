use std::time::Duration;

use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::progress::{ProgressEvent, ProgressSink};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Raw HTTP GET returning the response body as text.
///
/// Implementations must be safe to share across concurrent extractions.
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, CapabilityError>;
}

/// reqwest-backed fetcher with browser-like headers.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(insecure: bool) -> Result<Self, CapabilityError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let mut builder = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| CapabilityError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.contains("text/html")
        || content_type.contains("application/xhtml+xml")
}

#[async_trait]
impl HtmlFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, CapabilityError> {
        let response = self.client.get(url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(CapabilityError::Status {
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if !is_html_content_type(&content_type) {
            return Err(CapabilityError::NotHtml);
        }

        Ok(response.text().await?)
    }
}

/// One timed GET through `fetcher`, reporting start/done/failed progress.
///
/// No retries: a failure here is handed to the caller's fallback logic.
pub async fn fetch_html_document(
    fetcher: &dyn HtmlFetcher,
    url: &str,
    timeout_ms: u64,
    progress: &ProgressSink,
) -> Result<String, CapabilityError> {
    progress.emit(ProgressEvent::FetchHtmlStart {
        url: url.to_string(),
    });
    tracing::debug!(url = %url, timeout_ms, "fetching HTML");

    let timeout = Duration::from_millis(timeout_ms);
    let result = match tokio::time::timeout(timeout, fetcher.fetch(url, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout { after_ms: timeout_ms }),
    };

    match &result {
        Ok(html) => progress.emit(ProgressEvent::FetchHtmlDone {
            url: url.to_string(),
            bytes: html.len(),
        }),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "HTML fetch failed");
            progress.emit(ProgressEvent::FetchHtmlFailed {
                url: url.to_string(),
                error: e.to_string(),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html><body>hi</body></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(false).unwrap();
        let html = fetcher
            .fetch(&format!("{}/article", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(html.contains("hi"));
    }

    #[tokio::test]
    async fn rejects_error_status_and_non_html() {
        let server = MockServer::start().await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{}"),
            )
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(false).unwrap();
        let gone = fetcher
            .fetch(&format!("{}/gone", server.uri()), Duration::from_secs(5))
            .await;
        assert!(matches!(gone, Err(CapabilityError::Status { status: 404 })));

        let json = fetcher
            .fetch(&format!("{}/data.json", server.uri()), Duration::from_secs(5))
            .await;
        assert!(matches!(json, Err(CapabilityError::NotHtml)));
    }

    struct SlowFetcher;

    #[async_trait]
    impl HtmlFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String, CapabilityError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn enforces_timeout_and_reports_failure() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = Arc::clone(&events);
            ProgressSink::new(move |e| events.lock().unwrap().push(e.clone()))
        };

        let result = fetch_html_document(&SlowFetcher, "https://example.com", 20, &sink).await;
        assert!(matches!(result, Err(CapabilityError::Timeout { after_ms: 20 })));

        let events = events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::FetchHtmlStart { .. }));
        assert!(matches!(events[1], ProgressEvent::FetchHtmlFailed { .. }));
    }
}

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

/// Structured progress telemetry emitted while a link is being extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    FetchHtmlStart { url: String },
    FetchHtmlDone { url: String, bytes: usize },
    FetchHtmlFailed { url: String, error: String },
    FetchHtmlBlocked { url: String, reason: String },
    FirecrawlStart { url: String, reason: String },
    FirecrawlDone { url: String, ok: bool, markdown_chars: usize },
    BirdStart { url: String },
    BirdDone { url: String, ok: bool },
    NitterStart { url: String },
    NitterDone { url: String, ok: bool },
    TranscriptStart { url: String },
    TranscriptDone { url: String, ok: bool, source: Option<String> },
    MarkdownStart { url: String },
    MarkdownDone { url: String, ok: bool },
}

type Callback = dyn Fn(&ProgressEvent) + Send + Sync;

/// Fire-and-forget sink for [`ProgressEvent`]s.
///
/// The callback runs inline; a panic inside it is logged and swallowed.
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<Arc<Callback>>,
}

impl ProgressSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(callback) = &self.callback else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
            tracing::warn!(?event, "progress callback panicked; event dropped");
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

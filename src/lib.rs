//! Turns an arbitrary URL into normalized, LLM-ready text.
//!
//! [`fetch_link_content`] routes the URL, runs the extraction cascade
//! (direct fetch, Firecrawl, the social-post chain, transcripts) and returns
//! an [`ExtractedLinkContent`] whose diagnostics explain every decision.

pub mod article;
pub mod config;
pub mod dom;
pub mod error;
pub mod fetcher;
pub mod finalize;
pub mod firecrawl;
pub mod markdown;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod readability;
pub mod router;
pub mod selection;
pub mod social;
pub mod transcript;

pub use config::{Settings, TranscriptionKeys};
pub use error::{CapabilityError, LinkError};
pub use models::{ExtractedLinkContent, FetchOptions};
pub use pipeline::{fetch_link_content, LinkDeps};
pub use progress::{ProgressEvent, ProgressSink};

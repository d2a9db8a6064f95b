//! Single exit point: every extraction path builds its record here.

use crate::metadata::PageMetadata;
use crate::models::{
    AttemptRecord, ContentDiagnostics, ExtractedLinkContent, FirecrawlDiagnostics,
    MarkdownDiagnostics, Strategy,
};
use crate::normalize::{char_len, normalize_for_prompt, truncate_chars, word_count};
use crate::transcript::{format_timed_text, transcript_stats, TranscriptResolution};

#[derive(Debug, Clone)]
pub struct FinalizeInput {
    pub url: String,
    pub base_content: String,
    pub max_characters: Option<usize>,
    pub metadata: PageMetadata,
    pub transcript: TranscriptResolution,
    pub strategy: Strategy,
    pub firecrawl: FirecrawlDiagnostics,
    pub markdown: MarkdownDiagnostics,
    pub attempts: Vec<AttemptRecord>,
}

/// Normalize, measure, then truncate; truncation is always the last step.
pub fn finalize_extracted_link_content(input: FinalizeInput) -> ExtractedLinkContent {
    let normalized = normalize_for_prompt(&input.base_content);
    let total_characters = char_len(&normalized);
    let words = word_count(&normalized);

    let (content, truncated) = match input.max_characters {
        Some(cap) => truncate_chars(&normalized, cap),
        None => (normalized, false),
    };

    let transcript = input.transcript;
    let stats = transcript.text.as_deref().map(transcript_stats);
    let has_transcript = stats.is_some();

    ExtractedLinkContent {
        url: input.url,
        title: input.metadata.title,
        description: input.metadata.description,
        site_name: input.metadata.site_name,
        content,
        truncated,
        total_characters,
        word_count: words,
        transcript_source: transcript.source.filter(|_| has_transcript),
        transcription_provider: transcript.provider.filter(|_| has_transcript),
        transcript_characters: stats.map(|s| s.characters),
        transcript_word_count: stats.map(|s| s.words),
        transcript_lines: stats.map(|s| s.lines),
        transcript_timed_text: if has_transcript {
            format_timed_text(&transcript.segments)
        } else {
            None
        },
        media_duration_seconds: transcript.media_duration_seconds,
        diagnostics: ContentDiagnostics {
            strategy: input.strategy,
            firecrawl: input.firecrawl,
            markdown: input.markdown,
            transcript: transcript.diagnostics,
            attempts: input.attempts,
        },
    }
}

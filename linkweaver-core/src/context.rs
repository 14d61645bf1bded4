//! Context selection for ranked candidates.
//!
//! Each candidate first looks for the best existing sentence on the source
//! page that mentions the destination's keywords. When no sentence mentions
//! any keyword, a snippet is requested from the injected generator, and when
//! that fails the deterministic template sentence is used. No failure here
//! ever reaches the caller.

use crate::config::DEFAULT_EXCERPT_CHARS;
use crate::events::{EventSink, PipelineEvent};
use crate::generator::{SnippetGenerator, SnippetRequest, UnavailableGenerator, clean_snippet};
use crate::model::{LinkCandidate, LinkContext, LinkRecommendation, Page};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Split text into sentences at whitespace following `.` or `?`.
///
/// No split happens after `x.y.` style abbreviations or after a capitalized
/// two-letter abbreviation such as `Mr.` or `Dr.`.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    for k in 1..chars.len() {
        let (byte, c) = chars[k];
        if !c.is_whitespace() {
            continue;
        }
        let prev = chars[k - 1].1;
        if prev != '.' && prev != '?' {
            continue;
        }
        if follows_abbreviation(&chars, k) {
            continue;
        }
        sentences.push(&text[start..byte]);
        start = byte + c.len_utf8();
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn follows_abbreviation(chars: &[(usize, char)], k: usize) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    // e.g. / i.e.
    if k >= 4 && is_word(chars[k - 4].1) && chars[k - 3].1 == '.' && is_word(chars[k - 2].1) {
        return true;
    }
    // Mr. / Dr.
    k >= 3
        && chars[k - 3].1.is_ascii_uppercase()
        && chars[k - 2].1.is_ascii_lowercase()
        && chars[k - 1].1 == '.'
}

/// Case-insensitive, non-overlapping keyword occurrences in `sentence`.
pub fn keyword_score(sentence: &str, keywords: &[String]) -> usize {
    let haystack = sentence.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| haystack.matches(k.to_lowercase().as_str()).count())
        .sum()
}

/// The first sentence with the highest keyword score, or `None` when no
/// sentence mentions any keyword.
pub fn best_existing_sentence<'a>(text: &'a str, keywords: &[String]) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;
    for sentence in split_sentences(text) {
        let score = keyword_score(sentence, keywords);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((sentence, score));
        }
    }
    best.map(|(sentence, _)| sentence)
}

/// The leading `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Attaches a context sentence to every ranked candidate.
pub struct ContextSelector {
    generator: Arc<dyn SnippetGenerator>,
    excerpt_chars: usize,
    concurrency: usize,
    events: EventSink,
}

impl ContextSelector {
    pub fn new(generator: Arc<dyn SnippetGenerator>) -> Self {
        Self {
            generator,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            concurrency: 1,
            events: EventSink::default(),
        }
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Choose the context for one candidate.
    pub async fn select(
        &self,
        candidate: &LinkCandidate,
        source_text: &str,
        keywords: &[String],
    ) -> LinkContext {
        if let Some(sentence) = best_existing_sentence(source_text, keywords) {
            return LinkContext::existing(sentence);
        }

        let request = SnippetRequest {
            excerpt: excerpt(source_text, self.excerpt_chars),
            anchor_text: candidate.anchor_text.clone(),
        };
        match self.generator.generate(&request).await {
            Ok(reply) => match clean_snippet(&reply) {
                Some(sentence) => LinkContext::Generated(sentence),
                None => {
                    self.report_generation_failure(candidate, "empty snippet".to_string());
                    LinkContext::template(&candidate.anchor_text)
                }
            },
            Err(e) => {
                self.report_generation_failure(candidate, e.to_string());
                LinkContext::template(&candidate.anchor_text)
            }
        }
    }

    /// Finalize candidates into recommendations, preserving their order.
    pub async fn attach_contexts(
        &self,
        candidates: Vec<LinkCandidate>,
        pages: &[Page],
    ) -> Vec<LinkRecommendation> {
        let by_path: HashMap<&str, &Page> = pages.iter().map(|p| (p.path.as_str(), p)).collect();

        stream::iter(candidates)
            .map(|candidate| {
                let source_text = by_path
                    .get(candidate.source.as_str())
                    .and_then(|p| p.text.as_deref())
                    .unwrap_or_default();
                let keywords: &[String] = by_path
                    .get(candidate.destination.as_str())
                    .map(|p| p.keywords.as_slice())
                    .unwrap_or_default();
                async move {
                    let context = self.select(&candidate, source_text, keywords).await;
                    debug!(
                        "Context for {} -> {}: {}",
                        candidate.source,
                        candidate.destination,
                        context.kind()
                    );
                    self.events.emit(PipelineEvent::ContextSelected {
                        source: candidate.source.clone(),
                        destination: candidate.destination.clone(),
                        kind: context.kind(),
                    });
                    LinkRecommendation { candidate, context }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    fn report_generation_failure(&self, candidate: &LinkCandidate, error: String) {
        warn!(
            "Snippet generation failed for {} -> {}: {}",
            candidate.source, candidate.destination, error
        );
        self.events.emit(PipelineEvent::GenerationFailed {
            source: candidate.source.clone(),
            destination: candidate.destination.clone(),
            error,
        });
    }
}

impl Default for ContextSelector {
    fn default() -> Self {
        Self::new(Arc::new(UnavailableGenerator))
    }
}

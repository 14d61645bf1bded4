// Data model shared by every pipeline stage

use serde::{Deserialize, Serialize, Serializer};

pub const EXISTING_CONTEXT_PREFIX: &str = "ADD TO EXISTING CONTENT";

/// One caller-supplied page annotation.
///
/// Keywords are a typed list; nothing is ever evaluated from text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    #[serde(alias = "URL", alias = "path", default)]
    pub url: String,
    #[serde(alias = "Keywords", default)]
    pub keywords: Vec<String>,
    #[serde(alias = "Anchor Text", default, skip_serializing_if = "Option::is_none")]
    pub anchor_text: Option<String>,
    #[serde(alias = "Priority Score", default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

impl PageRecord {
    pub fn new(url: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            url: url.into(),
            keywords,
            anchor_text: None,
            priority: None,
        }
    }

    pub fn with_anchor_text(mut self, anchor_text: impl Into<String>) -> Self {
        self.anchor_text = Some(anchor_text.into());
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A page as it moves through the pipeline. Text and embedding are filled in
/// place and never recomputed once present.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub path: String,
    pub keywords: Vec<String>,
    pub anchor_text: String,
    pub priority: f64,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl Page {
    pub fn from_record(record: &PageRecord, default_priority: f64) -> Self {
        let path = record.url.trim().to_string();
        let keywords: Vec<String> = record
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let priority = record
            .priority
            .filter(|p| p.is_finite())
            .unwrap_or(default_priority);
        let anchor_text = derive_anchor_text(&path, record.anchor_text.as_deref(), &keywords);

        Self {
            path,
            keywords,
            anchor_text,
            priority,
            text: None,
            embedding: None,
        }
    }

    /// True when the page has non-blank normalized text to embed.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Anchor text for a destination: explicit value, then first keyword, then a
/// label built from the last path segment, then the path itself.
pub fn derive_anchor_text(path: &str, explicit: Option<&str>, keywords: &[String]) -> String {
    if let Some(anchor) = explicit.map(str::trim).filter(|a| !a.is_empty()) {
        return anchor.to_string();
    }
    if let Some(keyword) = keywords.iter().map(|k| k.trim()).find(|k| !k.is_empty()) {
        return keyword.to_string();
    }

    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    let label = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let label = label
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(label);
    let label = label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if label.is_empty() {
        path.to_string()
    } else {
        label
    }
}

/// A proposed source -> destination link before context selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkCandidate {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Anchor Text")]
    pub anchor_text: String,
    #[serde(rename = "Priority Score")]
    pub priority: f64,
    #[serde(rename = "Similarity Score")]
    pub similarity: f64,
}

/// Where a recommendation's context sentence came from.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkContext {
    /// A sentence already on the source page, rendered with the insertion marker.
    Existing(String),
    /// A sentence written by the snippet generator.
    Generated(String),
    /// The deterministic fallback sentence.
    Template(String),
}

impl LinkContext {
    pub fn existing(sentence: &str) -> Self {
        LinkContext::Existing(format!("{}: '{}'", EXISTING_CONTEXT_PREFIX, sentence))
    }

    pub fn template(anchor_text: &str) -> Self {
        LinkContext::Template(format!("Learn more about {}.", anchor_text))
    }

    pub fn text(&self) -> &str {
        match self {
            LinkContext::Existing(text)
            | LinkContext::Generated(text)
            | LinkContext::Template(text) => text,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LinkContext::Existing(_) => "existing",
            LinkContext::Generated(_) => "generated",
            LinkContext::Template(_) => "template",
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, LinkContext::Existing(_))
    }
}

impl Serialize for LinkContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.text())
    }
}

/// A finalized candidate. This is the pipeline's output unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecommendation {
    #[serde(flatten)]
    pub candidate: LinkCandidate,
    #[serde(rename = "Context")]
    pub context: LinkContext,
}

impl LinkRecommendation {
    pub fn source(&self) -> &str {
        &self.candidate.source
    }

    pub fn destination(&self) -> &str {
        &self.candidate.destination
    }
}

/// Per-stage counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages_requested: usize,
    pub pages_skipped: usize,
    pub pages_excluded: usize,
    pub pages_fetched: usize,
    pub pages_embedded: usize,
    pub similarity_pairs: usize,
    pub candidates_considered: usize,
    pub candidates_kept: usize,
    pub contexts_existing: usize,
    pub contexts_generated: usize,
    pub contexts_template: usize,
}

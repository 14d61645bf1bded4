use crate::config::PipelineConfig;
use crate::context::ContextSelector;
use crate::error::{PipelineError, Result};
use crate::events::{EventCallback, EventSink, PipelineEvent, Stage};
use crate::generator::{SnippetGenerator, UnavailableGenerator};
use crate::model::{LinkRecommendation, Page, PageRecord, RunSummary};
use crate::ranker::rank;
use crate::similarity::{Embedder, HashingEmbedder, SimilarityEngine, load_default_embedder};
use linkweaver_scanner::{FetchEvent, Fetcher};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Everything a run produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub summary: RunSummary,
    pub recommendations: Vec<LinkRecommendation>,
}

/// Fetch -> extract -> embed -> rank -> select context, one stage at a time.
pub struct Pipeline {
    config: PipelineConfig,
    /// Loaded lazily from the sentence model when not injected
    embedder: Option<Arc<dyn Embedder>>,
    embedding_cache_dir: Option<PathBuf>,
    generator: Arc<dyn SnippetGenerator>,
    events: EventSink,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            embedder: None,
            embedding_cache_dir: None,
            generator: Arc::new(UnavailableGenerator),
            events: EventSink::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Where the sentence model is cached when it has to be loaded.
    pub fn with_embedding_cache_dir(mut self, dir: PathBuf) -> Self {
        self.embedding_cache_dir = Some(dir);
        self
    }

    pub fn with_snippet_generator(mut self, generator: Arc<dyn SnippetGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.events = EventSink::new(Some(callback));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch every page under `base_url` and produce ranked recommendations.
    ///
    /// Only invalid configuration or structurally invalid input fails, and
    /// that happens before any request is sent.
    pub async fn run(&self, base_url: &str, records: &[PageRecord]) -> Result<PipelineReport> {
        self.config.validate()?;
        validate_base_url(base_url)?;
        let mut summary = RunSummary::default();
        let pages = self.prepare_pages(records, &mut summary)?;

        let fetcher = Fetcher::with_timeout(self.config.timeout_secs)?
            .with_concurrency(self.config.concurrency)?
            .with_event_callback(self.fetch_callback());

        self.events.emit(PipelineEvent::StageStarted {
            stage: Stage::Fetch,
            items: pages.len(),
        });
        let paths: Vec<String> = pages.iter().map(|p| p.path.clone()).collect();
        let texts = fetcher.fetch_texts(base_url, &paths).await;
        self.events.emit(PipelineEvent::StageCompleted {
            stage: Stage::Fetch,
            items: texts.len(),
        });

        Ok(self.analyze(pages, texts, summary).await)
    }

    /// Run every stage after fetching on text the caller already has.
    /// Pages missing from `texts` are treated as failed fetches.
    pub async fn run_with_texts(
        &self,
        records: &[PageRecord],
        texts: HashMap<String, String>,
    ) -> Result<PipelineReport> {
        self.config.validate()?;
        let mut summary = RunSummary::default();
        let pages = self.prepare_pages(records, &mut summary)?;
        Ok(self.analyze(pages, texts, summary).await)
    }

    /// Validate records into pages, dropping blank, duplicate and excluded
    /// paths.
    pub fn prepare_pages(
        &self,
        records: &[PageRecord],
        summary: &mut RunSummary,
    ) -> Result<Vec<Page>> {
        if records.is_empty() {
            return Err(PipelineError::NoRecords);
        }
        let exclusions = self.config.compile_exclusions()?;

        let mut seen = HashSet::new();
        let mut valid = 0usize;
        let mut pages = Vec::new();
        summary.pages_requested = records.len();

        for (index, record) in records.iter().enumerate() {
            let page = Page::from_record(record, self.config.default_priority);
            if page.path.is_empty() {
                self.skip_record(index, "missing url".to_string(), summary);
                continue;
            }
            if !seen.insert(page.path.clone()) {
                self.skip_record(index, format!("duplicate url {}", page.path), summary);
                continue;
            }
            valid += 1;

            if let Some(pattern) = matching_exclusion(&exclusions, &page.path) {
                info!("Excluding {} (matches {})", page.path, pattern);
                summary.pages_excluded += 1;
                self.events.emit(PipelineEvent::PageExcluded {
                    path: page.path.clone(),
                    pattern: pattern.to_string(),
                });
                continue;
            }
            pages.push(page);
        }

        if valid == 0 {
            return Err(PipelineError::NoValidRecords(records.len()));
        }
        Ok(pages)
    }

    async fn analyze(
        &self,
        mut pages: Vec<Page>,
        mut texts: HashMap<String, String>,
        mut summary: RunSummary,
    ) -> PipelineReport {
        for page in &mut pages {
            page.text = texts.remove(&page.path);
        }
        summary.pages_fetched = pages.iter().filter(|p| p.text.is_some()).count();
        info!("{} of {} pages have content", summary.pages_fetched, pages.len());

        // Embed
        self.events.emit(PipelineEvent::StageStarted {
            stage: Stage::Embed,
            items: summary.pages_fetched,
        });
        let engine = SimilarityEngine::new(self.embedder_for_run(&pages).await);
        for (path, error) in engine.embed_pages(&mut pages).await {
            self.events.emit(PipelineEvent::EmbeddingFailed {
                path,
                error: error.to_string(),
            });
        }
        summary.pages_embedded = pages.iter().filter(|p| p.embedding.is_some()).count();
        let table = engine.similarity_table(&pages);
        summary.similarity_pairs = table.len();
        self.events.emit(PipelineEvent::StageCompleted {
            stage: Stage::Embed,
            items: summary.pages_embedded,
        });

        // Rank
        self.events.emit(PipelineEvent::StageStarted {
            stage: Stage::Rank,
            items: table.len(),
        });
        let ranking = rank(&pages, &table, &self.config.ranking());
        summary.candidates_considered = ranking.considered;
        summary.candidates_kept = ranking.candidates.len();
        self.events.emit(PipelineEvent::StageCompleted {
            stage: Stage::Rank,
            items: ranking.candidates.len(),
        });
        info!(
            "Ranking kept {} of {} candidates",
            summary.candidates_kept, summary.candidates_considered
        );

        // Context
        self.events.emit(PipelineEvent::StageStarted {
            stage: Stage::Context,
            items: ranking.candidates.len(),
        });
        let selector = ContextSelector::new(self.generator.clone())
            .with_excerpt_chars(self.config.excerpt_chars)
            .with_concurrency(self.config.concurrency)
            .with_events(self.events.clone());
        let recommendations = selector.attach_contexts(ranking.candidates, &pages).await;
        for recommendation in &recommendations {
            match recommendation.context.kind() {
                "existing" => summary.contexts_existing += 1,
                "generated" => summary.contexts_generated += 1,
                _ => summary.contexts_template += 1,
            }
        }
        self.events.emit(PipelineEvent::StageCompleted {
            stage: Stage::Context,
            items: recommendations.len(),
        });

        info!("Run complete: {} recommendations", recommendations.len());
        PipelineReport {
            summary,
            recommendations,
        }
    }

    /// The injected embedder, or the sentence model loaded once for this run.
    /// Nothing is loaded when no page has text to embed.
    async fn embedder_for_run(&self, pages: &[Page]) -> Arc<dyn Embedder> {
        if let Some(ref embedder) = self.embedder {
            return embedder.clone();
        }
        if !pages.iter().any(Page::has_text) {
            return Arc::new(HashingEmbedder::default());
        }
        let cache_dir = self.embedding_cache_dir.clone();
        match tokio::task::spawn_blocking(move || load_default_embedder(cache_dir)).await {
            Ok(embedder) => embedder,
            Err(e) => {
                warn!("Embedding model loader failed: {}", e);
                Arc::new(HashingEmbedder::default())
            }
        }
    }

    fn skip_record(&self, index: usize, reason: String, summary: &mut RunSummary) {
        warn!("Skipping record {}: {}", index, reason);
        summary.pages_skipped += 1;
        self.events.emit(PipelineEvent::RecordSkipped { index, reason });
    }

    fn fetch_callback(&self) -> Arc<dyn Fn(FetchEvent) + Send + Sync> {
        let events = self.events.clone();
        Arc::new(move |event: FetchEvent| events.emit(PipelineEvent::Fetch(event)))
    }
}

/// The origin must be an absolute http(s) URL.
pub fn validate_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| PipelineError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::InvalidBaseUrl(format!(
            "{}: scheme must be http or https",
            base_url
        )));
    }
    Ok(url)
}

fn matching_exclusion<'a>(patterns: &'a [Regex], path: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| pattern.is_match(path))
        .map(Regex::as_str)
}

//! Page embeddings and the pairwise similarity table.
//!
//! Pages are embedded with the `all-MiniLM-L6-v2` sentence transformer run
//! locally by fastembed. When the model cannot be loaded (no network on
//! first use, missing cache) the deterministic [`HashingEmbedder`] takes its
//! place. Its scores reflect word overlap only and sit well below the model's
//! for related pages.
//!
//! Embedding is CPU-bound and runs on Tokio's blocking pool. The embedder is
//! shared behind an `Arc` for the whole run.

use crate::error::EmbeddingError;
use crate::model::Page;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Output size of `all-MiniLM-L6-v2`; the hashing fallback matches it.
pub const DEFAULT_DIMENSION: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const BIGRAM_WEIGHT: f32 = 0.5;

const STOP_WORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "we", "were", "will",
    "with", "you", "your",
];

/// Turns normalized text into a fixed-dimension vector.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Sentence-transformer embedder backed by fastembed's ONNX runtime.
///
/// `TextEmbedding::embed` takes `&mut self`, so the model lives in a `Mutex`.
/// Calls come from the blocking pool one page at a time.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedEmbedder {
    /// Load `all-MiniLM-L6-v2`, downloading it into fastembed's default
    /// cache on first use.
    pub fn try_new() -> Result<Self, EmbeddingError> {
        Self::load(None)
    }

    /// Load the model from (or download it into) `cache_dir`.
    pub fn with_cache_dir(cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        Self::load(Some(cache_dir))
    }

    fn load(cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        info!("Loaded embedding model all-MiniLM-L6-v2");
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::Worker("embedding model lock poisoned".to_string()))?;
        let mut vectors = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Model("model returned no vector".to_string()))
    }
}

/// The sentence-transformer embedder, or the hashing fallback when the model
/// cannot be loaded. Blocks while the model loads; call it off the runtime.
pub fn load_default_embedder(cache_dir: Option<PathBuf>) -> Arc<dyn Embedder> {
    let loaded = match cache_dir {
        Some(dir) => FastEmbedEmbedder::with_cache_dir(dir),
        None => FastEmbedEmbedder::try_new(),
    };
    match loaded {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => {
            warn!(
                "{}; falling back to the hashing embedder, similarity scores will be lower",
                e
            );
            Arc::new(HashingEmbedder::default())
        }
    }
}

/// Feature-hashing embedder over word unigrams and bigrams.
///
/// Deterministic and offline. Used when the sentence model is unavailable
/// and in tests; it measures shared vocabulary, not meaning.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        // BTreeMap keeps the accumulation order, and so the float result, stable
        let mut features: BTreeMap<String, (f32, u32)> = BTreeMap::new();
        for token in &tokens {
            features.entry(format!("u:{}", token)).or_insert((1.0, 0)).1 += 1;
        }
        for pair in tokens.windows(2) {
            features
                .entry(format!("b:{} {}", pair[0], pair[1]))
                .or_insert((BIGRAM_WEIGHT, 0))
                .1 += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, (weight, count)) in &features {
            let hash = fnv1a(feature.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight * (1.0 + (*count as f32).ln());
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::EmptyText);
        }
        if !norm.is_finite() {
            return Err(EmbeddingError::NonFinite);
        }
        for value in &mut vector {
            *value /= norm;
        }
        Ok(vector)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Cosine similarity in `[-1, 1]`, or `None` when it is undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}

/// Symmetric similarity scores between distinct, embedded pages.
#[derive(Debug, Clone, Default)]
pub struct SimilarityTable {
    paths: Vec<String>,
    index: HashMap<String, usize>,
    scores: BTreeMap<(usize, usize), f64>,
}

impl SimilarityTable {
    /// Score every unordered pair of pages that both carry an embedding.
    pub fn build(pages: &[Page]) -> Self {
        let paths: Vec<String> = pages.iter().map(|p| p.path.clone()).collect();
        let index = paths
            .iter()
            .enumerate()
            .map(|(i, path)| (path.clone(), i))
            .collect();

        let mut scores = BTreeMap::new();
        for (i, a) in pages.iter().enumerate() {
            let Some(ref left) = a.embedding else { continue };
            for (j, b) in pages.iter().enumerate().skip(i + 1) {
                let Some(ref right) = b.embedding else { continue };
                if a.path == b.path {
                    continue;
                }
                if let Some(score) = cosine_similarity(left, right) {
                    scores.insert((i, j), score);
                }
            }
        }

        debug!("Built similarity table with {} pairs", scores.len());
        Self {
            paths,
            index,
            scores,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        self.get_by_index(i, j)
    }

    pub(crate) fn get_by_index(&self, i: usize, j: usize) -> Option<f64> {
        if i == j {
            return None;
        }
        self.scores.get(&(i.min(j), i.max(j))).copied()
    }

    /// Unordered pairs in page input order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.scores
            .iter()
            .map(|(&(i, j), &score)| (self.paths[i].as_str(), self.paths[j].as_str(), score))
    }

    pub fn involves(&self, path: &str) -> bool {
        self.pairs().any(|(a, b, _)| a == path || b == path)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Embeds pages on the blocking pool and builds the similarity table.
#[derive(Clone)]
pub struct SimilarityEngine {
    embedder: Arc<dyn Embedder>,
}

impl SimilarityEngine {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Fill in the embedding of every page that has text and no embedding
    /// yet. Failures leave the page without an embedding and are returned as
    /// `(path, error)`.
    pub async fn embed_pages(&self, pages: &mut [Page]) -> Vec<(String, EmbeddingError)> {
        let pending: Vec<(usize, String)> = pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.embedding.is_none())
            .filter_map(|(i, page)| page.text.clone().map(|text| (i, text)))
            .collect();

        if pending.is_empty() {
            return Vec::new();
        }

        info!("Embedding {} pages", pending.len());

        let embedder = self.embedder.clone();
        let indices: Vec<usize> = pending.iter().map(|(i, _)| *i).collect();
        let outcome = tokio::task::spawn_blocking(move || {
            pending
                .into_iter()
                .map(|(i, text)| (i, embed_checked(embedder.as_ref(), &text)))
                .collect::<Vec<_>>()
        })
        .await;

        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                warn!("Embedding worker failed: {}", e);
                indices
                    .into_iter()
                    .map(|i| (i, Err(EmbeddingError::Worker(e.to_string()))))
                    .collect()
            }
        };

        let mut failures = Vec::new();
        for (i, result) in results {
            match result {
                Ok(vector) => pages[i].embedding = Some(vector),
                Err(e) => {
                    warn!("Embedding failed for {}: {}", pages[i].path, e);
                    failures.push((pages[i].path.clone(), e));
                }
            }
        }
        failures
    }

    pub fn similarity_table(&self, pages: &[Page]) -> SimilarityTable {
        SimilarityTable::build(pages)
    }
}

fn embed_checked(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::EmptyText);
    }
    let vector = embedder.embed(text)?;
    if vector.len() != embedder.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: embedder.dimension(),
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFinite);
    }
    Ok(vector)
}

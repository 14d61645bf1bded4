// Candidate generation, threshold filtering and capping

use crate::config::{
    DEFAULT_MAX_LINKS, DEFAULT_OUTPUT_CAP, DEFAULT_PRIORITY_THRESHOLD,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::model::{LinkCandidate, Page};
use crate::similarity::SimilarityTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub max_links: usize,
    pub priority_threshold: f64,
    pub similarity_threshold: f64,
    pub output_cap: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            output_cap: DEFAULT_OUTPUT_CAP,
        }
    }
}

/// Candidates produced by one ranking pass.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Every ordered pair with a defined similarity, before filtering
    pub considered: usize,
    pub candidates: Vec<LinkCandidate>,
}

/// Run the full ranking pass: generate, filter, cap per source, truncate.
pub fn rank(pages: &[Page], table: &SimilarityTable, config: &RankingConfig) -> Ranking {
    let all = generate_candidates(pages, table);
    let considered = all.len();

    let filtered = filter_candidates(all, config);
    let capped = cap_per_source(filtered, config.max_links);
    let candidates = truncate_by_priority(capped, config.output_cap);

    debug!(
        "Ranking kept {} of {} candidates (max_links={}, cap={})",
        candidates.len(),
        considered,
        config.max_links,
        config.output_cap
    );

    Ranking {
        considered,
        candidates,
    }
}

/// One candidate per ordered (source, destination) pair with a similarity
/// score, source-major in page input order.
pub fn generate_candidates(pages: &[Page], table: &SimilarityTable) -> Vec<LinkCandidate> {
    let mut candidates = Vec::new();
    for (i, source) in pages.iter().enumerate() {
        for (j, destination) in pages.iter().enumerate() {
            if i == j || source.path == destination.path {
                continue;
            }
            let Some(similarity) = table.get_by_index(i, j) else {
                continue;
            };
            candidates.push(LinkCandidate {
                source: source.path.clone(),
                destination: destination.path.clone(),
                anchor_text: destination.anchor_text.clone(),
                priority: destination.priority,
                similarity,
            });
        }
    }
    candidates
}

/// Keep candidates strictly above both thresholds.
pub fn filter_candidates(
    candidates: Vec<LinkCandidate>,
    config: &RankingConfig,
) -> Vec<LinkCandidate> {
    candidates
        .into_iter()
        .filter(|c| {
            c.priority > config.priority_threshold && c.similarity > config.similarity_threshold
        })
        .collect()
}

/// Keep at most `max_links` candidates per source, highest priority first.
/// Ties keep their incoming order; survivors stay in incoming order.
pub fn cap_per_source(candidates: Vec<LinkCandidate>, max_links: usize) -> Vec<LinkCandidate> {
    let mut by_source: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        by_source.entry(candidate.source.as_str()).or_default().push(idx);
    }

    let mut keep: HashSet<usize> = HashSet::new();
    for indices in by_source.values_mut() {
        indices.sort_by(|&a, &b| candidates[b].priority.total_cmp(&candidates[a].priority));
        keep.extend(indices.iter().take(max_links).copied());
    }

    candidates
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, candidate)| candidate)
        .collect()
}

/// Stable sort by priority descending, then keep at most `output_cap`.
pub fn truncate_by_priority(
    mut candidates: Vec<LinkCandidate>,
    output_cap: usize,
) -> Vec<LinkCandidate> {
    candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    candidates.truncate(output_cap);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageRecord;

    fn page(path: &str, priority: f64, embedding: Vec<f32>) -> Page {
        let record = PageRecord::new(path, vec![format!("{} topic", path)]).with_priority(priority);
        let mut page = Page::from_record(&record, 1.0);
        page.embedding = Some(embedding);
        page
    }

    fn candidate(source: &str, destination: &str, priority: f64) -> LinkCandidate {
        LinkCandidate {
            source: source.into(),
            destination: destination.into(),
            anchor_text: destination.into(),
            priority,
            similarity: 0.9,
        }
    }

    #[test]
    fn test_max_links_keeps_highest_priority() {
        let pages = vec![
            page("/a", 0.5, vec![1.0, 0.0]),
            page("/b", 0.9, vec![1.0, 0.1]),
            page("/c", 0.8, vec![1.0, 0.05]),
            page("/d", 0.75, vec![1.0, 0.02]),
        ];
        let table = SimilarityTable::build(&pages);
        let config = RankingConfig {
            max_links: 1,
            ..Default::default()
        };

        let ranking = rank(&pages, &table, &config);
        let from_a: Vec<_> = ranking
            .candidates
            .iter()
            .filter(|c| c.source == "/a")
            .collect();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].destination, "/b");
        assert_eq!(from_a[0].priority, 0.9);
        assert_eq!(ranking.considered, 12);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let candidates = vec![
            LinkCandidate {
                priority: 0.7,
                ..candidate("/a", "/b", 0.7)
            },
            LinkCandidate {
                similarity: 0.65,
                ..candidate("/a", "/c", 0.9)
            },
            candidate("/a", "/d", 0.71),
        ];
        let kept = filter_candidates(candidates, &RankingConfig::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].destination, "/d");
    }

    #[test]
    fn test_cap_tie_break_keeps_pairwise_order() {
        let candidates = vec![
            candidate("/a", "/x", 0.8),
            candidate("/b", "/x", 0.9),
            candidate("/a", "/y", 0.8),
            candidate("/a", "/z", 0.95),
        ];
        let capped = cap_per_source(candidates, 2);
        let pairs: Vec<_> = capped
            .iter()
            .map(|c| (c.source.as_str(), c.destination.as_str()))
            .collect();
        assert_eq!(pairs, vec![("/a", "/x"), ("/b", "/x"), ("/a", "/z")]);
    }

    #[test]
    fn test_output_sorted_and_truncated() {
        let candidates: Vec<_> = (0..10)
            .map(|i| candidate(&format!("/s{}", i), "/d", 0.71 + f64::from(i) * 0.01))
            .collect();
        let out = truncate_by_priority(candidates, 4);
        assert_eq!(out.len(), 4);
        assert!(out.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert_eq!(out[0].source, "/s9");
    }

    #[test]
    fn test_no_survivors_is_empty_not_error() {
        let pages = vec![page("/a", 0.1, vec![1.0, 0.0]), page("/b", 0.2, vec![1.0, 0.0])];
        let table = SimilarityTable::build(&pages);
        let ranking = rank(&pages, &table, &RankingConfig::default());
        assert!(ranking.candidates.is_empty());
        assert_eq!(ranking.considered, 2);
    }

    #[test]
    fn test_pages_without_similarity_never_appear() {
        let mut pages = vec![
            page("/a", 0.9, vec![1.0, 0.0]),
            page("/b", 0.9, vec![1.0, 0.0]),
            page("/c", 0.9, vec![1.0, 0.0]),
        ];
        pages[1].embedding = None;
        let table = SimilarityTable::build(&pages);
        let ranking = rank(&pages, &table, &RankingConfig::default());
        assert_eq!(ranking.candidates.len(), 2);
        assert!(
            ranking
                .candidates
                .iter()
                .all(|c| c.source != "/b" && c.destination != "/b")
        );
        assert!(ranking.candidates.iter().all(|c| c.source != c.destination));
    }
}

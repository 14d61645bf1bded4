// Pipeline configuration and validation

use crate::error::{PipelineError, Result};
use crate::ranker::RankingConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LINKS: usize = 3;
pub const DEFAULT_CONCURRENCY: usize = linkweaver_scanner::fetcher::DEFAULT_CONCURRENCY;
pub const DEFAULT_PRIORITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.65;
pub const DEFAULT_OUTPUT_CAP: usize = 500;
pub const DEFAULT_PRIORITY: f64 = 1.0;
pub const DEFAULT_EXCERPT_CHARS: usize = 100;

/// Options for configuring a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum recommendations per source page
    pub max_links: usize,
    /// Simultaneous fetch and snippet requests
    pub concurrency: usize,
    pub priority_threshold: f64,
    pub similarity_threshold: f64,
    /// Ceiling on the final recommendation count
    pub output_cap: usize,
    /// Priority assumed for pages that carry none
    pub default_priority: f64,
    pub timeout_secs: u64,
    /// Regular expressions; matching paths are dropped before fetching
    pub exclude_patterns: Vec<String>,
    /// Characters of source text handed to the snippet generator
    pub excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            concurrency: DEFAULT_CONCURRENCY,
            priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            output_cap: DEFAULT_OUTPUT_CAP,
            default_priority: DEFAULT_PRIORITY,
            timeout_secs: linkweaver_scanner::fetcher::DEFAULT_TIMEOUT_SECS,
            exclude_patterns: Vec::new(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_links == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_links must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.output_cap == 0 {
            return Err(PipelineError::InvalidConfig(
                "output_cap must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("priority_threshold", self.priority_threshold),
            ("similarity_threshold", self.similarity_threshold),
            ("default_priority", self.default_priority),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }
        self.compile_exclusions()?;
        Ok(())
    }

    pub fn compile_exclusions(&self) -> Result<Vec<Regex>> {
        self.exclude_patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|pattern| {
                Regex::new(pattern.trim()).map_err(|e| {
                    PipelineError::InvalidConfig(format!(
                        "invalid exclude pattern '{}': {}",
                        pattern, e
                    ))
                })
            })
            .collect()
    }

    pub fn ranking(&self) -> RankingConfig {
        RankingConfig {
            max_links: self.max_links,
            priority_threshold: self.priority_threshold,
            similarity_threshold: self.similarity_threshold,
            output_cap: self.output_cap,
        }
    }
}

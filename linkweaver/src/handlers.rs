use anyhow::{Context, Result, bail};
use colored::Colorize;
use indicatif::ProgressBar;
use linkweaver_core::generator::DEFAULT_GENERATION_TIMEOUT_SECS;
use linkweaver_core::{
    EventCallback, OpenAiSnippetGenerator, PageRecord, PipelineEvent, SnippetGenerator,
    UnavailableGenerator,
};
use linkweaver_scanner::FetchEvent;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// Helper functions for the analyze handler

/// Accepted input layouts: a bare array or an object wrapping it.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<PageRecord>),
    Wrapped { pages: Vec<PageRecord> },
}

/// Load and parse page records from a JSON file
pub fn load_records_from_file(path: &Path) -> Result<Vec<PageRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {}", path.display()))?;
    parse_records(&content).with_context(|| format!("Invalid input file {}", path.display()))
}

/// Parse page records from JSON text
pub fn parse_records(content: &str) -> Result<Vec<PageRecord>> {
    if content.trim().is_empty() {
        bail!("input is empty");
    }
    let records = match serde_json::from_str::<RecordFile>(content)
        .context("expected an array of page records or an object with a \"pages\" array")?
    {
        RecordFile::List(records) => records,
        RecordFile::Wrapped { pages } => pages,
    };
    if records.is_empty() {
        bail!("no page records found");
    }
    Ok(records)
}

/// Expand `~` and environment variables in an output path
pub fn expand_output_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand output path {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Pick the snippet generator: the OpenAI client when a key is configured,
/// otherwise one that always reports itself unavailable.
pub fn select_generator(
    api_key: Option<&str>,
    base_url: &str,
    model: &str,
) -> Arc<dyn SnippetGenerator> {
    let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
        return Arc::new(UnavailableGenerator);
    };
    match OpenAiSnippetGenerator::new(
        key,
        base_url,
        model,
        Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
    ) {
        Ok(generator) => {
            info!("Snippet generation enabled with {}", generator.model());
            Arc::new(generator)
        }
        Err(e) => {
            warn!("Snippet generation disabled: {}", e);
            Arc::new(UnavailableGenerator)
        }
    }
}

/// Drive a progress bar from pipeline events.
pub fn progress_callback(bar: ProgressBar) -> EventCallback {
    Arc::new(move |event: PipelineEvent| match event {
        PipelineEvent::StageStarted { stage, items } => {
            bar.reset();
            bar.set_length(items as u64);
            bar.set_prefix(stage.to_string());
            bar.set_message(String::new());
        }
        PipelineEvent::StageCompleted { stage, items } => {
            bar.set_message(format!("{} done ({})", stage, items));
        }
        PipelineEvent::Fetch(FetchEvent::Succeeded { path, .. }) => {
            bar.inc(1);
            bar.set_message(path);
        }
        PipelineEvent::Fetch(FetchEvent::Failed { path, kind, .. }) => {
            bar.inc(1);
            bar.println(format!("  {} {} ({})", "✗".red(), path, kind));
        }
        PipelineEvent::ContextSelected { source, .. } => {
            bar.inc(1);
            bar.set_message(source);
        }
        PipelineEvent::PageExcluded { path, pattern } => {
            bar.println(format!("  {} {} excluded by {}", "-".bright_black(), path, pattern));
        }
        PipelineEvent::RecordSkipped { index, reason } => {
            bar.println(format!("  {} record {}: {}", "⚠".yellow(), index, reason));
        }
        PipelineEvent::EmbeddingFailed { path, error } => {
            bar.println(format!("  {} {} not embedded: {}", "⚠".yellow(), path, error));
        }
        PipelineEvent::Fetch(FetchEvent::Started { .. })
        | PipelineEvent::GenerationFailed { .. } => {}
    })
}

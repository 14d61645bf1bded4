// Structured progress and failure events emitted during a run

use linkweaver_scanner::FetchEvent;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Embed,
    Rank,
    Context,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Embed => "embed",
            Stage::Rank => "rank",
            Stage::Context => "context",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { stage: Stage, items: usize },
    StageCompleted { stage: Stage, items: usize },
    /// Input record dropped during validation (blank or duplicate url)
    RecordSkipped { index: usize, reason: String },
    PageExcluded { path: String, pattern: String },
    Fetch(FetchEvent),
    EmbeddingFailed { path: String, error: String },
    GenerationFailed { source: String, destination: String, error: String },
    ContextSelected { source: String, destination: String, kind: &'static str },
}

/// Callback for observing a run as it progresses
pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Optional callback holder shared by the pipeline stages.
#[derive(Clone, Default)]
pub struct EventSink {
    callback: Option<EventCallback>,
}

impl EventSink {
    pub fn new(callback: Option<EventCallback>) -> Self {
        Self { callback }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

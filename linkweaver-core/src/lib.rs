pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod generator;
pub mod model;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod similarity;

use colored::Colorize;

pub use config::PipelineConfig;
pub use error::{EmbeddingError, GenerationError, PipelineError};
pub use events::{EventCallback, PipelineEvent, Stage};
pub use generator::{OpenAiSnippetGenerator, SnippetGenerator, SnippetRequest, UnavailableGenerator};
pub use model::{LinkCandidate, LinkContext, LinkRecommendation, Page, PageRecord, RunSummary};
pub use pipeline::{Pipeline, PipelineReport};
pub use similarity::{
    Embedder, FastEmbedEmbedder, HashingEmbedder, SimilarityEngine, SimilarityTable,
    load_default_embedder,
};

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "{} {}",
        "linkweaver".bright_cyan().bold(),
        format!("v{}", version).bright_black()
    );
    eprintln!("{}", "internal link recommendations".bright_black());
    eprintln!();
}

use thiserror::Error;

/// Caller-visible failures. Raised before any page is fetched.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("No page records were provided")]
    NoRecords,

    #[error("None of the {0} page records has a usable url")]
    NoValidRecords(usize),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] linkweaver_scanner::FetchError),
}

/// Failure to embed one page. The page is left out of the similarity table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("page has no text to embed")]
    EmptyText,

    #[error("embedding contains non-finite values")]
    NonFinite,

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding worker failed: {0}")]
    Worker(String),

    #[error("failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("embedding model error: {0}")]
    Model(String),
}

/// Failure of the snippet generation service. Always absorbed by the
/// template fallback.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("snippet generator unavailable")]
    Unavailable,

    #[error("snippet request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("snippet service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed snippet response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

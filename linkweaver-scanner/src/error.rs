use thiserror::Error;

/// Why a single page could not be fetched. Always scoped to one URL.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected status code: {0}")]
    Status(u16),

    #[error("Non-text response: {0}")]
    NonText(String),

    #[error("Empty response body")]
    EmptyBody,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Short machine-friendly label, used in events and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http(_) => "http",
            FetchError::Timeout(_) => "timeout",
            FetchError::Status(_) => "status",
            FetchError::NonText(_) => "non_text",
            FetchError::EmptyBody => "empty_body",
            FetchError::InvalidUrl(_) => "invalid_url",
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

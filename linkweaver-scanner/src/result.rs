use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One successfully fetched and extracted page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub path: String,
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_length: usize,
    pub response_time: Duration,
    pub title: Option<String>,
    pub text: String,
}

impl FetchedPage {
    pub fn new(path: String, url: String) -> Self {
        Self {
            path,
            url,
            status_code: 0,
            content_type: None,
            content_length: 0,
            response_time: Duration::from_secs(0),
            title: None,
            text: String::new(),
        }
    }
}

/// Progress signal emitted for every page in a fetch batch.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Started { path: String, url: String },
    Succeeded { path: String, bytes: usize },
    Failed { path: String, url: String, kind: &'static str, error: String },
}

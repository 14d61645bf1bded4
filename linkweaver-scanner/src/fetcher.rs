use crate::error::{FetchError, Result};
use crate::extract::{extract_text, extract_title};
use crate::result::{FetchEvent, FetchedPage};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub type FetchEventCallback = Arc<dyn Fn(FetchEvent) + Send + Sync>;

/// Fetches a fixed list of pages from one origin over a shared connection pool.
pub struct Fetcher {
    client: Client,
    concurrency: usize,
    timeout_secs: u64,
    event_callback: Option<FetchEventCallback>,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        Self::build(timeout_secs, DEFAULT_CONCURRENCY)
    }

    fn build(timeout_secs: u64, concurrency: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(concurrency) // Connection pooling
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            concurrency: concurrency.max(1),
            timeout_secs,
            event_callback: None,
        })
    }

    /// Cap on simultaneous in-flight requests. Rebuilds the pool to match.
    pub fn with_concurrency(self, concurrency: usize) -> Result<Self> {
        let event_callback = self.event_callback;
        let mut fetcher = Self::build(self.timeout_secs, concurrency)?;
        fetcher.event_callback = event_callback;
        Ok(fetcher)
    }

    pub fn with_event_callback(mut self, callback: FetchEventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch every path under `base_url` and return the normalized text of
    /// each page that succeeded. Failed paths are simply absent.
    pub async fn fetch_texts(&self, base_url: &str, paths: &[String]) -> HashMap<String, String> {
        self.fetch_all(base_url, paths)
            .await
            .into_iter()
            .map(|(path, page)| (path, page.text))
            .collect()
    }

    /// Fetch every path under `base_url`, keyed by path. A failure is logged,
    /// reported to the event callback and excluded; it never affects siblings.
    pub async fn fetch_all(&self, base_url: &str, paths: &[String]) -> HashMap<String, FetchedPage> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = paths.iter().filter(|p| seen.insert(p.as_str())).collect();
        let requested = unique.len();

        info!(
            "Fetching {} pages from {} with {} concurrent requests",
            requested, base_url, self.concurrency
        );

        let results: Vec<(String, Option<FetchedPage>)> = stream::iter(unique)
            .map(|path| async move {
                let page = self.fetch_one(base_url, path).await;
                (path.clone(), page)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let pages: HashMap<String, FetchedPage> = results
            .into_iter()
            .filter_map(|(path, page)| page.map(|page| (path, page)))
            .collect();

        info!("Fetch complete. {} of {} pages succeeded", pages.len(), requested);
        pages
    }

    async fn fetch_one(&self, base_url: &str, path: &str) -> Option<FetchedPage> {
        let url = match resolve_target(base_url, path) {
            Ok(url) => url,
            Err(e) => {
                self.report_failure(path, path, e);
                return None;
            }
        };

        self.emit(FetchEvent::Started {
            path: path.to_string(),
            url: url.clone(),
        });

        match self.fetch_and_extract(path, &url).await {
            Ok(page) => {
                self.emit(FetchEvent::Succeeded {
                    path: path.to_string(),
                    bytes: page.content_length,
                });
                Some(page)
            }
            Err(e) => {
                self.report_failure(path, &url, e);
                None
            }
        }
    }

    async fn fetch_and_extract(&self, path: &str, url: &str) -> Result<FetchedPage> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response_time = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(ref ct) = content_type
            && !is_textual(ct)
        {
            return Err(FetchError::NonText(ct.clone()));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let mut page = FetchedPage::new(path.to_string(), url.to_string());
        page.status_code = status.as_u16();
        page.content_type = content_type;
        page.content_length = body.len();
        page.response_time = response_time;
        page.title = extract_title(&body);
        page.text = extract_text(&body);

        debug!(
            "Fetched {} \"{}\" ({} bytes, {} chars of text, {:?})",
            url,
            page.title.as_deref().unwrap_or("untitled"),
            page.content_length,
            page.text.len(),
            page.response_time
        );

        Ok(page)
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else {
            FetchError::Http(error)
        }
    }

    fn report_failure(&self, path: &str, url: &str, error: FetchError) {
        warn!("Fetch error for {}: {}", url, error);
        self.emit(FetchEvent::Failed {
            path: path.to_string(),
            url: url.to_string(),
            kind: error.kind(),
            error: error.to_string(),
        });
    }

    fn emit(&self, event: FetchEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

/// Build the absolute fetch target for `path` under `base_url`.
///
/// Absolute `http(s)` paths are used unchanged; anything else is appended to
/// the origin with its trailing slash removed.
pub fn resolve_target(base_url: &str, path: &str) -> Result<String> {
    let candidate = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    };

    Url::parse(&candidate)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", candidate, e)))?;
    Ok(candidate)
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty()
        || mime.starts_with("text/")
        || mime == "application/xhtml+xml"
        || mime == "application/xml"
}

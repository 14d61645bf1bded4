//! Snippet generation capability used when a source page has no sentence
//! that already mentions the destination.

use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 20;

/// What the generator is asked to write about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnippetRequest {
    /// Short leading excerpt of the source page
    pub excerpt: String,
    /// Text that must appear in the sentence
    pub anchor_text: String,
}

/// Writes one sentence that embeds the anchor text, or fails.
#[async_trait]
pub trait SnippetGenerator: Send + Sync {
    async fn generate(&self, request: &SnippetRequest) -> Result<String, GenerationError>;
}

/// Generator used when no service is configured. Always unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGenerator;

#[async_trait]
impl SnippetGenerator for UnavailableGenerator {
    async fn generate(&self, _request: &SnippetRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable)
    }
}

pub fn snippet_prompt(request: &SnippetRequest) -> String {
    format!(
        "Write a 1-sentence content snippet about '{}' that naturally includes this anchor text: '{}'. Use a professional tone.",
        request.excerpt, request.anchor_text
    )
}

/// Strip surrounding whitespace and quotation marks from a generated reply.
pub fn clean_snippet(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches('"').trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiSnippetGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiSnippetGenerator {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::Unavailable);
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| GenerationError::Malformed(format!("invalid API key: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SnippetGenerator for OpenAiSnippetGenerator {
    async fn generate(&self, request: &SnippetRequest) -> Result<String, GenerationError> {
        let prompt = snippet_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        debug!("Requesting snippet for anchor '{}'", request.anchor_text);
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))?;

        clean_snippet(&content)
            .ok_or_else(|| GenerationError::Malformed("empty snippet".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

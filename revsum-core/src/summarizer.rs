//! Review summarization.
//!
//! The summarizer turns an entry's reviews into a localized four-section
//! summary. Its raw text output is validated by [`SummaryPayload::parse`]
//! before anything is written to the platform.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::error::{ConfigError, SummaryError};
use crate::types::{DisplayReview, Locale, LocalizedText, SummaryPayload};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Older records and prompts spell the observation section this way.
const LEGACY_OBSERVATION_KEY: &str = "noteableObservation";

pub const SUMMARY_PROMPT: &str = r#"You are a bot that summarizes product reviews. The reviews arrive as a JSON array of objects with "title", "review" and "score" fields. Analyze the comments and produce a brief summary.

Summarize the comments into four sections: "summary", "commonPositive", "commonNegative" and "notableObservation". No section may exceed 3 sentences.

Write every section in each of these languages: tr, en, fr, de, nl.

Ignore discriminatory, rude or abusive comments.

Reply with a single compact JSON object, all values strings, with no surrounding text and no extra whitespace:

{"summary":{"tr":"","en":"","fr":"","de":"","nl":""},"commonPositive":{"tr":"","en":"","fr":"","de":"","nl":""},"commonNegative":{"tr":"","en":"","fr":"","de":"","nl":""},"notableObservation":{"tr":"","en":"","fr":"","de":"","nl":""}}"#;

#[async_trait]
pub trait ReviewSummarizer: Send + Sync {
    /// Produce the raw summary text for one entry's reviews.
    async fn summarize(&self, reviews: &[DisplayReview]) -> Result<String, SummaryError>;
}

impl SummaryPayload {
    /// Validate summarizer output into a payload.
    ///
    /// Accepts the object optionally wrapped in a Markdown code fence. Every
    /// section must carry a string for every locale.
    pub fn parse(raw: &str) -> Result<Self, SummaryError> {
        let body = strip_code_fence(raw.trim());
        if body.is_empty() {
            return Err(SummaryError::EmptyResponse);
        }
        let value: Value = serde_json::from_str(body).map_err(|e| SummaryError::InvalidJson {
            message: e.to_string(),
        })?;
        let root = value.as_object().ok_or_else(|| SummaryError::InvalidJson {
            message: "expected a JSON object".to_string(),
        })?;

        Ok(SummaryPayload {
            summary: section(root, "summary", None)?,
            common_positive: section(root, "commonPositive", None)?,
            common_negative: section(root, "commonNegative", None)?,
            notable_observation: section(
                root,
                "notableObservation",
                Some(LEGACY_OBSERVATION_KEY),
            )?,
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn section(
    root: &Map<String, Value>,
    key: &str,
    alias: Option<&str>,
) -> Result<LocalizedText, SummaryError> {
    let value = root
        .get(key)
        .or_else(|| alias.and_then(|a| root.get(a)))
        .and_then(Value::as_object)
        .ok_or_else(|| SummaryError::Malformed {
            field: key.to_string(),
        })?;

    let text = |locale: Locale| -> Result<String, SummaryError> {
        value
            .get(locale.code())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SummaryError::Malformed {
                field: format!("{key}.{locale}"),
            })
    };

    Ok(LocalizedText {
        tr: text(Locale::Tr)?,
        en: text(Locale::En)?,
        fr: text(Locale::Fr)?,
        de: text(Locale::De)?,
        nl: text(Locale::Nl)?,
    })
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, ConfigError> {
        let api_key = config.resolve_api_key()?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &SummarizerConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, reviews: &[DisplayReview]) -> Result<Value, SummaryError> {
        let reviews_json = serde_json::to_string(reviews).map_err(|e| SummaryError::Request {
            message: format!("failed to encode reviews: {e}"),
        })?;
        Ok(json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": false,
            "messages": [
                { "role": "system", "content": SUMMARY_PROMPT },
                { "role": "user", "content": reviews_json },
            ],
        }))
    }

    fn extract_content(body: &Value) -> Result<String, SummaryError> {
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(SummaryError::EmptyResponse);
        }
        Ok(content.to_string())
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> SummaryError {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string))
            .unwrap_or_else(|| body.to_string());
        SummaryError::Request {
            message: format!("HTTP {}: {}", status.as_u16(), detail),
        }
    }
}

#[async_trait]
impl ReviewSummarizer for OpenAiSummarizer {
    async fn summarize(&self, reviews: &[DisplayReview]) -> Result<String, SummaryError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(reviews)?;

        debug!(
            url = %url,
            model = %self.model,
            reviews = reviews.len(),
            "Requesting review summary"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SummaryError::Request {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| SummaryError::Request {
            message: format!("Failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(Self::map_http_error(status, &text));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| SummaryError::Request {
            message: format!("Invalid response JSON: {e}"),
        })?;
        Self::extract_content(&json)
    }
}

/// Deterministic summarizer for tests and dry runs.
pub struct MockSummarizer {
    queued: Mutex<VecDeque<Result<String, SummaryError>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A summarizer that answers every call with `text` once its queue is drained.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::new()
        }
    }

    pub fn queue_response(&self, text: impl Into<String>) {
        self.queued.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn queue_error(&self, error: SummaryError) {
        self.queued.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A well-formed summary with every section and locale filled in.
    pub fn sample_payload() -> String {
        let sections = ["summary", "commonPositive", "commonNegative", "notableObservation"];
        let mut root = Map::new();
        for name in sections {
            let mut locales = Map::new();
            for locale in Locale::ALL {
                locales.insert(locale.code().to_string(), json!(format!("{name} ({locale})")));
            }
            root.insert(name.to_string(), Value::Object(locales));
        }
        Value::Object(root).to_string()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewSummarizer for MockSummarizer {
    async fn summarize(&self, _reviews: &[DisplayReview]) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback.clone().ok_or(SummaryError::EmptyResponse)
    }
}

//! Engagement summarization through a hosted text-generation model.
//!
//! One completion per non-empty engagement list produces a short display
//! summary per item plus one context summary for chat use. Every failure
//! (transport, status, empty reply, malformed JSON, wrong shape) is reported
//! as `SummaryError` and the pipeline serves the raw items with placeholders.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::EngagementItem;

/// Context summary for an entity with nothing to summarize.
pub const NO_ENGAGEMENT_HISTORY: &str = "No engagement history.";

/// Display summary used when the model gave none for an item.
pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable.";

/// Body characters per item sent to the model.
pub const MAX_PROMPT_BODY_CHARS: usize = 3000;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You summarize CRM activity for a salesperson. \
You receive numbered engagements (calls, emails, meetings, notes) for one contact or company.\n\n\
Respond with JSON only, no markdown, no commentary, in exactly this shape:\n\
{\"displaySummaries\": [\"...\"], \"contextSummary\": \"...\"}\n\n\
displaySummaries: one plain-text string per engagement, in the order given. \
Each is a brief card summary: who, what, outcome.\n\
contextSummary: one thorough summary of all engagements that an assistant can rely on \
to answer follow-up questions. Include dates, participants, topics, outcomes and next steps.";

// =============================================================================
// Configuration
// =============================================================================

/// Summarization configuration stored in ~/.prospector/config.json.
///
/// `ANTHROPIC_API_KEY` in the environment takes precedence over the file.
/// Without a key the pipeline runs with summarization disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// =============================================================================
// Types
// =============================================================================

/// Parsed model output. Both fields are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub display_summaries: Vec<String>,
    pub context_summary: String,
}

impl SummaryResult {
    pub fn no_history() -> Self {
        Self {
            display_summaries: Vec::new(),
            context_summary: NO_ENGAGEMENT_HISTORY.to_string(),
        }
    }
}

/// Why a summary is unavailable. Never fatal to a lookup.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Summarization is not configured")]
    Disabled,
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Summarization API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Model returned no text content")]
    EmptyResponse,
    #[error("Failed to parse summary response: {0}")]
    Parse(String),
    #[error("Summarization timed out")]
    Timeout,
}

/// Summarization capability. Implementations only see non-empty lists.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(&self, items: &[EngagementItem]) -> Result<SummaryResult, SummaryError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Summarize `items`, short-circuiting an empty list without a model call.
pub async fn summarize_engagements(
    provider: &dyn SummaryProvider,
    items: &[EngagementItem],
) -> Result<SummaryResult, SummaryError> {
    if items.is_empty() {
        return Ok(SummaryResult::no_history());
    }
    provider.summarize(items).await
}

/// Display summaries aligned 1:1 with `count` items, plus the context summary.
pub fn align_summaries(
    outcome: Result<SummaryResult, SummaryError>,
    count: usize,
) -> (Vec<String>, String) {
    let (mut display, context) = match outcome {
        Ok(result) => (result.display_summaries, result.context_summary),
        Err(_) => (Vec::new(), NO_ENGAGEMENT_HISTORY.to_string()),
    };
    display.truncate(count);
    display.resize(count, SUMMARY_PLACEHOLDER.to_string());
    (display, context)
}

// =============================================================================
// Prompt construction
// =============================================================================

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// One numbered block per engagement; absent fields are omitted.
pub fn engagement_to_text(item: &EngagementItem, index: usize) -> String {
    let mut lines = vec![
        format!("[{}] Type: {}", index + 1, item.kind),
        format!("Date: {}", item.timestamp_iso()),
    ];
    if !item.title.is_empty() {
        lines.push(format!("Title: {}", item.title));
    }
    if let Some(direction) = &item.direction {
        lines.push(format!("Direction: {}", direction));
    }
    if let Some(duration) = &item.duration {
        lines.push(format!("Duration: {}", duration));
    }
    if let Some(name) = &item.contact_name {
        lines.push(format!("Contact: {}", name));
    }
    if let Some(body) = item.body.as_deref().filter(|b| !b.is_empty()) {
        lines.push(format!("Content: {}", truncate_chars(body, MAX_PROMPT_BODY_CHARS)));
    }
    lines.join("\n")
}

pub fn build_summary_input(items: &[EngagementItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| engagement_to_text(item, i))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

// =============================================================================
// Response parsing
// =============================================================================

/// The JSON object in a model reply, with or without a code fence around it.
pub fn extract_json_from_response(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the info string (`json`, `JSON`, or nothing) up to the first newline.
        let body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        let body = body.trim_end();
        let body = body.strip_suffix("```").unwrap_or(body).trim();
        return body.starts_with('{').then_some(body);
    }

    trimmed.starts_with('{').then_some(trimmed)
}

/// Parse a model reply as strict `{displaySummaries: string[], contextSummary: string}`.
pub fn parse_summary_response(response: &str) -> Result<SummaryResult, SummaryError> {
    let json = extract_json_from_response(response)
        .ok_or_else(|| SummaryError::Parse("no JSON object in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| SummaryError::Parse(e.to_string()))
}

/// Text of the first content block of a Messages API response.
fn first_text_block(data: &Value) -> Option<&str> {
    let block = data.get("content")?.as_array()?.first()?;
    if block.get("type")?.as_str()? != "text" {
        return None;
    }
    block.get("text")?.as_str()
}

// =============================================================================
// Providers
// =============================================================================

/// Summarizer backed by the Anthropic Messages API.
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicSummarizer {
    pub fn new(config: &SummaryConfig) -> Result<Self, SummaryError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SummaryError::Disabled)?
            .to_string();

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl SummaryProvider for AnthropicSummarizer {
    async fn summarize(&self, items: &[EngagementItem]) -> Result<SummaryResult, SummaryError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": build_summary_input(items) }],
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(SummaryError::Api {
                status,
                message: text.chars().take(300).collect(),
            });
        }

        let data: Value = resp.json().await?;
        let text = first_text_block(&data).ok_or(SummaryError::EmptyResponse)?;
        parse_summary_response(text)
    }
}

/// Used when no API key is configured. Never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSummarizer;

#[async_trait]
impl SummaryProvider for DisabledSummarizer {
    async fn summarize(&self, _items: &[EngagementItem]) -> Result<SummaryResult, SummaryError> {
        Err(SummaryError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Pick the provider the configuration allows.
pub fn summarizer_from_config(config: &SummaryConfig) -> std::sync::Arc<dyn SummaryProvider> {
    match AnthropicSummarizer::new(config) {
        Ok(summarizer) => std::sync::Arc::new(summarizer),
        Err(SummaryError::Disabled) => {
            log::info!("Engagements: no summarization key configured, serving raw engagements");
            std::sync::Arc::new(DisabledSummarizer)
        }
        Err(e) => {
            log::warn!("Engagements: summarizer unavailable: {}", e);
            std::sync::Arc::new(DisabledSummarizer)
        }
    }
}

//! Chat-completion client and LLM response parsing.
//!
//! Defines [`OpenAiCompletion`], the [`CompletionProvider`] used in
//! production, and the single classification step that turns whatever the
//! model returned into a [`ContentDraft`].
//!
//! # Response shapes
//!
//! Models asked for JSON answer with one of three shapes, resolved once by
//! [`classify_response`]:
//!
//! | Shape | Example |
//! |-------|---------|
//! | [`LlmResponse::Object`] | `{"title": "…", "content": "…"}` |
//! | [`LlmResponse::JsonString`] | `"{\"title\": …}"` (JSON encoded twice) |
//! | [`LlmResponse::MixedText`] | `Sure! Here is your post: {"title": …}` |
//!
//! [`parse_draft`] dispatches on the shape and falls back to field-by-field
//! regex extraction before giving up with an explicit parse error.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including the request timeout → retry
//! - Fixed backoff of `llm.retry_backoff_secs` between attempts

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::GenerateError;
use crate::models::ContentDraft;
use crate::traits::{CompletionProvider, CompletionRequest};

// ============ OpenAI Provider ============

/// Completion provider for OpenAI-compatible `/chat/completions` endpoints.
///
/// Reads the API key from the environment variable named by
/// `llm.api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAiCompletion {
    model: String,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    backoff: Duration,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    /// Create a provider from `[llm]` config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is not set or the HTTP
    /// client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        // The client timeout aborts the whole request, body included.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            api_key,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(config.retry_backoff_secs),
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, "retrying completion request");
                tokio::time::sleep(self.backoff).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(attempt, %status, "completion request failed");
                        last_err = Some(anyhow::anyhow!(
                            "LLM API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("LLM API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "completion request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Build the configured completion provider, or `None` when disabled.
pub fn create_provider(config: &LlmConfig) -> Result<Option<Box<dyn CompletionProvider>>> {
    match config.provider.as_str() {
        "openai" => Ok(Some(Box::new(OpenAiCompletion::new(config)?))),
        "disabled" => Ok(None),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_chat_response(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid LLM response: missing choices[0].message.content"))
}

// ============ Response classification ============

/// The shape of a raw model answer.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    /// A JSON object.
    Object(Map<String, Value>),
    /// A JSON string literal; its decoded value is carried here.
    JsonString(String),
    /// Anything else: prose, HTML, or JSON embedded in prose.
    MixedText(String),
}

/// Classify a raw answer. Code fences are stripped first.
pub fn classify_response(raw: &str) -> LlmResponse {
    let text = strip_code_fences(raw);
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => LlmResponse::Object(map),
        Ok(Value::String(s)) => LlmResponse::JsonString(s),
        _ => LlmResponse::MixedText(text.to_string()),
    }
}

/// Turn a raw model answer into a draft.
///
/// # Errors
///
/// [`GenerateError::Parse`] when neither JSON nor field extraction nor an
/// HTML fallback yields any content.
pub fn parse_draft(raw: &str) -> Result<ContentDraft, GenerateError> {
    parse_classified(classify_response(raw), 0)
}

fn parse_classified(response: LlmResponse, depth: usize) -> Result<ContentDraft, GenerateError> {
    match response {
        LlmResponse::Object(map) => draft_from_object(&map),
        LlmResponse::JsonString(inner) if depth < 2 => {
            debug!("model answer was a JSON-encoded string, decoding");
            parse_classified(classify_response(&inner), depth + 1)
        }
        LlmResponse::JsonString(inner) => parse_mixed(&inner),
        LlmResponse::MixedText(text) => parse_mixed(&text),
    }
}

fn draft_from_object(map: &Map<String, Value>) -> Result<ContentDraft, GenerateError> {
    let content = match map.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(_)) | Some(Value::Array(_)) => map
            .get("content")
            .map(Value::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    };
    if content.trim().is_empty() {
        return Err(GenerateError::Parse(
            "JSON answer has no content field".to_string(),
        ));
    }

    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    Ok(ContentDraft {
        title: text("title"),
        content,
        excerpt: text("excerpt"),
        tags: tags_from_value(map.get("tags")),
        product_data: map.get("productData").cloned(),
        comparison_data: map.get("comparisonData").cloned(),
    })
}

fn tags_from_value(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Prose with embedded JSON, truncated JSON, or bare HTML.
fn parse_mixed(text: &str) -> Result<ContentDraft, GenerateError> {
    // Embedded object: widest {...} span
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..=end]) {
                debug!("recovered JSON object embedded in prose");
                return draft_from_object(&map);
            }
        }
    }

    // Field-by-field extraction from broken JSON
    if let Some(content) = extract_string_field(text, "content") {
        if !content.trim().is_empty() {
            warn!("model answer was not valid JSON, extracted fields by pattern");
            return Ok(ContentDraft {
                title: extract_string_field(text, "title").unwrap_or_default(),
                content,
                excerpt: extract_string_field(text, "excerpt").unwrap_or_default(),
                tags: extract_tags(text),
                product_data: None,
                comparison_data: None,
            });
        }
    }

    // Bare HTML answer
    if text.contains("<h") || text.contains("<p") {
        warn!("model answer was bare HTML, deriving title and excerpt");
        return Ok(ContentDraft {
            title: first_match_text(text, &HEADING_TEXT_RE),
            content: text.to_string(),
            excerpt: first_match_text(text, &PARAGRAPH_TEXT_RE),
            tags: Vec::new(),
            product_data: None,
            comparison_data: None,
        });
    }

    Err(GenerateError::Parse(format!(
        "no JSON, content field or HTML found in answer starting with {:?}",
        text.chars().take(80).collect::<String>()
    )))
}

static HEADING_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]>").expect("HEADING_TEXT_RE should compile")
});
static PARAGRAPH_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("PARAGRAPH_TEXT_RE should compile")
});
static TAGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"tags"\s*:\s*\[(.*?)\]"#).expect("TAGS_RE should compile")
});
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("QUOTED_RE should compile")
});
static STRIP_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("STRIP_TAGS_RE should compile"));

fn first_match_text(text: &str, re: &Regex) -> String {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            STRIP_TAGS_RE
                .replace_all(m.as_str(), "")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

fn extract_tags(text: &str) -> Vec<String> {
    let Some(list) = TAGS_RE.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    QUOTED_RE
        .captures_iter(list.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| unescape_json_fragment(m.as_str()))
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Pull a string-valued field out of possibly broken JSON.
///
/// Tries a complete `"field": "…"` literal first. If the literal is never
/// closed (a truncated answer), takes everything after the opening quote
/// and trims the trailing `"}` debris.
pub fn extract_string_field(text: &str, field: &str) -> Option<String> {
    let escaped = regex::escape(field);
    let complete = Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, escaped)).ok()?;
    if let Some(m) = complete.captures(text).and_then(|c| c.get(1)) {
        return Some(unescape_json_fragment(m.as_str()));
    }

    let opening = Regex::new(&format!(r#""{}"\s*:\s*""#, escaped)).ok()?;
    let start = opening.find(text)?.end();
    let tail = text[start..]
        .trim_end()
        .trim_end_matches(['}', ']'])
        .trim_end()
        .trim_end_matches('"');
    (!tail.is_empty()).then(|| unescape_json_fragment(tail))
}

/// Decode JSON string escapes, tolerating invalid ones.
fn unescape_json_fragment(fragment: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", fragment)).unwrap_or_else(|_| {
        fragment
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\\"", "\"")
            .replace("\\/", "/")
            .replace("\\\\", "\\")
    })
}

/// Remove a surrounding markdown code fence (```` ```json … ``` ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    match t.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_three_shapes() {
        assert!(matches!(
            classify_response(r#"{"title":"t","content":"c"}"#),
            LlmResponse::Object(_)
        ));
        assert!(matches!(
            classify_response(r#""{\"title\":\"t\"}""#),
            LlmResponse::JsonString(_)
        ));
        assert!(matches!(
            classify_response("Here you go: {\"title\": 1}"),
            LlmResponse::MixedText(_)
        ));
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "```json\n{\"title\":\"Best Dell\",\"content\":\"<h1>x</h1>\",\"excerpt\":\"e\",\"tags\":[\"dell\",\" laptops \"]}\n```";
        let d = parse_draft(raw).unwrap();
        assert_eq!(d.title, "Best Dell");
        assert_eq!(d.content, "<h1>x</h1>");
        assert_eq!(d.tags, vec!["dell", "laptops"]);
    }

    #[test]
    fn parses_double_encoded_answer() {
        let inner = r#"{"title":"T","content":"<p>c</p>"}"#;
        let raw = serde_json::to_string(inner).unwrap();
        let d = parse_draft(&raw).unwrap();
        assert_eq!(d.title, "T");
        assert_eq!(d.content, "<p>c</p>");
    }

    #[test]
    fn parses_json_inside_prose() {
        let raw = "Sure! Here is the post:\n{\"title\":\"T\",\"content\":\"<h2>A</h2>\",\"tags\":\"a, b\"}\nEnjoy.";
        let d = parse_draft(raw).unwrap();
        assert_eq!(d.content, "<h2>A</h2>");
        assert_eq!(d.tags, vec!["a", "b"]);
    }

    #[test]
    fn extracts_fields_from_truncated_json() {
        let raw = r#"{"title": "Top 10", "excerpt": "short", "tags": ["x", "y"], "content": "<h1>Top</h1>\n<p>cut off her"#;
        let d = parse_draft(raw).unwrap();
        assert_eq!(d.title, "Top 10");
        assert_eq!(d.excerpt, "short");
        assert_eq!(d.tags, vec!["x", "y"]);
        assert_eq!(d.content, "<h1>Top</h1>\n<p>cut off her");
    }

    #[test]
    fn falls_back_to_bare_html() {
        let d = parse_draft("<h1>Hello <em>there</em></h1><p>Intro text.</p>").unwrap();
        assert_eq!(d.title, "Hello there");
        assert_eq!(d.excerpt, "Intro text.");
    }

    #[test]
    fn gives_up_explicitly() {
        let err = parse_draft("I cannot help with that.").unwrap_err();
        assert!(matches!(err, GenerateError::Parse(_)));
        let err = parse_draft(r#"{"title":"no body"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::Parse(_)));
    }

    #[test]
    fn chat_response_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "hi" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "hi");
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }
}

//! LLM access: the raw client capability, the Anthropic implementation and
//! the adapter that adds retry, shape validation and one repair re-prompt.

use crate::errors::LlmError;
use crate::retry::RetryPolicy;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which pipeline stage issued a request. Carried for logging and so test
/// doubles can answer per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Icp,
    Research,
    Priority,
    Action,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Icp => "icp",
            Stage::Research => "research",
            Stage::Priority => "priority",
            Stage::Action => "action",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Low-temperature request for JSON answers.
    pub fn structured(stage: Stage, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            stage,
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1500,
            temperature: 0.2,
        }
    }
}

/// Raw text completion. Implementations map transport failures onto
/// [`LlmError`] and never retry on their own.
#[allow(async_fn_in_trait)]
pub trait LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

impl<C: LlmClient + ?Sized> LlmClient for &C {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

// ============ Anthropic Messages API ============

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Rejected(format!("Failed to create LLM client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }
}

impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        tracing::debug!("Calling LLM for {} stage ({})", request.stage.as_str(), self.model);

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Unavailable(format!("LLM request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, error_text));
        }

        let data: Value = response.json().await.map_err(|e| {
            LlmError::InvalidResponseShape(format!("Failed to parse LLM response: {}", e))
        })?;

        let text: String = data
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponseShape(
                "LLM response contained no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth(format!("LLM API returned {}: {}", status, body)),
        408 => LlmError::Timeout,
        429 => LlmError::RateLimited,
        500 | 502 | 503 | 504 | 529 => {
            LlmError::Unavailable(format!("LLM API returned {}: {}", status, body))
        }
        _ => LlmError::Rejected(format!("LLM API returned {}: {}", status, body)),
    }
}

// ============ Response shape ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
    TextList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Expected fields of a structured model answer.
#[derive(Debug, Clone, Copy)]
pub struct SchemaHint {
    pub fields: &'static [FieldSpec],
}

impl SchemaHint {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Checks a parsed object; returns the first problem found.
    pub fn validate(&self, object: &Map<String, Value>) -> Result<(), String> {
        for field in self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing field '{}'", field.name))
                }
                None | Some(Value::Null) => {}
                Some(value) if !kind_matches(field.kind, value) => {
                    return Err(format!(
                        "field '{}' should be {}",
                        field.name,
                        describe(field.kind)
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// One-line description used in prompts and repair prompts.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "\"{}\" ({}{})",
                    f.name,
                    describe(f.kind),
                    if f.required { "" } else { ", optional" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn kind_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::Number => value.is_number(),
        FieldKind::Text => value.is_string(),
        FieldKind::TextList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    }
}

fn describe(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Number => "a number",
        FieldKind::Text => "a string",
        FieldKind::TextList => "an array of strings",
    }
}

/// Extracts a JSON object from model text.
///
/// Accepts raw JSON, a fenced ```json block, or an object embedded in
/// surrounding prose.
pub fn parse_json_object(response: &str) -> Option<Map<String, Value>> {
    let mut text = response.trim();

    if let Some(fence) = text.find("```") {
        let after = &text[fence + 3..];
        // Skip the language tag line, if any
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            text = body[..end].trim();
        }
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Some(map);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ============ Adapter ============

/// Wraps an [`LlmClient`] with bounded retry, shape validation and a single
/// repair re-prompt. Stateless between calls.
pub struct LlmAdapter<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: LlmClient> LlmAdapter<C> {
    pub fn new(client: C, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Sends `request` and returns the validated JSON object.
    ///
    /// Transient failures are retried per the policy. `Auth` and `Rejected`
    /// propagate immediately. A shape mismatch triggers exactly one repair
    /// re-prompt; a second mismatch is `InvalidResponseShape`.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        schema: &SchemaHint,
    ) -> Result<Map<String, Value>, LlmError> {
        let text = self.call_with_retry(request).await?;

        let problem = match check_shape(&text, schema) {
            Ok(object) => return Ok(object),
            Err(problem) => problem,
        };

        tracing::warn!(
            "LLM {} response did not match schema ({}), sending repair prompt",
            request.stage.as_str(),
            problem
        );

        let repair = repair_request(request, schema, &text, &problem);
        let repaired = self.call_with_retry(&repair).await?;

        check_shape(&repaired, schema).map_err(|problem| {
            tracing::error!(
                "LLM {} response still invalid after repair: {}",
                request.stage.as_str(),
                problem
            );
            LlmError::InvalidResponseShape(problem)
        })
    }

    async fn call_with_retry(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let label = format!("LLM {} call", request.stage.as_str());
        self.retry
            .run(&label, LlmError::is_transient, || self.client.complete(request))
            .await
    }
}

fn check_shape(text: &str, schema: &SchemaHint) -> Result<Map<String, Value>, String> {
    let object = parse_json_object(text).ok_or_else(|| "response was not a JSON object".to_string())?;
    schema.validate(&object)?;
    Ok(object)
}

fn repair_request(
    original: &CompletionRequest,
    schema: &SchemaHint,
    previous: &str,
    problem: &str,
) -> CompletionRequest {
    let excerpt: String = previous.chars().take(1500).collect();
    CompletionRequest {
        prompt: format!(
            "{}\n\nYour previous answer could not be used ({}).\nPrevious answer:\n{}\n\n\
             Respond again with ONLY a JSON object containing: {}.",
            original.prompt,
            problem,
            excerpt,
            schema.describe()
        ),
        temperature: 0.0,
        ..original.clone()
    }
}

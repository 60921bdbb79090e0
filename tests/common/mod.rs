//! Shared helpers for integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use lead_copilot::config::Config;
use lead_copilot::errors::LlmError;
use lead_copilot::llm::{CompletionRequest, LlmClient, Stage};
use lead_copilot::models::Lead;
use lead_copilot::pipeline::RunOptions;
use std::collections::HashMap;
use std::sync::Mutex;

pub const ICP_REPLY: &str =
    r#"{"icp_score": 82, "confidence_score": 80, "icp_reasoning": "Strong fit for hospital SaaS"}"#;
pub const RESEARCH_REPLY: &str = r#"{"brief": "ExampleCo sells scheduling software to hospitals.",
    "citations": ["Company website"], "research_confidence": "high"}"#;
pub const PRIORITY_REPLY: &str = r#"{"priority_tier": "medium", "priority_reasoning": "Mixed signals"}"#;
pub const ACTION_REPLY: &str =
    r#"{"next_action": "nurture", "action_reasoning": "Keep warm", "action_confidence": "medium"}"#;

/// LLM double answering per stage and recording every call.
pub struct ScriptedLlm {
    replies: HashMap<Stage, Result<String, LlmError>>,
    default: Result<String, LlmError>,
    calls: Mutex<Vec<Stage>>,
}

impl ScriptedLlm {
    /// Well-formed answers for every stage.
    pub fn healthy() -> Self {
        Self::always(Ok("{}".to_string()))
            .reply(Stage::Icp, Ok(ICP_REPLY.to_string()))
            .reply(Stage::Research, Ok(RESEARCH_REPLY.to_string()))
            .reply(Stage::Priority, Ok(PRIORITY_REPLY.to_string()))
            .reply(Stage::Action, Ok(ACTION_REPLY.to_string()))
    }

    /// The same answer for every stage.
    pub fn always(reply: Result<String, LlmError>) -> Self {
        Self {
            replies: HashMap::new(),
            default: reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, stage: Stage, reply: Result<String, LlmError>) -> Self {
        self.replies.insert(stage, reply);
        self
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(request.stage);
        self.replies
            .get(&request.stage)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Config with one-second backoff; tests that hit retries pause the clock.
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("CLAUDE_API_KEY".to_string(), "sk-ant-test".to_string()),
        ("RETRY_BASE_DELAY_MS".to_string(), "1000".to_string()),
        ("RETRY_MAX_DELAY_MS".to_string(), "1000".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_map(&vars).unwrap()
}

/// Config with the stock retry policy (1s base, 30s cap).
pub fn default_retry_config() -> Config {
    let vars = HashMap::from([("CLAUDE_API_KEY".to_string(), "sk-ant-test".to_string())]);
    Config::from_map(&vars).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
}

pub fn options() -> RunOptions {
    RunOptions {
        today: today(),
        ..RunOptions::default()
    }
}

/// Strong lead contacted five days before [`today`].
pub fn example_co() -> Lead {
    Lead::new("page-example", "ExampleCo")
        .with_website("https://example.com")
        .with_notes("B2B SaaS selling to hospitals")
        .with_status("Qualified")
        .with_last_contacted(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap())
}

pub fn company_only(id: &str, company: &str) -> Lead {
    Lead::new(id, company)
}

//! Field agents: one per group of derived lead fields.
//!
//! Each agent sees the lead plus everything earlier stages produced, calls
//! the rule engine before the model, and returns either its field bundle or
//! a [`PartialFailure`] when the LLM adapter gave up. Missing lead data never
//! fails an agent; it only lowers confidence.

pub mod action;
pub mod icp;
pub mod priority;
pub mod research;

use crate::errors::LlmError;
use crate::llm::Stage;
use serde_json::{Map, Value};
use thiserror::Error;

/// An agent could not produce its fields because the LLM adapter failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} stage failed: {}", .stage.as_str(), .error)]
pub struct PartialFailure {
    pub stage: Stage,
    pub error: LlmError,
}

impl PartialFailure {
    pub fn new(stage: Stage, error: LlmError) -> Self {
        Self { stage, error }
    }

    /// Retries ran out; the lead should be retried on the next run.
    pub fn is_transient(&self) -> bool {
        self.error.is_transient()
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.error, LlmError::Auth(_))
    }
}

/// Truncates to `max` characters without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_classification() {
        let transient = PartialFailure::new(Stage::Icp, LlmError::RateLimited);
        assert!(transient.is_transient());
        assert!(!transient.is_auth());

        let auth = PartialFailure::new(Stage::Action, LlmError::Auth("401".into()));
        assert!(auth.is_auth());
        assert!(auth.to_string().starts_with("action stage failed"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}

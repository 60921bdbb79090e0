use thiserror::Error;

/// Application-wide error types.
///
/// Per-lead problems never surface as `AppError` from the pipeline; they are
/// folded into the run summary. What reaches the caller is either fatal for
/// the whole run (`Configuration`, `Auth`) or a failure of the record store
/// itself.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or missing configuration, detected before any lead is touched.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Credentials rejected by an external API. Credentials are run-wide.
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Timeout or rate limit that survived every retry.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    /// Any other non-success answer from an external API.
    #[error("External API error: {0}")]
    ExternalApi(String),
    /// The record store lacks a column the pipeline expected.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// The fingerprint state file could not be read or written.
    #[error("State file error: {0}")]
    State(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// True for errors that must stop the whole run rather than one lead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Configuration(_) | AppError::Auth(_))
    }

    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }
}

/// Failure of one call through the LLM adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM rate limit exceeded")]
    RateLimited,
    /// 5xx, overload or a dropped connection.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
    #[error("LLM authentication failed: {0}")]
    Auth(String),
    /// The model answered, but not with the fields we asked for.
    #[error("LLM response had an invalid shape: {0}")]
    InvalidResponseShape(String),
    /// The API refused the request itself (4xx other than auth/rate limit).
    #[error("LLM request rejected: {0}")]
    Rejected(String),
}

impl LlmError {
    /// Whether the adapter may retry this failure with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout | LlmError::RateLimited | LlmError::Unavailable(_)
        )
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Auth(msg) => AppError::Auth(msg),
            LlmError::Timeout | LlmError::RateLimited | LlmError::Unavailable(_) => {
                AppError::TransientNetwork(err.to_string())
            }
            other => AppError::ExternalApi(other.to_string()),
        }
    }
}

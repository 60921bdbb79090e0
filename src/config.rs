use crate::errors::AppError;
use crate::models::{InputField, OutputField};
use crate::retry::RetryPolicy;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com";
const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_STATE_FILE: &str = ".pipeline_state.json";
/// Retry backoff runs in whole seconds.
const MIN_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_ICP_CRITERIA: &str = "B2B SaaS companies with 50-500 employees, \
    strong product-market fit indicators, \
    actively investing in growth and technology, \
    decision-makers accessible and engaged, \
    budget availability signals present";

/// Priority and staleness thresholds, all in days or ICP points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub high_icp_min: u32,
    pub high_recency_max: u32,
    pub low_icp_max: u32,
    pub low_stale_days: u32,
    pub stale_days_threshold: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_icp_min: 75,
            high_recency_max: 10,
            low_icp_max: 40,
            low_stale_days: 45,
            stale_days_threshold: 14,
        }
    }
}

/// Upper edges of the numeric confidence bands (0..=low, ..=medium, ..=100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceBands {
    pub low_max: u8,
    pub medium_max: u8,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            low_max: 30,
            medium_max: 65,
        }
    }
}

/// Logical field → record-store column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNames {
    inputs: BTreeMap<InputField, String>,
    outputs: BTreeMap<OutputField, String>,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            inputs: InputField::ALL
                .iter()
                .map(|f| (*f, f.default_column().to_string()))
                .collect(),
            outputs: OutputField::ALL
                .iter()
                .map(|f| (*f, f.key().to_string()))
                .collect(),
        }
    }
}

impl PropertyNames {
    pub fn input(&self, field: InputField) -> &str {
        self.inputs
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.default_column())
    }

    pub fn output(&self, field: OutputField) -> &str {
        self.outputs
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.key())
    }

    pub fn set_input(&mut self, field: InputField, column: impl Into<String>) {
        self.inputs.insert(field, column.into());
    }

    pub fn set_output(&mut self, field: OutputField, column: impl Into<String>) {
        self.outputs.insert(field, column.into());
    }
}

/// Immutable run configuration, assembled once at startup and passed
/// explicitly to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
    pub notion_base_url: String,
    pub claude_api_key: String,
    pub claude_model: String,
    pub claude_base_url: String,
    pub thresholds: Thresholds,
    pub confidence_bands: ConfidenceBands,
    pub incremental_enabled: bool,
    pub state_file: PathBuf,
    pub retry: RetryPolicy,
    pub llm_timeout: Duration,
    pub notion_timeout: Duration,
    pub icp_criteria: String,
    pub slack_webhook_url: Option<String>,
    pub properties: PropertyNames,
}

impl Config {
    /// Loads `.env` (if present) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        let config = Self::from_map(&vars)?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Notion Base URL: {}", config.notion_base_url);
        tracing::debug!("Claude Base URL: {}", config.claude_base_url);
        tracing::debug!("Claude model: {}", config.claude_model);
        tracing::debug!("Thresholds: {:?}", config.thresholds);
        tracing::debug!("State file: {}", config.state_file.display());

        Ok(config)
    }

    /// Parses and validates a flat key → value mapping.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, AppError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let claude_api_key = get("CLAUDE_API_KEY").ok_or_else(|| {
            AppError::Configuration(
                "CLAUDE_API_KEY environment variable required \
                 (get one at https://console.anthropic.com/settings/keys)"
                    .to_string(),
            )
        })?;
        if !claude_api_key.starts_with("sk-ant-") {
            tracing::warn!("CLAUDE_API_KEY does not match expected prefix (sk-ant-)");
        }

        let notion_api_key = get("NOTION_API_KEY");
        if let Some(ref key) = notion_api_key {
            if !(key.starts_with("secret_") || key.starts_with("ntn_")) {
                tracing::warn!("NOTION_API_KEY does not match expected prefix (secret_ or ntn_)");
            }
        }

        let notion_database_id = get("NOTION_DATABASE_ID");
        if let Some(ref id) = notion_database_id {
            let compact = id.replace('-', "");
            if compact.len() != 32 || !compact.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AppError::Configuration(
                    "NOTION_DATABASE_ID should be 32 hex characters (dashes optional)".to_string(),
                ));
            }
        }

        let notion_base_url = base_url(get("NOTION_BASE_URL"), DEFAULT_NOTION_BASE_URL, "NOTION_BASE_URL")?;
        let claude_base_url = base_url(get("CLAUDE_BASE_URL"), DEFAULT_CLAUDE_BASE_URL, "CLAUDE_BASE_URL")?;

        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            high_icp_min: number(&get, "HIGH_ICP_MIN", defaults.high_icp_min)?,
            high_recency_max: number(&get, "HIGH_RECENCY_MAX", defaults.high_recency_max)?,
            low_icp_max: number(&get, "LOW_ICP_MAX", defaults.low_icp_max)?,
            low_stale_days: number(&get, "LOW_STALE_DAYS", defaults.low_stale_days)?,
            stale_days_threshold: number(&get, "STALE_DAYS_THRESHOLD", defaults.stale_days_threshold)?,
        };
        validate_thresholds(&thresholds)?;

        let band_defaults = ConfidenceBands::default();
        let confidence_bands = ConfidenceBands {
            low_max: number(&get, "LOW_CONFIDENCE_MAX", band_defaults.low_max)?,
            medium_max: number(&get, "MEDIUM_CONFIDENCE_MAX", band_defaults.medium_max)?,
        };
        if confidence_bands.low_max >= confidence_bands.medium_max || confidence_bands.medium_max > 100 {
            return Err(AppError::Configuration(format!(
                "Confidence bands must satisfy LOW_CONFIDENCE_MAX < MEDIUM_CONFIDENCE_MAX <= 100 (got {} and {})",
                confidence_bands.low_max, confidence_bands.medium_max
            )));
        }

        let max_attempts: u32 = number(&get, "LLM_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(AppError::Configuration(
                "LLM_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        let base_delay_ms: u64 = number(&get, "RETRY_BASE_DELAY_MS", 1000)?;
        let max_delay_ms: u64 = number(&get, "RETRY_MAX_DELAY_MS", 30_000)?;
        if base_delay_ms < MIN_RETRY_DELAY_MS || max_delay_ms < MIN_RETRY_DELAY_MS {
            return Err(AppError::Configuration(format!(
                "RETRY_BASE_DELAY_MS and RETRY_MAX_DELAY_MS must be at least {}",
                MIN_RETRY_DELAY_MS
            )));
        }
        if max_delay_ms < base_delay_ms {
            return Err(AppError::Configuration(
                "RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS".to_string(),
            ));
        }

        let llm_timeout_secs: u64 = number(&get, "LLM_TIMEOUT_SECS", 60)?;
        let notion_timeout_secs: u64 = number(&get, "NOTION_TIMEOUT_SECS", 30)?;

        let incremental_enabled = match get("INCREMENTAL_ENABLED") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AppError::Configuration(format!(
                    "INCREMENTAL_ENABLED must be true/false, got '{}'",
                    raw
                ))
            })?,
        };

        let mut properties = PropertyNames::default();
        for field in InputField::ALL {
            if let Some(column) = get(&format!("NOTION_PROP_{}", field.env_suffix())) {
                properties.set_input(*field, column);
            }
        }
        for field in OutputField::ALL {
            let key = format!("NOTION_PROP_{}", field.key().to_ascii_uppercase());
            if let Some(column) = get(&key) {
                properties.set_output(*field, column);
            }
        }

        Ok(Self {
            notion_api_key,
            notion_database_id,
            notion_base_url,
            claude_api_key,
            claude_model: get("CLAUDE_MODEL").unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            claude_base_url,
            thresholds,
            confidence_bands,
            incremental_enabled,
            state_file: PathBuf::from(
                get("PIPELINE_STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            ),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
            },
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            notion_timeout: Duration::from_secs(notion_timeout_secs),
            icp_criteria: get("ICP_CRITERIA").unwrap_or_else(|| DEFAULT_ICP_CRITERIA.to_string()),
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            properties,
        })
    }

    /// Notion credentials, required for every mode except `--sample`.
    pub fn notion_credentials(&self) -> Result<(&str, &str), AppError> {
        let key = self.notion_api_key.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "NOTION_API_KEY environment variable required \
                 (create an integration at https://www.notion.so/my-integrations)"
                    .to_string(),
            )
        })?;
        let database_id = self.notion_database_id.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "NOTION_DATABASE_ID environment variable required \
                 (find it in the database URL: https://notion.so/workspace/[DATABASE_ID]?v=...)"
                    .to_string(),
            )
        })?;
        Ok((key, database_id))
    }
}

fn validate_thresholds(t: &Thresholds) -> Result<(), AppError> {
    if t.high_icp_min > 100 || t.low_icp_max > 100 {
        return Err(AppError::Configuration(
            "HIGH_ICP_MIN and LOW_ICP_MAX must be within 0-100".to_string(),
        ));
    }
    if t.low_icp_max >= t.high_icp_min {
        return Err(AppError::Configuration(format!(
            "LOW_ICP_MAX ({}) must be lower than HIGH_ICP_MIN ({})",
            t.low_icp_max, t.high_icp_min
        )));
    }
    Ok(())
}

fn number<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            AppError::Configuration(format!(
                "{} must be a non-negative integer, got '{}'",
                key, raw
            ))
        }),
    }
}

fn base_url(value: Option<String>, default: &str, key: &str) -> Result<String, AppError> {
    let url = value.unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Configuration(format!(
            "{} must start with http:// or https://",
            key
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

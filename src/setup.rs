//! Interactive first-run setup.
//!
//! Asks for the credentials the pipeline needs, merges them into `.env`
//! and leaves the Notion access check and column bootstrap to the caller.

use crate::errors::AppError;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

pub const ENV_FILE: &str = ".env";

/// Prompted in this order; all three are required.
pub const REQUIRED_KEYS: [&str; 3] = ["NOTION_API_KEY", "NOTION_DATABASE_ID", "CLAUDE_API_KEY"];

const MODEL_KEY: &str = "CLAUDE_MODEL";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// What the operator answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAnswers {
    /// Keys to write into the env file.
    pub values: BTreeMap<String, String>,
    /// Whether missing output columns should be created.
    pub bootstrap_schema: bool,
}

/// Line-oriented question/answer over any reader and writer.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, label: &str) -> Result<String, AppError> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(AppError::Configuration(format!(
                "setup aborted: no answer for {}",
                label.trim_end_matches([':', ' '])
            )));
        }
        Ok(line.trim().to_string())
    }

    /// Asks until a non-blank answer arrives; blank keeps `default`.
    pub fn ask(&mut self, name: &str, default: Option<&str>) -> Result<String, AppError> {
        let label = match default {
            Some(value) => format!("{} [{}]: ", name, mask(name, value)),
            None => format!("{}: ", name),
        };
        loop {
            let answer = self.read_answer(&label)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(value) = default {
                return Ok(value.trim().to_string());
            }
            writeln!(self.output, "{} is required.", name)?;
        }
    }

    pub fn confirm(&mut self, question: &str, default_yes: bool) -> Result<bool, AppError> {
        let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
        let label = format!("{} {}: ", question, suffix);
        loop {
            match self.read_answer(&label)?.to_lowercase().as_str() {
                "" => return Ok(default_yes),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Please answer yes or no.")?,
            }
        }
    }

    pub fn say(&mut self, line: &str) -> Result<(), AppError> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }
}

/// Secrets are shown only by their last four characters.
fn mask(name: &str, value: &str) -> String {
    if !name.ends_with("_KEY") {
        return value.to_string();
    }
    let tail: String = value
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

/// Format hints for pasted credentials. Empty when everything looks right.
pub fn credential_warnings(values: &BTreeMap<String, String>) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(key) = values.get("NOTION_API_KEY") {
        if !(key.starts_with("secret_") || key.starts_with("ntn_")) {
            warnings.push(
                "NOTION_API_KEY does not match expected prefix (secret_ or ntn_).".to_string(),
            );
        }
    }

    if let Some(id) = values.get("NOTION_DATABASE_ID") {
        let compact = id.replace('-', "");
        if compact.len() != 32 || !compact.chars().all(|c| c.is_ascii_hexdigit()) {
            warnings.push(
                "NOTION_DATABASE_ID should be 32 hex characters (dashes optional).".to_string(),
            );
        }
    }

    if let Some(key) = values.get("CLAUDE_API_KEY") {
        if !key.starts_with("sk-ant-") {
            warnings.push("CLAUDE_API_KEY does not match expected prefix (sk-ant-).".to_string());
        }
    }

    warnings
}

/// Runs the questionnaire. `Ok(None)` means the operator cancelled.
pub fn collect<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    existing: &BTreeMap<String, String>,
) -> Result<Option<SetupAnswers>, AppError> {
    prompter.say("Lead Copilot setup")?;
    prompter.say("Credentials are saved to .env; press enter to keep a shown value.")?;

    let mut values = BTreeMap::new();
    for key in REQUIRED_KEYS {
        let answer = prompter.ask(key, existing.get(key).map(String::as_str))?;
        values.insert(key.to_string(), answer);
    }
    let model_default = existing.get(MODEL_KEY).map_or(DEFAULT_MODEL, String::as_str);
    let model = prompter.ask(MODEL_KEY, Some(model_default))?;
    values.insert(MODEL_KEY.to_string(), model);

    let bootstrap_schema =
        prompter.confirm("Create missing output columns in the Notion database?", true)?;

    let warnings = credential_warnings(&values);
    if !warnings.is_empty() {
        prompter.say("Potential issues detected:")?;
        for warning in &warnings {
            prompter.say(&format!("- {}", warning))?;
        }
        if !prompter.confirm("Continue anyway?", false)? {
            return Ok(None);
        }
    }

    Ok(Some(SetupAnswers {
        values,
        bootstrap_schema,
    }))
}

fn format_env_value(value: &str) -> String {
    if value.contains([' ', '#', '"']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Key assigned on an env-file line, if any (`export` prefix allowed).
fn assigned_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    Some(key.trim())
}

/// Rewrites `existing` env-file text with `updates` applied.
///
/// Assignments to updated keys are replaced in place; comments and every
/// other line are kept. Keys not yet present are appended.
pub fn merge_env(existing: &str, updates: &BTreeMap<String, String>) -> String {
    let mut pending: BTreeMap<&str, &str> = updates
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut lines = Vec::new();

    for line in existing.lines() {
        match assigned_key(line).and_then(|key| updates.get_key_value(key)) {
            Some((key, value)) => {
                // A key repeated in the file keeps only its first assignment.
                if pending.remove(key.as_str()).is_some() {
                    lines.push(format!("{}={}", key, format_env_value(value)));
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    for (key, value) in pending {
        lines.push(format!("{}={}", key, format_env_value(value)));
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Parsed assignments of an env file; a missing file reads as empty.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, AppError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    dotenvy::from_read_iter(text.as_bytes())
        .map(|item| {
            item.map_err(|e| {
                AppError::Configuration(format!("{} could not be parsed: {}", path.display(), e))
            })
        })
        .collect()
}

/// Merges `values` into the env file at `path`, creating it if needed.
pub fn save_env_file(path: &Path, values: &BTreeMap<String, String>) -> Result<(), AppError> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };
    std::fs::write(path, merge_env(&existing, values))?;
    tracing::info!("Saved {} setting(s) to {}", values.len(), path.display());
    Ok(())
}

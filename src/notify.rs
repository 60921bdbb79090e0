use crate::errors::AppError;
use crate::pipeline::RunSummary;
use serde_json::json;
use std::time::Duration;

const MAX_ERRORS_SHOWN: usize = 5;
const TOP_LEADS: usize = 3;

/// Posts run summaries to a Slack incoming webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Result<Self, AppError> {
        if webhook_url.trim().is_empty() {
            return Err(AppError::Configuration(
                "SLACK_WEBHOOK_URL is not set (create one at https://api.slack.com/apps)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ExternalApi(format!("Failed to create Slack client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub async fn send_summary(&self, summary: &RunSummary) -> Result<(), AppError> {
        let body = json!({ "text": format_summary(summary) });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Slack request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApi(format!(
                "Slack returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!("Slack notification sent");
        Ok(())
    }
}

fn tier_emoji(tier: &str) -> &'static str {
    match tier {
        "high" => ":large_green_circle:",
        "medium" => ":large_yellow_circle:",
        "low" => ":red_circle:",
        _ => ":white_circle:",
    }
}

/// Slack mrkdwn rendering of a run summary.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut lines = Vec::new();

    let mode = if summary.dry_run { " _(dry run)_" } else { "" };
    lines.push(format!("*Lead pipeline run*{}", mode));
    lines.push(format!(
        "Processed: *{}*  Degraded: *{}*  Failed: *{}*  Skipped: *{}*  Invalid: *{}*",
        summary.processed, summary.degraded, summary.failed, summary.skipped, summary.invalid
    ));

    let stale = summary
        .leads
        .iter()
        .filter(|l| l.stale == Some(true))
        .count();
    let tiers = summary
        .tier_counts()
        .into_iter()
        .map(|(tier, count)| format!("{} {} {}", tier_emoji(tier), tier, count))
        .collect::<Vec<_>>()
        .join("  ");
    lines.push(format!("Priority: {}  (stale: {})", tiers, stale));

    let top = summary.top_leads(TOP_LEADS);
    if !top.is_empty() {
        lines.push("*Top leads by ICP score*".to_string());
        for (rank, lead) in top.iter().enumerate() {
            lines.push(format!(
                "{}. {} - ICP {} ({}, {})",
                rank + 1,
                lead.company,
                lead.icp_score.unwrap_or_default(),
                lead.priority_tier.map(|t| t.as_str()).unwrap_or("review"),
                lead.next_action.map(|a| a.as_str()).unwrap_or("enrich_data"),
            ));
        }
    }

    if !summary.schema_mismatches.is_empty() {
        lines.push(format!(
            "Missing columns: {}",
            summary
                .schema_mismatches
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if !summary.errors.is_empty() {
        lines.push(format!("*Errors ({})*", summary.errors.len()));
        for error in summary.errors.iter().take(MAX_ERRORS_SHOWN) {
            lines.push(format!("- {}", error));
        }
        if summary.errors.len() > MAX_ERRORS_SHOWN {
            lines.push(format!("...and {} more", summary.errors.len() - MAX_ERRORS_SHOWN));
        }
    }

    lines.join("\n")
}

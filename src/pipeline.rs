//! Lead pipeline orchestration.
//!
//! Leads are processed strictly one after another:
//! 1. Skip invalid leads (no company) and unchanged leads (fingerprint match)
//! 2. Run ICP → Research → Priority → Action, each seeing earlier outputs
//! 3. Write the derived fields back to the record store
//! 4. Record and persist the lead's fingerprint
//!
//! Per-lead failures are folded into the [`RunSummary`]. Only fatal errors
//! (credentials rejected, record store unreachable, state file unwritable)
//! abort the run.

use crate::agents::{action, icp, priority, research, PartialFailure};
use crate::config::Config;
use crate::errors::AppError;
use crate::fingerprint::{content_hash, FingerprintStore};
use crate::llm::{LlmAdapter, LlmClient};
use crate::models::{DerivedFields, Lead, NextAction, PriorityTier};
use crate::store::{LeadFilter, RecordStore};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Derive fields but write nothing and persist no fingerprints.
    pub dry_run: bool,
    /// Ignore stored fingerprints.
    pub full_refresh: bool,
    pub limit: Option<usize>,
    pub status: Option<String>,
    /// Reference date for staleness.
    pub today: NaiveDate,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            full_refresh: false,
            limit: None,
            status: None,
            today: Utc::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadOutcome {
    /// Every stage produced model-backed output and the write succeeded.
    Processed,
    /// Written, but at least one stage fell back to its default bundle.
    Degraded,
    Failed,
}

/// Per-lead line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadDigest {
    pub lead_id: String,
    pub company: String,
    pub outcome: LeadOutcome,
    pub icp_score: Option<u8>,
    pub priority_tier: Option<PriorityTier>,
    pub next_action: Option<NextAction>,
    pub stale: Option<bool>,
}

impl LeadDigest {
    fn failed(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            company: lead.company.clone(),
            outcome: LeadOutcome::Failed,
            icp_score: None,
            priority_tier: None,
            next_action: None,
            stale: None,
        }
    }

    fn completed(lead: &Lead, fields: &DerivedFields, outcome: LeadOutcome) -> Self {
        Self {
            lead_id: lead.id.clone(),
            company: lead.company.clone(),
            outcome,
            icp_score: fields.icp.as_ref().map(|i| i.icp_score),
            priority_tier: Some(fields.priority.tier),
            next_action: Some(fields.action.next_action),
            stale: Some(fields.priority.stale_flag),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub fetched: usize,
    pub processed: usize,
    pub degraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
    /// Output columns missing from the record store, reported once per run.
    pub schema_mismatches: BTreeSet<String>,
    pub errors: Vec<String>,
    pub leads: Vec<LeadDigest>,
}

impl RunSummary {
    pub fn headline(&self) -> String {
        let mut parts = vec![format!(
            "{}/{} leads processed",
            self.processed, self.fetched
        )];
        for (count, label) in [
            (self.degraded, "degraded"),
            (self.failed, "failed"),
            (self.skipped, "skipped (unchanged)"),
            (self.invalid, "invalid"),
        ] {
            if count > 0 {
                parts.push(format!("{} {}", count, label));
            }
        }
        parts.join(", ")
    }

    /// Number of written leads per priority tier.
    pub fn tier_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> =
            PriorityTier::ALL.iter().map(|t| (t.as_str(), 0)).collect();
        for tier in self.leads.iter().filter_map(|l| l.priority_tier) {
            *counts.entry(tier.as_str()).or_default() += 1;
        }
        counts
    }

    /// Written leads ranked by ICP score, best first.
    pub fn top_leads(&self, n: usize) -> Vec<&LeadDigest> {
        let mut scored: Vec<&LeadDigest> = self
            .leads
            .iter()
            .filter(|l| l.icp_score.is_some())
            .collect();
        scored.sort_by(|a, b| b.icp_score.cmp(&a.icp_score));
        scored.truncate(n);
        scored
    }
}

/// What the four stages produced for one lead.
enum StageOutcome {
    Completed {
        fields: DerivedFields,
        degraded: Vec<PartialFailure>,
    },
    /// A stage ran out of retries; later stages were not run.
    Abandoned(PartialFailure),
}

enum Triage {
    Abandon(PartialFailure),
    Degrade(PartialFailure),
}

fn triage(failure: PartialFailure) -> Result<Triage, AppError> {
    if failure.is_auth() {
        return Err(failure.error.into());
    }
    if failure.is_transient() {
        Ok(Triage::Abandon(failure))
    } else {
        Ok(Triage::Degrade(failure))
    }
}

pub struct Pipeline<C, S> {
    config: Config,
    llm: LlmAdapter<C>,
    store: S,
}

impl<C: LlmClient, S: RecordStore> Pipeline<C, S> {
    pub fn new(config: Config, client: C, store: S) -> Self {
        let llm = LlmAdapter::new(client, config.retry);
        Self { config, llm, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the pipeline over every lead matching `options`.
    pub async fn run(
        &self,
        fingerprints: &mut FingerprintStore,
        options: &RunOptions,
    ) -> Result<RunSummary, AppError> {
        let full_refresh = options.full_refresh || !self.config.incremental_enabled;
        let mut summary = RunSummary {
            dry_run: options.dry_run,
            ..RunSummary::default()
        };

        if options.dry_run {
            tracing::info!("DRY RUN - no record store writes, no fingerprint updates");
        }

        let filter = LeadFilter {
            status: options.status.clone(),
            limit: options.limit,
        };
        let leads = self.store.query_leads(&filter).await?;
        summary.fetched = leads.len();
        if leads.is_empty() {
            tracing::warn!("No leads found");
            return Ok(summary);
        }
        tracing::info!("Found {} lead(s)", leads.len());

        let total = leads.len();
        for (i, lead) in leads.iter().enumerate() {
            if !lead.is_valid() {
                tracing::warn!("[{}/{}] Skipping lead {}: no company name", i + 1, total, lead.id);
                summary.invalid += 1;
                continue;
            }

            let hash = content_hash(lead);
            if !fingerprints.should_process(&lead.id, &hash, full_refresh) {
                tracing::debug!("[{}/{}] Unchanged, skipping: {}", i + 1, total, lead.company);
                summary.skipped += 1;
                continue;
            }

            tracing::info!("[{}/{}] Processing: {}", i + 1, total, lead.company);
            let has_core_outputs = self.process_lead(lead, options, &mut summary).await?;

            if !options.dry_run {
                fingerprints.update(&lead.id, &hash, has_core_outputs);
                fingerprints.save()?;
            }
        }

        tracing::info!("Pipeline complete - {}", summary.headline());
        if !summary.schema_mismatches.is_empty() {
            tracing::warn!(
                "Missing output columns (run with --setup to create them): {}",
                summary
                    .schema_mismatches
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        for error in &summary.errors {
            tracing::info!("  - {}", error);
        }

        Ok(summary)
    }

    /// Derives and writes one lead's fields; returns `has_core_outputs`.
    async fn process_lead(
        &self,
        lead: &Lead,
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> Result<bool, AppError> {
        let (fields, degraded) = match self.derive_fields(lead, options.today).await? {
            StageOutcome::Abandoned(failure) => {
                tracing::error!("Giving up on {}: {}", lead.company, failure);
                summary.failed += 1;
                summary.errors.push(format!("{}: {}", lead.company, failure));
                summary.leads.push(LeadDigest::failed(lead));
                return Ok(false);
            }
            StageOutcome::Completed { fields, degraded } => (fields, degraded),
        };

        let properties = fields.to_properties();
        if options.dry_run {
            tracing::info!(
                "DRY RUN - would write {} properties for {}: tier={}, action={}",
                properties.len(),
                lead.company,
                fields.priority.tier,
                fields.action.next_action
            );
            for (field, value) in &properties {
                let text = value.as_text();
                let preview: String = text.chars().take(80).collect();
                tracing::debug!("  {} = {}", field.key(), preview);
            }
        } else {
            match self.store.write_properties(&lead.id, &properties).await {
                Ok(report) => {
                    for column in report.skipped_columns {
                        if !summary.schema_mismatches.contains(&column) {
                            let err = AppError::SchemaMismatch(format!(
                                "output column '{}' not found, its values are skipped",
                                column
                            ));
                            tracing::warn!("{}", err);
                            summary.errors.push(err.to_string());
                            summary.schema_mismatches.insert(column);
                        }
                    }
                }
                Err(AppError::Auth(msg)) => return Err(AppError::Auth(msg)),
                Err(e) => {
                    tracing::error!("Failed to write results for {}: {}", lead.company, e);
                    summary.failed += 1;
                    summary.errors.push(format!("{}: write-back failed: {}", lead.company, e));
                    summary.leads.push(LeadDigest::failed(lead));
                    return Ok(false);
                }
            }
        }

        if degraded.is_empty() {
            summary.processed += 1;
            summary
                .leads
                .push(LeadDigest::completed(lead, &fields, LeadOutcome::Processed));
            tracing::info!("Done: {}", lead.company);
            Ok(true)
        } else {
            summary.degraded += 1;
            for failure in &degraded {
                summary.errors.push(format!("{}: {}", lead.company, failure));
            }
            summary
                .leads
                .push(LeadDigest::completed(lead, &fields, LeadOutcome::Degraded));
            tracing::warn!(
                "Done with fallbacks: {} ({} stage(s) degraded)",
                lead.company,
                degraded.len()
            );
            Ok(false)
        }
    }

    async fn derive_fields(&self, lead: &Lead, today: NaiveDate) -> Result<StageOutcome, AppError> {
        let config = &self.config;
        let mut degraded = Vec::new();

        let icp = match icp::score_lead(&self.llm, lead, config).await {
            Ok(fields) => Some(fields),
            Err(failure) => match triage(failure)? {
                Triage::Abandon(f) => return Ok(StageOutcome::Abandoned(f)),
                Triage::Degrade(f) => {
                    tracing::warn!("ICP scoring failed for {}: {}", lead.company, f);
                    degraded.push(f);
                    None
                }
            },
        };

        let research = match research::research_lead(&self.llm, lead).await {
            Ok(fields) => fields,
            Err(failure) => match triage(failure)? {
                Triage::Abandon(f) => return Ok(StageOutcome::Abandoned(f)),
                Triage::Degrade(f) => {
                    tracing::warn!("Research failed for {}: {}", lead.company, f);
                    degraded.push(f);
                    research::fallback(lead)
                }
            },
        };

        let priority = match priority::prioritize(&self.llm, lead, icp.as_ref(), &research, today, config).await {
            Ok(fields) => fields,
            Err(failure) => match triage(failure)? {
                Triage::Abandon(f) => return Ok(StageOutcome::Abandoned(f)),
                Triage::Degrade(f) => {
                    tracing::warn!("Prioritization failed for {}: {}", lead.company, f);
                    let fields = priority::fallback(lead, &research, today, config, &f);
                    degraded.push(f);
                    fields
                }
            },
        };

        let action = match action::recommend_action(&self.llm, lead, icp.as_ref(), &research, &priority, config).await {
            Ok(fields) => fields,
            Err(failure) => match triage(failure)? {
                Triage::Abandon(f) => return Ok(StageOutcome::Abandoned(f)),
                Triage::Degrade(f) => {
                    tracing::warn!("Action recommendation failed for {}: {}", lead.company, f);
                    let fields = action::fallback(&f);
                    degraded.push(f);
                    fields
                }
            },
        };

        Ok(StageOutcome::Completed {
            fields: DerivedFields {
                icp,
                research,
                priority,
                action,
            },
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::llm::Stage;

    #[test]
    fn triage_separates_abandon_degrade_and_abort() {
        let abandon = triage(PartialFailure::new(Stage::Icp, LlmError::Timeout)).unwrap();
        assert!(matches!(abandon, Triage::Abandon(_)));

        let degrade = triage(PartialFailure::new(
            Stage::Action,
            LlmError::InvalidResponseShape("x".into()),
        ))
        .unwrap();
        assert!(matches!(degrade, Triage::Degrade(_)));

        let abort = triage(PartialFailure::new(Stage::Research, LlmError::Auth("401".into())));
        assert!(matches!(abort, Err(AppError::Auth(_))));
    }

    fn digest(company: &str, icp_score: Option<u8>, tier: PriorityTier) -> LeadDigest {
        LeadDigest {
            lead_id: company.to_lowercase(),
            company: company.to_string(),
            outcome: LeadOutcome::Processed,
            icp_score,
            priority_tier: Some(tier),
            next_action: Some(NextAction::Nurture),
            stale: Some(false),
        }
    }

    #[test]
    fn summary_headline_and_rankings() {
        let summary = RunSummary {
            fetched: 4,
            processed: 3,
            skipped: 1,
            leads: vec![
                digest("A", Some(50), PriorityTier::Medium),
                digest("B", Some(90), PriorityTier::High),
                digest("C", None, PriorityTier::Review),
            ],
            ..RunSummary::default()
        };

        assert_eq!(summary.headline(), "3/4 leads processed, 1 skipped (unchanged)");
        let top: Vec<&str> = summary.top_leads(3).iter().map(|l| l.company.as_str()).collect();
        assert_eq!(top, vec!["B", "A"]);
        let tiers = summary.tier_counts();
        assert_eq!(tiers["high"], 1);
        assert_eq!(tiers["low"], 0);
        assert_eq!(tiers["review"], 1);
    }
}

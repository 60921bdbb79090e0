//! Deterministic lead rules: priority shortcuts, staleness, action shortcuts
//! and the data-sufficiency ladder.
//!
//! Everything here is pure. Thresholds come in as arguments; nothing reads
//! the environment.

use crate::config::{ConfidenceBands, Thresholds};
use crate::models::{Confidence, Lead, NextAction, PriorityTier};
use chrono::NaiveDate;

/// Outcome of the deterministic priority classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityVerdict {
    Decided { tier: PriorityTier, reason: String },
    /// Edge case; the caller falls back to the LLM.
    Insufficient,
}

/// Whole days since the last contact. Future dates count as today.
pub fn days_since_contact(last_contacted: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    last_contacted.map(|date| (today - date).num_days().max(0))
}

/// A lead never contacted is maximally stale.
pub fn is_stale(days_since_contact: Option<i64>, thresholds: &Thresholds) -> bool {
    match days_since_contact {
        None => true,
        Some(days) => days >= thresholds.stale_days_threshold as i64,
    }
}

/// Clear-cut priority cases.
///
/// `high` needs a strong score and a known recent contact; `low` needs a weak
/// score and a stale (or unknown) contact. Everything in between is left to
/// the model. ICP confidence plays no part here.
pub fn classify_priority_deterministic(
    icp_score: u8,
    days_since_contact: Option<i64>,
    thresholds: &Thresholds,
) -> PriorityVerdict {
    let icp = icp_score as u32;

    if icp >= thresholds.high_icp_min {
        if let Some(days) = days_since_contact {
            if days <= thresholds.high_recency_max as i64 {
                return PriorityVerdict::Decided {
                    tier: PriorityTier::High,
                    reason: format!(
                        "Strong ICP fit ({}) with recent contact ({}d ago).",
                        icp_score, days
                    ),
                };
            }
        }
    }

    if icp <= thresholds.low_icp_max {
        let stale_enough = days_since_contact
            .map_or(true, |days| days >= thresholds.low_stale_days as i64);
        if stale_enough {
            let contact = match days_since_contact {
                Some(days) => format!("{}d since contact", days),
                None => "never contacted".to_string(),
            };
            return PriorityVerdict::Decided {
                tier: PriorityTier::Low,
                reason: format!(
                    "Weak ICP fit ({}, threshold {}) and stale lead ({}).",
                    icp_score, thresholds.low_icp_max, contact
                ),
            };
        }
    }

    PriorityVerdict::Insufficient
}

/// Unambiguous next actions. `None` means the model decides.
pub fn recommend_action_deterministic(
    tier: PriorityTier,
    stale: bool,
    icp_score: Option<u8>,
    confidence_score: Option<u8>,
    bands: &ConfidenceBands,
) -> Option<(NextAction, String)> {
    match tier {
        PriorityTier::Review => Some((
            NextAction::EnrichData,
            "Insufficient signal to act confidently; gather more context first.".to_string(),
        )),
        PriorityTier::Low => Some((
            NextAction::Nurture,
            "Low-priority lead; keep warm with low-touch nurture instead of immediate sales effort."
                .to_string(),
        )),
        PriorityTier::High if !stale => Some((
            NextAction::OutreachNow,
            "High-priority lead with recent activity; immediate outreach has the best chance to convert."
                .to_string(),
        )),
        PriorityTier::High => Some((
            NextAction::Reengage,
            "Strong fit but stale activity; run a re-engagement sequence before closing as inactive."
                .to_string(),
        )),
        PriorityTier::Medium => match (icp_score, confidence_score) {
            (None, _) | (_, None) => Some((
                NextAction::EnrichData,
                "No ICP assessment available; enrich the record before acting.".to_string(),
            )),
            (Some(_), Some(confidence)) if confidence <= bands.low_max => Some((
                NextAction::EnrichData,
                format!(
                    "Medium priority on thin data (confidence {}); enrich before committing sales time.",
                    confidence
                ),
            )),
            _ => None,
        },
    }
}

/// How much real input a lead carries beyond its company name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataSufficiency {
    /// Neither website nor notes.
    Minimal,
    /// One of website or notes.
    Partial,
    /// Both website and notes.
    Rich,
}

impl DataSufficiency {
    pub fn assess(lead: &Lead) -> Self {
        let sources = [lead.website.is_some(), lead.notes.is_some()]
            .iter()
            .filter(|present| **present)
            .count();
        match sources {
            0 => DataSufficiency::Minimal,
            1 => DataSufficiency::Partial,
            _ => DataSufficiency::Rich,
        }
    }

    /// Highest numeric confidence this much data can justify.
    pub fn max_confidence_score(&self, bands: &ConfidenceBands) -> u8 {
        match self {
            DataSufficiency::Minimal => bands.low_max,
            DataSufficiency::Partial => bands.medium_max,
            DataSufficiency::Rich => 100,
        }
    }

    /// Highest qualitative confidence this much data can justify.
    pub fn max_confidence(&self) -> Confidence {
        match self {
            DataSufficiency::Minimal => Confidence::Low,
            DataSufficiency::Partial => Confidence::Medium,
            DataSufficiency::Rich => Confidence::High,
        }
    }

    pub fn clamp_score(&self, score: u8, bands: &ConfidenceBands) -> u8 {
        score.min(self.max_confidence_score(bands))
    }

    /// Named apart from `Ord::clamp`, which the derive would otherwise pick.
    pub fn clamp_confidence(&self, confidence: Confidence) -> Confidence {
        confidence.min(self.max_confidence())
    }
}

/// Clamps an arbitrary model number into `0..=100`.
pub fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

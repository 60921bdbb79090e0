use super::{text_field, truncate_chars, PartialFailure};
use crate::config::Config;
use crate::llm::{CompletionRequest, FieldKind, FieldSpec, LlmAdapter, LlmClient, SchemaHint, Stage};
use crate::models::{
    IcpFields, Lead, PriorityFields, PriorityTier, ResearchFields, SignalFields, SignalStrength,
};
use crate::prompts;
use crate::rules::{self, PriorityVerdict};
use crate::signals::detect_signal;
use chrono::NaiveDate;

const MAX_REASONING_CHARS: usize = 1000;

const SCHEMA: SchemaHint = SchemaHint::new(&[
    FieldSpec::required("priority_tier", FieldKind::Text),
    FieldSpec::required("priority_reasoning", FieldKind::Text),
]);

/// Context shared by the decided and fallback paths.
struct Facts {
    days_since_contact: Option<i64>,
    stale_flag: bool,
    signal: SignalFields,
}

impl Facts {
    fn gather(lead: &Lead, research: &ResearchFields, today: NaiveDate, config: &Config) -> Self {
        let days_since_contact = rules::days_since_contact(lead.last_contacted, today);
        Self {
            days_since_contact,
            stale_flag: rules::is_stale(days_since_contact, &config.thresholds),
            signal: detect_signal(&[
                lead.notes.as_deref(),
                lead.status.as_deref(),
                Some(research.brief.as_str()),
            ]),
        }
    }

    fn into_fields(self, tier: PriorityTier, reasoning: String) -> PriorityFields {
        PriorityFields {
            tier,
            reasoning: truncate_chars(&reasoning, MAX_REASONING_CHARS),
            stale_flag: self.stale_flag,
            days_since_contact: self.days_since_contact,
            signal: self.signal,
        }
    }
}

/// Assigns a priority tier: rules first, the model only for edge cases.
///
/// Without an ICP score the lead goes to `review` and the model is not asked.
pub async fn prioritize<C: LlmClient>(
    llm: &LlmAdapter<C>,
    lead: &Lead,
    icp: Option<&IcpFields>,
    research: &ResearchFields,
    today: NaiveDate,
    config: &Config,
) -> Result<PriorityFields, PartialFailure> {
    let facts = Facts::gather(lead, research, today, config);

    let Some(icp) = icp else {
        tracing::info!("Priority for {}: review (no ICP score)", lead.company);
        return Ok(facts.into_fields(
            PriorityTier::Review,
            "No ICP score available; manual review required.".to_string(),
        ));
    };

    let verdict = rules::classify_priority_deterministic(
        icp.icp_score,
        facts.days_since_contact,
        &config.thresholds,
    );

    let (tier, reasoning) = match verdict {
        PriorityVerdict::Decided { tier, reason } => {
            tracing::info!("Priority for {}: {} (rule)", lead.company, tier);
            (tier, reason)
        }
        PriorityVerdict::Insufficient => {
            let request = CompletionRequest::structured(
                Stage::Priority,
                prompts::PRIORITY_SYSTEM,
                prompts::priority_prompt(lead, icp, research, facts.days_since_contact, &SCHEMA),
            );
            let object = llm
                .complete(&request, &SCHEMA)
                .await
                .map_err(|e| PartialFailure::new(Stage::Priority, e))?;

            let tier = text_field(&object, "priority_tier")
                .map(|raw| PriorityTier::from_model_output(&raw))
                .unwrap_or(PriorityTier::Review);
            let reasoning = text_field(&object, "priority_reasoning").unwrap_or_default();

            let (tier, reasoning) = apply_signal_boost(tier, reasoning, icp, &facts.signal, config);
            tracing::info!("Priority for {}: {} (llm)", lead.company, tier);
            (tier, reasoning)
        }
    };

    Ok(facts.into_fields(tier, reasoning))
}

/// A strong trigger signal lifts a model-decided `medium` to `high`, unless
/// the ICP score is in the low band.
fn apply_signal_boost(
    tier: PriorityTier,
    reasoning: String,
    icp: &IcpFields,
    signal: &SignalFields,
    config: &Config,
) -> (PriorityTier, String) {
    let eligible = tier == PriorityTier::Medium
        && signal.strength == SignalStrength::High
        && icp.icp_score as u32 > config.thresholds.low_icp_max;
    if !eligible {
        return (tier, reasoning);
    }
    (
        PriorityTier::High,
        format!(
            "Boosted from medium to high: {} {}",
            signal.reasoning,
            reasoning
        ),
    )
}

/// Priority bundle used when the model call failed for a non-transient reason.
pub fn fallback(
    lead: &Lead,
    research: &ResearchFields,
    today: NaiveDate,
    config: &Config,
    failure: &PartialFailure,
) -> PriorityFields {
    Facts::gather(lead, research, today, config).into_fields(
        PriorityTier::Review,
        format!("Automatic prioritization failed ({}); manual review required.", failure.error),
    )
}

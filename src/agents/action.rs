use super::{text_field, truncate_chars, PartialFailure};
use crate::config::Config;
use crate::llm::{CompletionRequest, FieldKind, FieldSpec, LlmAdapter, LlmClient, SchemaHint, Stage};
use crate::models::{ActionFields, Confidence, IcpFields, Lead, NextAction, PriorityFields, ResearchFields};
use crate::prompts;
use crate::rules::{self, DataSufficiency};

const MAX_REASONING_CHARS: usize = 1000;

const SCHEMA: SchemaHint = SchemaHint::new(&[
    FieldSpec::required("next_action", FieldKind::Text),
    FieldSpec::required("action_reasoning", FieldKind::Text),
    FieldSpec::optional("action_confidence", FieldKind::Text),
]);

/// Recommends the next best action for a lead.
pub async fn recommend_action<C: LlmClient>(
    llm: &LlmAdapter<C>,
    lead: &Lead,
    icp: Option<&IcpFields>,
    research: &ResearchFields,
    priority: &PriorityFields,
    config: &Config,
) -> Result<ActionFields, PartialFailure> {
    let sufficiency = DataSufficiency::assess(lead);

    if let Some((next_action, reasoning)) = rules::recommend_action_deterministic(
        priority.tier,
        priority.stale_flag,
        icp.map(|i| i.icp_score),
        icp.map(|i| i.confidence_score),
        &config.confidence_bands,
    ) {
        let confidence = sufficiency.max_confidence();
        tracing::info!(
            "Action for {}: {} ({}, rule)",
            lead.company,
            next_action,
            confidence
        );
        return Ok(ActionFields {
            next_action,
            reasoning,
            confidence,
        });
    }

    let request = CompletionRequest::structured(
        Stage::Action,
        prompts::ACTION_SYSTEM,
        prompts::action_prompt(lead, icp, research, priority.tier, priority.stale_flag, &SCHEMA),
    );
    let object = llm
        .complete(&request, &SCHEMA)
        .await
        .map_err(|e| PartialFailure::new(Stage::Action, e))?;

    let next_action = text_field(&object, "next_action")
        .map(|raw| NextAction::from_model_output(&raw))
        .unwrap_or(NextAction::EnrichData);
    let confidence = text_field(&object, "action_confidence")
        .and_then(|raw| Confidence::parse(&raw))
        .unwrap_or(Confidence::Medium);
    let reasoning = text_field(&object, "action_reasoning")
        .unwrap_or_else(|| "Determine next step from available lead context.".to_string());

    let fields = ActionFields {
        next_action,
        reasoning: truncate_chars(&reasoning, MAX_REASONING_CHARS),
        confidence: sufficiency.clamp_confidence(confidence),
    };
    tracing::info!(
        "Action for {}: {} ({}, llm)",
        lead.company,
        fields.next_action,
        fields.confidence
    );
    Ok(fields)
}

/// Action bundle used when the model call failed for a non-transient reason.
pub fn fallback(failure: &PartialFailure) -> ActionFields {
    ActionFields {
        next_action: NextAction::EnrichData,
        reasoning: format!(
            "Could not determine an action automatically ({}); enrich the record before acting.",
            failure.error
        ),
        confidence: Confidence::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::llm::testing::{fast_retry, ScriptedClient};
    use crate::models::{PriorityTier, SignalFields};
    use std::collections::HashMap;

    fn config() -> Config {
        let vars = HashMap::from([("CLAUDE_API_KEY".to_string(), "sk-ant-test".to_string())]);
        Config::from_map(&vars).unwrap()
    }

    fn research() -> ResearchFields {
        ResearchFields {
            brief: "b".into(),
            confidence: Confidence::Medium,
            citations: vec![],
            providers: vec![],
        }
    }

    fn priority(tier: PriorityTier, stale_flag: bool) -> PriorityFields {
        PriorityFields {
            tier,
            reasoning: "r".into(),
            stale_flag,
            days_since_contact: None,
            signal: SignalFields::none(),
        }
    }

    fn icp() -> IcpFields {
        IcpFields {
            icp_score: 60,
            confidence_score: 60,
            icp_reasoning: "r".into(),
        }
    }

    fn rich_lead() -> Lead {
        Lead::new("1", "Acme").with_website("acme.com").with_notes("n")
    }

    #[tokio::test(start_paused = true)]
    async fn high_fresh_lead_is_outreach_now_without_llm() {
        let client = ScriptedClient::replying("{}");
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = recommend_action(
            &llm,
            &rich_lead(),
            Some(&icp()),
            &research(),
            &priority(PriorityTier::High, false),
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(fields.next_action, NextAction::OutreachNow);
        assert_eq!(fields.confidence, Confidence::High);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shortcut_confidence_respects_ladder() {
        let client = ScriptedClient::replying("{}");
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = recommend_action(
            &llm,
            &Lead::new("1", "Acme"),
            None,
            &research(),
            &priority(PriorityTier::Review, true),
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(fields.next_action, NextAction::EnrichData);
        assert_eq!(fields.confidence, Confidence::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn medium_lead_asks_llm_and_coerces_garbage() {
        let client = ScriptedClient::replying(
            r#"{"next_action": "send flowers", "action_reasoning": "why not", "action_confidence": "certain"}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = recommend_action(
            &llm,
            &rich_lead(),
            Some(&icp()),
            &research(),
            &priority(PriorityTier::Medium, false),
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(client.call_count(), 1);
        assert_eq!(fields.next_action, NextAction::EnrichData);
        assert_eq!(fields.confidence, Confidence::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn model_confidence_is_clamped_for_partial_data() {
        let client = ScriptedClient::replying(
            r#"{"next_action": "nurture", "action_reasoning": "ok", "action_confidence": "high"}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = recommend_action(
            &llm,
            &Lead::new("1", "Acme").with_notes("n"),
            Some(&icp()),
            &research(),
            &priority(PriorityTier::Medium, false),
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(fields.next_action, NextAction::Nurture);
        assert_eq!(fields.confidence, Confidence::Medium);
    }

    #[test]
    fn fallback_is_enrich_data_low() {
        let failure = PartialFailure::new(Stage::Action, LlmError::InvalidResponseShape("x".into()));
        let fields = fallback(&failure);
        assert_eq!(fields.next_action, NextAction::EnrichData);
        assert_eq!(fields.confidence, Confidence::Low);
    }
}

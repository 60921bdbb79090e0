use super::{number_field, text_field, truncate_chars, PartialFailure};
use crate::config::Config;
use crate::llm::{CompletionRequest, FieldKind, FieldSpec, LlmAdapter, LlmClient, SchemaHint, Stage};
use crate::models::{IcpFields, Lead};
use crate::prompts::{self, ICP_DIMENSIONS};
use crate::rules::{clamp_score, DataSufficiency};
use serde_json::{Map, Value};

const MAX_REASONING_CHARS: usize = 1000;
const MAX_DIMENSION_SCORE: f64 = 20.0;

const SCHEMA: SchemaHint = SchemaHint::new(&[
    FieldSpec::optional("icp_score", FieldKind::Number),
    FieldSpec::required("confidence_score", FieldKind::Number),
    FieldSpec::required("icp_reasoning", FieldKind::Text),
    FieldSpec::optional("data_gaps", FieldKind::Text),
]);

/// Scores a lead against the ideal customer profile.
pub async fn score_lead<C: LlmClient>(
    llm: &LlmAdapter<C>,
    lead: &Lead,
    config: &Config,
) -> Result<IcpFields, PartialFailure> {
    let request = CompletionRequest::structured(
        Stage::Icp,
        prompts::ICP_SYSTEM,
        prompts::icp_prompt(lead, &config.icp_criteria, &SCHEMA),
    );

    let object = llm
        .complete(&request, &SCHEMA)
        .await
        .map_err(|e| PartialFailure::new(Stage::Icp, e))?;

    let fields = parse(&object, DataSufficiency::assess(lead), config);
    tracing::info!(
        "ICP for {}: score={}, confidence={}",
        lead.company,
        fields.icp_score,
        fields.confidence_score
    );
    Ok(fields)
}

fn parse(object: &Map<String, Value>, sufficiency: DataSufficiency, config: &Config) -> IcpFields {
    let dimension_total: f64 = object
        .get("dimension_scores")
        .and_then(Value::as_object)
        .map(|dims| {
            ICP_DIMENSIONS
                .iter()
                .filter_map(|(key, _)| dims.get(*key).and_then(Value::as_f64))
                .map(|score| score.clamp(0.0, MAX_DIMENSION_SCORE))
                .sum()
        })
        .unwrap_or(0.0);

    let icp_score = clamp_score(number_field(object, "icp_score").unwrap_or(dimension_total));

    let claimed = clamp_score(number_field(object, "confidence_score").unwrap_or(0.0));
    let confidence_score = sufficiency.clamp_score(claimed, &config.confidence_bands);
    if confidence_score < claimed {
        tracing::debug!(
            "Clamped ICP confidence from {} to {} ({:?} data)",
            claimed,
            confidence_score,
            sufficiency
        );
    }

    let mut reasoning = text_field(object, "icp_reasoning").unwrap_or_default();
    if let Some(gaps) = text_field(object, "data_gaps") {
        reasoning = format!("{} Data gaps: {}", reasoning, gaps);
    }
    if sufficiency == DataSufficiency::Minimal {
        reasoning = format!("Insufficient data (company name only). {}", reasoning);
    }

    IcpFields {
        icp_score,
        confidence_score,
        icp_reasoning: truncate_chars(reasoning.trim(), MAX_REASONING_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::llm::testing::{fast_retry, ScriptedClient};
    use std::collections::HashMap;

    fn config() -> Config {
        let vars = HashMap::from([("CLAUDE_API_KEY".to_string(), "sk-ant-test".to_string())]);
        Config::from_map(&vars).unwrap()
    }

    fn rich_lead() -> Lead {
        Lead::new("1", "ExampleCo")
            .with_website("example.com")
            .with_notes("B2B SaaS, 150 employees")
    }

    #[tokio::test(start_paused = true)]
    async fn company_only_lead_gets_lowest_band_confidence() {
        let client = ScriptedClient::replying(
            r#"{"icp_score": 90, "confidence_score": 95, "icp_reasoning": "Looks great"}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = score_lead(&llm, &Lead::new("1", "Mystery Inc"), &config()).await.unwrap();

        assert_eq!(fields.icp_score, 90);
        assert!(fields.confidence_score <= config().confidence_bands.low_max);
        assert!(fields.icp_reasoning.starts_with("Insufficient data"));
    }

    #[tokio::test(start_paused = true)]
    async fn rich_lead_keeps_model_confidence() {
        let client = ScriptedClient::replying(
            r#"{"icp_score": 82, "confidence_score": 88, "icp_reasoning": "Strong fit"}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = score_lead(&llm, &rich_lead(), &config()).await.unwrap();

        assert_eq!(fields.icp_score, 82);
        assert_eq!(fields.confidence_score, 88);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_numbers_are_clamped() {
        let client = ScriptedClient::replying(
            r#"{"icp_score": 140, "confidence_score": -20, "icp_reasoning": "x"}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = score_lead(&llm, &rich_lead(), &config()).await.unwrap();

        assert_eq!(fields.icp_score, 100);
        assert_eq!(fields.confidence_score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_total_falls_back_to_dimension_sum() {
        let client = ScriptedClient::replying(
            r#"{"confidence_score": 70, "icp_reasoning": "x", "data_gaps": "no revenue data",
                "dimension_scores": {"company_size_stage": 15, "market_industry_fit": 18,
                "budget_buying_signals": 30, "engagement_accessibility": 10, "strategic_alignment": 12}}"#,
        );
        let llm = LlmAdapter::new(&client, fast_retry());

        let fields = score_lead(&llm, &rich_lead(), &config()).await.unwrap();

        // budget dimension is capped at 20
        assert_eq!(fields.icp_score, 75);
        assert!(fields.icp_reasoning.contains("no revenue data"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_partial_failure() {
        let client = ScriptedClient::always(Err(LlmError::Timeout));
        let llm = LlmAdapter::new(&client, fast_retry());

        let failure = score_lead(&llm, &rich_lead(), &config()).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Icp);
        assert!(failure.is_transient());
        assert_eq!(client.call_count(), 3);
    }
}

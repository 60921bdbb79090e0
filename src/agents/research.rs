use super::{text_field, PartialFailure};
use crate::llm::{CompletionRequest, FieldKind, FieldSpec, LlmAdapter, LlmClient, SchemaHint, Stage};
use crate::models::{Confidence, Lead, ResearchFields};
use crate::prompts;
use crate::rules::DataSufficiency;
use serde_json::{Map, Value};

pub const PROVIDER_CRM: &str = "crm";
pub const PROVIDER_LLM: &str = "llm";
pub const PROVIDER_LLM_SKIPPED: &str = "llm:skipped";
pub const PROVIDER_LLM_FAILED: &str = "llm:failed";

const SCHEMA: SchemaHint = SchemaHint::new(&[
    FieldSpec::required("brief", FieldKind::Text),
    FieldSpec::required("citations", FieldKind::TextList),
    FieldSpec::optional("research_confidence", FieldKind::Text),
]);

/// Builds the research brief for a lead.
///
/// Leads with neither website nor notes skip the model entirely and get a
/// speculative brief.
pub async fn research_lead<C: LlmClient>(
    llm: &LlmAdapter<C>,
    lead: &Lead,
) -> Result<ResearchFields, PartialFailure> {
    let sufficiency = DataSufficiency::assess(lead);
    if sufficiency == DataSufficiency::Minimal {
        tracing::info!(
            "Research for {}: no website or notes, skipping LLM",
            lead.company
        );
        return Ok(speculative_brief(lead, PROVIDER_LLM_SKIPPED));
    }

    let request = CompletionRequest::structured(
        Stage::Research,
        prompts::RESEARCH_SYSTEM,
        prompts::research_prompt(lead, &SCHEMA),
    );
    let object = llm
        .complete(&request, &SCHEMA)
        .await
        .map_err(|e| PartialFailure::new(Stage::Research, e))?;

    let fields = assemble(lead, &object, sufficiency);
    tracing::info!(
        "Research for {}: confidence={}, sources={}",
        lead.company,
        fields.confidence,
        fields.source_count()
    );
    Ok(fields)
}

/// Deterministic brief used when the model is skipped or failed.
pub fn fallback(lead: &Lead) -> ResearchFields {
    speculative_brief(lead, PROVIDER_LLM_FAILED)
}

fn speculative_brief(lead: &Lead, llm_provider: &str) -> ResearchFields {
    let citations = input_citations(lead);
    let known = if citations.is_empty() {
        format!("Only the company name \"{}\" is known.", lead.company)
    } else {
        format!(
            "Automated research was unavailable for \"{}\"; only the CRM record was reviewed.",
            lead.company
        )
    };
    let brief = format!(
        "SPECULATIVE: {} No verified facts are available, so nothing here should be \
         relied on for outreach. Enrich the record (website, CRM notes) before acting.",
        known
    );

    ResearchFields {
        brief: with_sources(&brief, &citations),
        confidence: Confidence::Low,
        citations,
        providers: vec![PROVIDER_CRM.to_string(), llm_provider.to_string()],
    }
}

fn assemble(lead: &Lead, object: &Map<String, Value>, sufficiency: DataSufficiency) -> ResearchFields {
    let mut citations = input_citations(lead);
    let model_citations = object
        .get("citations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty());
    for citation in model_citations {
        if !citations.iter().any(|c| c == citation) {
            citations.push(citation.to_string());
        }
    }

    let confidence = text_field(object, "research_confidence")
        .and_then(|raw| Confidence::parse(&raw))
        .unwrap_or(Confidence::Low);

    let brief = text_field(object, "brief").unwrap_or_default();

    ResearchFields {
        brief: with_sources(&brief, &citations),
        confidence: sufficiency.clamp_confidence(confidence),
        citations,
        providers: vec![PROVIDER_CRM.to_string(), PROVIDER_LLM.to_string()],
    }
}

/// Descriptors for the lead's own inputs, in a fixed order.
fn input_citations(lead: &Lead) -> Vec<String> {
    let mut citations = Vec::new();
    if lead.notes.is_some() {
        citations.push("CRM Notes".to_string());
    }
    if let Some(website) = &lead.website {
        citations.push(format!("Website: {}", website));
    }
    citations
}

fn with_sources(brief: &str, citations: &[String]) -> String {
    let sources = if citations.is_empty() {
        "- none".to_string()
    } else {
        citations
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("{}\n\n## SOURCES\n{}", brief.trim(), sources)
}

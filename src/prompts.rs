//! Prompt templates for the field agents.

use crate::llm::SchemaHint;
use crate::models::{IcpFields, Lead, PriorityTier, ResearchFields};

pub const ICP_SYSTEM: &str =
    "You are an expert sales analyst specializing in ICP fit scoring. Always respond with valid JSON.";
pub const RESEARCH_SYSTEM: &str =
    "You are a B2B market research analyst. Never invent facts; mark speculation as such. Always respond with valid JSON.";
pub const PRIORITY_SYSTEM: &str =
    "You are a sales operations analyst who prioritizes pipeline. Always respond with valid JSON.";
pub const ACTION_SYSTEM: &str =
    "You are a sales strategist recommending the next best action. Always respond with valid JSON.";

/// Rubric dimensions, 0-20 points each.
pub const ICP_DIMENSIONS: &[(&str, &str)] = &[
    ("company_size_stage", "Company size and growth stage"),
    ("market_industry_fit", "Market and industry fit"),
    ("budget_buying_signals", "Budget availability and buying signals"),
    ("engagement_accessibility", "Engagement level and decision-maker accessibility"),
    ("strategic_alignment", "Strategic alignment with our offering"),
];

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.unwrap_or(placeholder)
}

fn lead_block(lead: &Lead) -> String {
    format!(
        "Company: {}\nWebsite: {}\nCRM notes: {}\nStatus: {}\nLast contacted: {}",
        lead.company,
        or_placeholder(lead.website.as_deref(), "Not provided"),
        or_placeholder(lead.notes.as_deref(), "No notes available"),
        or_placeholder(lead.status.as_deref(), "Unknown"),
        lead.last_contacted
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Never".to_string()),
    )
}

pub fn icp_prompt(lead: &Lead, icp_criteria: &str, schema: &SchemaHint) -> String {
    let rubric = ICP_DIMENSIONS
        .iter()
        .map(|(key, label)| format!("- {} ({}): 0-20", label, key))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Score this lead against our Ideal Customer Profile.\n\n\
         IDEAL CUSTOMER PROFILE:\n{}\n\n\
         LEAD:\n{}\n\n\
         RUBRIC (sum of dimensions = icp_score, 0-100):\n{}\n\n\
         Also rate your confidence_score (0-100) in the assessment given how much \
         information is available; a lead with only a company name deserves low confidence.\n\n\
         Respond with ONLY a JSON object containing: {}, plus \"dimension_scores\" \
         (an object keyed by the rubric keys) and \"data_gaps\" (a string).",
        icp_criteria,
        lead_block(lead),
        rubric,
        schema.describe()
    )
}

pub fn research_prompt(lead: &Lead, schema: &SchemaHint) -> String {
    format!(
        "Write a short research brief on this company for a sales rep.\n\n\
         LEAD:\n{}\n\n\
         Use only the information above and general knowledge you are confident about. \
         Cover what the company does, likely needs, and talking points. \
         List where each fact came from in \"citations\".\n\n\
         Rate research_confidence as high, medium or low.\n\n\
         Respond with ONLY a JSON object containing: {}.",
        lead_block(lead),
        schema.describe()
    )
}

pub fn priority_prompt(
    lead: &Lead,
    icp: &IcpFields,
    research: &ResearchFields,
    days_since_contact: Option<i64>,
    schema: &SchemaHint,
) -> String {
    let contact = match days_since_contact {
        Some(days) => format!("{} days ago", days),
        None => "never".to_string(),
    };
    format!(
        "Assign a priority tier to this lead.\n\n\
         LEAD:\n{}\n\n\
         ICP score: {}/100 (confidence {}/100)\nICP reasoning: {}\n\
         Last contact: {}\n\n\
         RESEARCH BRIEF:\n{}\n\n\
         Choose priority_tier from: high, medium, low.\n\n\
         Respond with ONLY a JSON object containing: {}.",
        lead_block(lead),
        icp.icp_score,
        icp.confidence_score,
        icp.icp_reasoning,
        contact,
        research.brief,
        schema.describe()
    )
}

pub fn action_prompt(
    lead: &Lead,
    icp: Option<&IcpFields>,
    research: &ResearchFields,
    tier: PriorityTier,
    stale: bool,
    schema: &SchemaHint,
) -> String {
    let icp_line = match icp {
        Some(icp) => format!("ICP score: {}/100 (confidence {}/100)", icp.icp_score, icp.confidence_score),
        None => "ICP score: unavailable".to_string(),
    };
    format!(
        "Recommend the single next best action for this lead.\n\n\
         LEAD:\n{}\n\n\
         {}\nPriority tier: {}\nStale: {}\n\n\
         RESEARCH BRIEF:\n{}\n\n\
         Choose next_action from: outreach_now, reengage, nurture, enrich_data, hold.\n\
         Choose action_confidence from: high, medium, low.\n\n\
         Respond with ONLY a JSON object containing: {}.",
        lead_block(lead),
        icp_line,
        tier,
        if stale { "yes" } else { "no" },
        research.brief,
        schema.describe()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FieldKind, FieldSpec};

    const SCHEMA: SchemaHint = SchemaHint::new(&[FieldSpec::required("icp_score", FieldKind::Number)]);

    #[test]
    fn icp_prompt_embeds_rubric_and_criteria() {
        let lead = Lead::new("1", "Acme");
        let prompt = icp_prompt(&lead, "Hospitals in Europe", &SCHEMA);
        assert!(prompt.contains("Hospitals in Europe"));
        assert!(prompt.contains("strategic_alignment"));
        assert!(prompt.contains("Not provided"));
        assert!(prompt.contains("\"icp_score\""));
    }
}

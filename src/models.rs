//! Core data models: leads read from the record store and the derived
//! fields written back to it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============ Input ============

/// One CRM record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub company: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub last_contacted: Option<NaiveDate>,
    pub status: Option<String>,
}

impl Lead {
    pub fn new(id: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company: company.into().trim().to_string(),
            website: None,
            notes: None,
            last_contacted: None,
            status: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = present(Some(website.into()));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = present(Some(notes.into()));
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = present(Some(status.into()));
        self
    }

    pub fn with_last_contacted(mut self, date: NaiveDate) -> Self {
        self.last_contacted = Some(date);
        self
    }

    /// A lead without a company name cannot be scored or researched.
    pub fn is_valid(&self) -> bool {
        !self.company.trim().is_empty()
    }
}

/// Normalizes an optional attribute: whitespace-only strings become `None`.
pub fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============ Enumerated outputs ============

/// Generates `as_str`, `ALL` and `Display` for a closed set of string values.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Strict parse of a canonical value (case-insensitive, trimmed).
            pub fn parse(raw: &str) -> Option<Self> {
                let normalized = raw.trim().to_ascii_lowercase();
                Self::ALL.iter().copied().find(|v| v.as_str() == normalized)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
    Review,
}

string_enum!(PriorityTier {
    High => "high",
    Medium => "medium",
    Low => "low",
    Review => "review",
});

impl PriorityTier {
    /// Coerces free model text into a tier; anything unexpected is `Review`.
    pub fn from_model_output(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(PriorityTier::Review)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    OutreachNow,
    Reengage,
    Nurture,
    EnrichData,
    Hold,
}

string_enum!(NextAction {
    OutreachNow => "outreach_now",
    Reengage => "reengage",
    Nurture => "nurture",
    EnrichData => "enrich_data",
    Hold => "hold",
});

impl NextAction {
    /// Coerces free model text into an action; unknown text means "get more data".
    pub fn from_model_output(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(NextAction::EnrichData)
    }
}

/// Qualitative confidence. Ordered so that `min` yields the weaker claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

string_enum!(Confidence {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    BuyingIntent,
    Funding,
    LeadershipChange,
    Hiring,
    TechnologyInitiative,
    None,
}

string_enum!(SignalType {
    BuyingIntent => "buying_intent",
    Funding => "funding",
    LeadershipChange => "leadership_change",
    Hiring => "hiring",
    TechnologyInitiative => "technology_initiative",
    None => "none",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    None,
    Medium,
    High,
}

string_enum!(SignalStrength {
    None => "none",
    Medium => "medium",
    High => "high",
});

// ============ Derived field bundles ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcpFields {
    pub icp_score: u8,
    pub confidence_score: u8,
    pub icp_reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchFields {
    pub brief: String,
    pub confidence: Confidence,
    pub citations: Vec<String>,
    pub providers: Vec<String>,
}

impl ResearchFields {
    pub fn source_count(&self) -> usize {
        self.citations.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalFields {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub reasoning: String,
}

impl SignalFields {
    pub fn none() -> Self {
        Self {
            signal_type: SignalType::None,
            strength: SignalStrength::None,
            reasoning: "No trigger signals detected in notes or research.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityFields {
    pub tier: PriorityTier,
    pub reasoning: String,
    pub stale_flag: bool,
    pub days_since_contact: Option<i64>,
    pub signal: SignalFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFields {
    pub next_action: NextAction,
    pub reasoning: String,
    pub confidence: Confidence,
}

/// Everything one run derived for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedFields {
    /// Absent when ICP scoring failed for this lead.
    pub icp: Option<IcpFields>,
    pub research: ResearchFields,
    pub priority: PriorityFields,
    pub action: ActionFields,
}

impl DerivedFields {
    /// Flattens the bundle into logical output properties for write-back.
    pub fn to_properties(&self) -> Vec<(OutputField, FieldValue)> {
        let mut props = Vec::with_capacity(OutputField::ALL.len());

        if let Some(icp) = &self.icp {
            props.push((OutputField::IcpScore, FieldValue::Number(icp.icp_score as i64)));
            props.push((
                OutputField::ConfidenceScore,
                FieldValue::Number(icp.confidence_score as i64),
            ));
            props.push((
                OutputField::IcpReasoning,
                FieldValue::Text(icp.icp_reasoning.clone()),
            ));
        }

        let research = &self.research;
        props.push((OutputField::ResearchBrief, FieldValue::Text(research.brief.clone())));
        props.push((
            OutputField::ResearchConfidence,
            FieldValue::Select(research.confidence.as_str().to_string()),
        ));
        props.push((
            OutputField::ResearchCitations,
            FieldValue::List(research.citations.clone()),
        ));
        props.push((
            OutputField::ResearchSourceCount,
            FieldValue::Number(research.source_count() as i64),
        ));
        props.push((
            OutputField::ResearchProviders,
            FieldValue::List(research.providers.clone()),
        ));

        let priority = &self.priority;
        props.push((
            OutputField::PriorityTier,
            FieldValue::Select(priority.tier.as_str().to_string()),
        ));
        props.push((
            OutputField::PriorityReasoning,
            FieldValue::Text(priority.reasoning.clone()),
        ));
        props.push((OutputField::StaleFlag, FieldValue::Checkbox(priority.stale_flag)));
        props.push((
            OutputField::SignalType,
            FieldValue::Select(priority.signal.signal_type.as_str().to_string()),
        ));
        props.push((
            OutputField::SignalStrength,
            FieldValue::Select(priority.signal.strength.as_str().to_string()),
        ));
        props.push((
            OutputField::SignalReasoning,
            FieldValue::Text(priority.signal.reasoning.clone()),
        ));

        let action = &self.action;
        props.push((
            OutputField::NextAction,
            FieldValue::Select(action.next_action.as_str().to_string()),
        ));
        props.push((
            OutputField::ActionReasoning,
            FieldValue::Text(action.reasoning.clone()),
        ));
        props.push((
            OutputField::ActionConfidence,
            FieldValue::Select(action.confidence.as_str().to_string()),
        ));

        props
    }
}

// ============ Record store property mapping ============

/// A value ready to be written to one record-store column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldValue {
    Number(i64),
    Text(String),
    Select(String),
    Checkbox(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// Plain-text rendering, used when the column is a text column.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) | FieldValue::Select(s) => s.clone(),
            FieldValue::Checkbox(b) => b.to_string(),
            FieldValue::List(items) => items.join("\n"),
        }
    }
}

/// Column kind used when creating missing output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    RichText,
    Checkbox,
    Select(&'static [&'static str]),
}

/// Input attributes read from the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputField {
    Company,
    Website,
    Notes,
    LastContacted,
    Status,
}

impl InputField {
    pub const ALL: &'static [InputField] = &[
        InputField::Company,
        InputField::Website,
        InputField::Notes,
        InputField::LastContacted,
        InputField::Status,
    ];

    /// Suffix of the `NOTION_PROP_*` override key.
    pub fn env_suffix(&self) -> &'static str {
        match self {
            InputField::Company => "COMPANY",
            InputField::Website => "WEBSITE",
            InputField::Notes => "NOTES",
            InputField::LastContacted => "LAST_CONTACTED",
            InputField::Status => "STATUS",
        }
    }

    pub fn default_column(&self) -> &'static str {
        match self {
            InputField::Company => "Company",
            InputField::Website => "Website",
            InputField::Notes => "Notes",
            InputField::LastContacted => "Last Contacted",
            InputField::Status => "Status",
        }
    }
}

/// Derived properties written back to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputField {
    IcpScore,
    ConfidenceScore,
    IcpReasoning,
    ResearchBrief,
    ResearchConfidence,
    ResearchCitations,
    ResearchSourceCount,
    ResearchProviders,
    PriorityTier,
    PriorityReasoning,
    StaleFlag,
    SignalType,
    SignalStrength,
    SignalReasoning,
    NextAction,
    ActionReasoning,
    ActionConfidence,
}

const CONFIDENCE_OPTIONS: &[&str] = &["high", "medium", "low"];
const PRIORITY_OPTIONS: &[&str] = &["high", "medium", "low", "review"];
const ACTION_OPTIONS: &[&str] = &["outreach_now", "reengage", "nurture", "enrich_data", "hold"];
const SIGNAL_TYPE_OPTIONS: &[&str] = &[
    "buying_intent",
    "funding",
    "leadership_change",
    "hiring",
    "technology_initiative",
    "none",
];
const SIGNAL_STRENGTH_OPTIONS: &[&str] = &["high", "medium", "none"];

impl OutputField {
    pub const ALL: &'static [OutputField] = &[
        OutputField::IcpScore,
        OutputField::ConfidenceScore,
        OutputField::IcpReasoning,
        OutputField::ResearchBrief,
        OutputField::ResearchConfidence,
        OutputField::ResearchCitations,
        OutputField::ResearchSourceCount,
        OutputField::ResearchProviders,
        OutputField::PriorityTier,
        OutputField::PriorityReasoning,
        OutputField::StaleFlag,
        OutputField::SignalType,
        OutputField::SignalStrength,
        OutputField::SignalReasoning,
        OutputField::NextAction,
        OutputField::ActionReasoning,
        OutputField::ActionConfidence,
    ];

    /// Logical name; also the default column name.
    pub fn key(&self) -> &'static str {
        match self {
            OutputField::IcpScore => "icp_score",
            OutputField::ConfidenceScore => "confidence_score",
            OutputField::IcpReasoning => "icp_reasoning",
            OutputField::ResearchBrief => "research_brief",
            OutputField::ResearchConfidence => "research_confidence",
            OutputField::ResearchCitations => "research_citations",
            OutputField::ResearchSourceCount => "research_source_count",
            OutputField::ResearchProviders => "research_providers",
            OutputField::PriorityTier => "priority_tier",
            OutputField::PriorityReasoning => "priority_reasoning",
            OutputField::StaleFlag => "stale_flag",
            OutputField::SignalType => "signal_type",
            OutputField::SignalStrength => "signal_strength",
            OutputField::SignalReasoning => "signal_reasoning",
            OutputField::NextAction => "next_action",
            OutputField::ActionReasoning => "action_reasoning",
            OutputField::ActionConfidence => "action_confidence",
        }
    }

    pub fn column_kind(&self) -> ColumnKind {
        match self {
            OutputField::IcpScore
            | OutputField::ConfidenceScore
            | OutputField::ResearchSourceCount => ColumnKind::Number,
            OutputField::IcpReasoning
            | OutputField::ResearchBrief
            | OutputField::ResearchCitations
            | OutputField::ResearchProviders
            | OutputField::PriorityReasoning
            | OutputField::SignalReasoning
            | OutputField::ActionReasoning => ColumnKind::RichText,
            OutputField::StaleFlag => ColumnKind::Checkbox,
            OutputField::ResearchConfidence | OutputField::ActionConfidence => {
                ColumnKind::Select(CONFIDENCE_OPTIONS)
            }
            OutputField::PriorityTier => ColumnKind::Select(PRIORITY_OPTIONS),
            OutputField::NextAction => ColumnKind::Select(ACTION_OPTIONS),
            OutputField::SignalType => ColumnKind::Select(SIGNAL_TYPE_OPTIONS),
            OutputField::SignalStrength => ColumnKind::Select(SIGNAL_STRENGTH_OPTIONS),
        }
    }
}

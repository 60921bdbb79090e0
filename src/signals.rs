//! Trigger-signal detection over free text (CRM notes, status, research brief).

use crate::models::{SignalFields, SignalStrength, SignalType};
use regex::Regex;
use std::sync::LazyLock;

const MAX_EXCERPT_CHARS: usize = 120;

struct SignalRule {
    signal_type: SignalType,
    strength: SignalStrength,
    patterns: Vec<Regex>,
}

fn rule(signal_type: SignalType, strength: SignalStrength, patterns: &[&str]) -> SignalRule {
    SignalRule {
        signal_type,
        strength,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("signal patterns are valid regex"))
            .collect(),
    }
}

// Ordered: on equal strength the earlier rule wins
static RULES: LazyLock<Vec<SignalRule>> = LazyLock::new(|| {
    vec![
        rule(
            SignalType::BuyingIntent,
            SignalStrength::High,
            &[
                r"\brequested (a )?demo\b",
                r"\brfp\b",
                r"\bevaluating (vendors|solutions|tools)\b",
                r"\bbudget (approved|allocated)\b",
                r"\bpilot (program|project)\b",
                r"\bactively (searching|looking)\b",
            ],
        ),
        rule(
            SignalType::Funding,
            SignalStrength::High,
            &[
                r"\bseries [a-e]\b",
                r"\bseed round\b",
                r"\braised \$?\d+(\.\d+)?\s*(k|m|mm|million|b|billion)?\b",
                r"\bnew funding\b",
                r"\bventure[- ]backed\b",
            ],
        ),
        rule(
            SignalType::LeadershipChange,
            SignalStrength::High,
            &[
                r"\bnew (vp|head|chief|ceo|cro|cmo|cto)\b",
                r"\bnew head of sales\b",
                r"\b(appointed|hired) (a )?new (vp|ceo|cro|cmo|cto)\b",
            ],
        ),
        rule(
            SignalType::Hiring,
            SignalStrength::Medium,
            &[
                r"\bhiring\b",
                r"\bexpanding (the )?(sales|gtm|revenue) team\b",
                r"\bjob openings\b",
                r"\bheadcount growth\b",
            ],
        ),
        rule(
            SignalType::TechnologyInitiative,
            SignalStrength::Medium,
            &[
                r"\bdigital transformation\b",
                r"\bautomation initiative\b",
                r"\bmigrating (to|from)\b",
                r"\breplatforming\b",
                r"\bmoderniz(ation|ing)\b",
            ],
        ),
    ]
});

/// Finds the strongest trigger signal across the given texts.
///
/// Returns [`SignalFields::none`] when nothing matches.
pub fn detect_signal(texts: &[Option<&str>]) -> SignalFields {
    let corpus = texts
        .iter()
        .flatten()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if corpus.is_empty() {
        return SignalFields::none();
    }

    let mut best: Option<(&SignalRule, String)> = None;
    for rule in RULES.iter() {
        let Some(found) = rule.patterns.iter().find_map(|p| p.find(&corpus)) else {
            continue;
        };
        let stronger = best
            .as_ref()
            .map_or(true, |(current, _)| rule.strength > current.strength);
        if stronger {
            best = Some((rule, found.as_str().to_string()));
        }
    }

    match best {
        Some((rule, matched)) => {
            let excerpt: String = matched.chars().take(MAX_EXCERPT_CHARS).collect();
            SignalFields {
                signal_type: rule.signal_type,
                strength: rule.strength,
                reasoning: format!(
                    "Detected {} signal ({}): \"{}\"",
                    rule.signal_type, rule.strength, excerpt
                ),
            }
        }
        None => SignalFields::none(),
    }
}

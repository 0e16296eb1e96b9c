//! Normalization of raw model output into a canonical verdict.
//!
//! The pipeline is total: any input string, however mangled, comes out as
//! a well-formed [`ValidationResult`]. Parsing proceeds in three stages,
//! unparsed text to a balanced JSON block, block to a partial verdict with
//! every field optional, partial to canonical with scale and synonym
//! folding.

use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::models::{ValidationResult, ValidationStatus, PASSING_SCORE};
use crate::policy::SpecialtyPolicyProvider;

/// First balanced `{...}` object in `raw`, tolerating surrounding prose
/// and markdown fences. Brace tracking is string- and escape-aware; when
/// a balanced candidate fails to parse, later `{` positions are tried.
pub fn extract_json_block(raw: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(rel) = raw.get(search_from..)?.find('{') {
        let open = search_from + rel;
        if let Some(block) = balanced_block(raw.get(open..)?) {
            if serde_json::from_str::<serde_json::Value>(block).is_ok() {
                return Some(block.to_string());
            }
        }
        search_from = open + 1;
    }
    None
}

fn balanced_block(s: &str) -> Option<&str> {
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return s.get(..i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Loosely-shaped verdict as models actually emit it: every field
/// optional, common key variants accepted.
#[derive(Debug, Default, Deserialize)]
pub struct PartialVerdict {
    #[serde(default, alias = "validation_status", alias = "verdict", alias = "result")]
    pub status: Option<String>,
    #[serde(
        default,
        alias = "score",
        alias = "compliance",
        alias = "complianceScore",
        deserialize_with = "lenient_number"
    )]
    pub compliance_score: Option<f64>,
    #[serde(
        default,
        alias = "message",
        alias = "explanation",
        alias = "rationale",
        alias = "reason"
    )]
    pub feedback: Option<String>,
    #[serde(
        default,
        alias = "diagnosis_codes",
        alias = "icd10_codes",
        alias = "icd_codes"
    )]
    pub suggested_diagnosis_codes: Option<Vec<String>>,
    #[serde(default, alias = "procedure_codes", alias = "cpt_codes")]
    pub suggested_procedure_codes: Option<Vec<String>>,
}

/// Accepts numbers or numeric strings; anything else reads as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Maps a score on any of the scales models report onto canonical 0-9.
pub fn normalize_score(raw: f64) -> u8 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    let scaled = if raw <= 1.0 {
        raw * 9.0
    } else if raw <= 9.0 {
        raw
    } else if raw <= 10.0 {
        raw / 10.0 * 9.0
    } else if raw <= 100.0 {
        raw / 100.0 * 9.0
    } else {
        9.0
    };
    (scaled.round() as u8).min(9)
}

fn parse_status(raw: &str) -> Option<ValidationStatus> {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    match folded.as_str() {
        "valid" | "compliant" | "pass" | "passed" | "approved" | "acceptable" | "ok" => {
            Some(ValidationStatus::Valid)
        }
        "needs_clarification" | "clarification" | "clarify" | "incomplete" | "insufficient"
        | "review" | "needs_review" | "pending" => Some(ValidationStatus::NeedsClarification),
        "invalid" | "non_compliant" | "noncompliant" | "fail" | "failed" | "rejected"
        | "denied" | "not_valid" => Some(ValidationStatus::Invalid),
        _ => None,
    }
}

fn default_feedback(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Valid => {
            "The dictation satisfies the appropriateness criteria for the requested study."
        }
        ValidationStatus::NeedsClarification => {
            "Additional clinical detail is required before this order can be approved."
        }
        ValidationStatus::Invalid => {
            "The dictation does not support the requested study as written."
        }
    }
}

const MALFORMED_FEEDBACK: &str =
    "The reviewer response could not be interpreted; please resubmit the dictation.";

pub struct ResponseNormalizer;

impl ResponseNormalizer {
    /// Total conversion of raw model text into a verdict. Unparsable
    /// output and unrecognized statuses collapse to the distinguished
    /// invalid result; a claimed-valid verdict scoring below the passing
    /// threshold is demoted to needs-clarification.
    pub fn normalize(
        raw: &str,
        specialty: &str,
        policy: &SpecialtyPolicyProvider,
        provider: &str,
    ) -> ValidationResult {
        let partial = extract_json_block(raw)
            .and_then(|block| serde_json::from_str::<PartialVerdict>(&block).ok());

        let Some(partial) = partial else {
            warn!(specialty = %specialty, "Model output had no parsable verdict block");
            return Self::malformed(specialty, policy, provider);
        };

        let Some(status) = partial.status.as_deref().and_then(parse_status) else {
            warn!(
                specialty = %specialty,
                claimed = partial.status.as_deref().unwrap_or("<missing>"),
                "Model verdict status missing or unrecognized"
            );
            return Self::malformed(specialty, policy, provider);
        };

        let compliance_score = partial.compliance_score.map(normalize_score).unwrap_or(0);
        debug!(
            specialty = %specialty,
            raw_score = ?partial.compliance_score,
            compliance_score,
            "Normalized model verdict"
        );

        let status = if status == ValidationStatus::Valid && compliance_score < PASSING_SCORE {
            warn!(
                specialty = %specialty,
                compliance_score,
                "Demoting claimed-valid verdict below passing score"
            );
            ValidationStatus::NeedsClarification
        } else {
            status
        };

        let feedback = partial
            .feedback
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| default_feedback(status).to_string());

        ValidationResult {
            status,
            feedback: policy.enforce_word_budget(&feedback, specialty),
            compliance_score,
            suggested_diagnosis_codes: clean_codes(
                partial.suggested_diagnosis_codes.unwrap_or_default(),
            ),
            suggested_procedure_codes: clean_codes(
                partial.suggested_procedure_codes.unwrap_or_default(),
            ),
            overridden: false,
            provider: provider.to_string(),
            checked_at: Utc::now(),
        }
    }

    fn malformed(
        specialty: &str,
        policy: &SpecialtyPolicyProvider,
        provider: &str,
    ) -> ValidationResult {
        ValidationResult {
            status: ValidationStatus::Invalid,
            feedback: policy.enforce_word_budget(MALFORMED_FEEDBACK, specialty),
            compliance_score: 0,
            suggested_diagnosis_codes: Vec::new(),
            suggested_procedure_codes: Vec::new(),
            overridden: false,
            provider: provider.to_string(),
            checked_at: Utc::now(),
        }
    }
}

fn clean_codes(codes: Vec<String>) -> Vec<String> {
    codes
        .into_iter()
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .unique()
        .collect()
}

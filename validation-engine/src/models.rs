use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum compliance score for a verdict to stand as `Valid`.
pub const PASSING_SCORE: u8 = 7;

/// Patient demographics supplied by the order workflow. Both fields are
/// optional; dictations are validated either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: Option<u8>,
    pub gender: Option<Gender>,
}

impl PatientContext {
    /// One-line rendering for the prompt, e.g. "62-year-old female patient".
    pub fn describe(&self) -> String {
        match (self.age, self.gender) {
            (Some(age), Some(gender)) => format!("{}-year-old {} patient", age, gender.as_str()),
            (Some(age), None) => format!("{}-year-old patient", age),
            (None, Some(gender)) => format!("{} patient, age not provided", gender.as_str()),
            (None, None) => "demographics not provided".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

/// A dictation submitted for validation, together with the order's
/// attempt history (owned and persisted by the caller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictationRequest {
    pub order_id: Uuid,
    pub raw_text: String,
    pub patient: PatientContext,
    pub specialty: String,
    pub prior_attempts: Vec<AttemptRecord>,
}

impl DictationRequest {
    pub fn new(order_id: Uuid, raw_text: impl Into<String>, specialty: impl Into<String>) -> Self {
        Self {
            order_id,
            raw_text: raw_text.into(),
            patient: PatientContext::default(),
            specialty: specialty.into(),
            prior_attempts: Vec::new(),
        }
    }
}

/// Explicit caller action to proceed with an order despite repeated
/// non-passing verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub order_id: Uuid,
    pub justification: String,
    pub specialty: String,
    pub prior_attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    NeedsClarification,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::NeedsClarification => "needs_clarification",
            ValidationStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict returned to the order workflow for every dictation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// Reviewer feedback, hard-truncated to the specialty word budget.
    pub feedback: String,
    /// Canonical 0-9 compliance score.
    pub compliance_score: u8,
    pub suggested_diagnosis_codes: Vec<String>,
    pub suggested_procedure_codes: Vec<String>,
    pub overridden: bool,
    /// Which generation provider produced the verdict.
    pub provider: String,
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Immutable record of one validation attempt. Appended per attempt;
/// numbers start at 1 and never reset within an order's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub attempt_number: u32,
    pub dictation_snapshot: String,
    pub result: ValidationResult,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(
        attempt_number: u32,
        dictation_snapshot: impl Into<String>,
        result: ValidationResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt_number,
            dictation_snapshot: dictation_snapshot.into(),
            result,
            recorded_at: Utc::now(),
        }
    }
}

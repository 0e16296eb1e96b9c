use serde::{Deserialize, Serialize};

/// ICD-10-CM diagnosis code entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisCode {
    /// Normalized uppercase, e.g. "M25.511"
    pub code: String,
    pub description: String,
    pub category: String,
    pub billable: bool,
}

/// CPT procedure code entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureCode {
    /// Five-digit CPT, e.g. "73221"
    pub code: String,
    pub description: String,
    pub modality: String,
    pub body_part: String,
    pub requires_contrast: bool,
}

/// A single entry from either code domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeEntry {
    Diagnosis(DiagnosisCode),
    Procedure(ProcedureCode),
}

impl KnowledgeEntry {
    pub fn code(&self) -> &str {
        match self {
            KnowledgeEntry::Diagnosis(dx) => &dx.code,
            KnowledgeEntry::Procedure(px) => &px.code,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            KnowledgeEntry::Diagnosis(dx) => &dx.description,
            KnowledgeEntry::Procedure(px) => &px.description,
        }
    }
}

/// Guideline rating band for a diagnosis/procedure pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppropriatenessLevel {
    UsuallyAppropriate,
    MayBeAppropriate,
    RarelyAppropriate,
}

impl AppropriatenessLevel {
    /// Band for an ordinal 1-9 rating (ACR convention: 7-9 / 4-6 / 1-3).
    pub fn from_rating(rating: i16) -> Self {
        match rating {
            r if r >= 7 => AppropriatenessLevel::UsuallyAppropriate,
            r if r >= 4 => AppropriatenessLevel::MayBeAppropriate,
            _ => AppropriatenessLevel::RarelyAppropriate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppropriatenessLevel::UsuallyAppropriate => "usually appropriate",
            AppropriatenessLevel::MayBeAppropriate => "may be appropriate",
            AppropriatenessLevel::RarelyAppropriate => "rarely appropriate",
        }
    }
}

/// Strength of the evidence behind a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLevel {
    High,
    Moderate,
    Limited,
    ExpertOpinion,
}

impl EvidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceLevel::High => "high",
            EvidenceLevel::Moderate => "moderate",
            EvidenceLevel::Limited => "limited",
            EvidenceLevel::ExpertOpinion => "expert_opinion",
        }
    }

    /// Tolerant parse for values coming back from the durable store.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "a" => EvidenceLevel::High,
            "moderate" | "b" => EvidenceLevel::Moderate,
            "limited" | "c" => EvidenceLevel::Limited,
            _ => EvidenceLevel::ExpertOpinion,
        }
    }
}

/// Appropriateness mapping between a diagnosis and a procedure code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub diagnosis_code: String,
    pub procedure_code: String,
    /// Ordinal 1-9; higher means more appropriate
    pub appropriateness_rating: i16,
    pub evidence_level: EvidenceLevel,
    pub justification: String,
}

impl CodeMapping {
    pub fn level(&self) -> AppropriatenessLevel {
        AppropriatenessLevel::from_rating(self.appropriateness_rating)
    }
}

/// Explanatory guideline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineDocument {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appropriateness_bands_follow_acr_cutoffs() {
        assert_eq!(
            AppropriatenessLevel::from_rating(9),
            AppropriatenessLevel::UsuallyAppropriate
        );
        assert_eq!(
            AppropriatenessLevel::from_rating(7),
            AppropriatenessLevel::UsuallyAppropriate
        );
        assert_eq!(
            AppropriatenessLevel::from_rating(6),
            AppropriatenessLevel::MayBeAppropriate
        );
        assert_eq!(
            AppropriatenessLevel::from_rating(4),
            AppropriatenessLevel::MayBeAppropriate
        );
        assert_eq!(
            AppropriatenessLevel::from_rating(3),
            AppropriatenessLevel::RarelyAppropriate
        );
        assert_eq!(
            AppropriatenessLevel::from_rating(1),
            AppropriatenessLevel::RarelyAppropriate
        );
    }

    #[test]
    fn test_evidence_level_parse_accepts_letter_grades() {
        assert_eq!(EvidenceLevel::parse("A"), EvidenceLevel::High);
        assert_eq!(EvidenceLevel::parse("moderate"), EvidenceLevel::Moderate);
        assert_eq!(EvidenceLevel::parse(" c "), EvidenceLevel::Limited);
        assert_eq!(EvidenceLevel::parse("anecdotal"), EvidenceLevel::ExpertOpinion);
    }
}

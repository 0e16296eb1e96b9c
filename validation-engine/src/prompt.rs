//! Prompt composition for the generative reviewer.

use knowledge_cache::{CodeMapping, DiagnosisCode, GuidelineDocument, ProcedureCode};

use crate::models::PatientContext;

pub const MAX_EXCERPT_DIAGNOSES: usize = 6;
pub const MAX_EXCERPT_PROCEDURES: usize = 6;
pub const MAX_EXCERPT_MAPPINGS: usize = 8;
pub const MAX_EXCERPT_DOCUMENTS: usize = 2;
/// Upper bound on the serialized excerpt, in characters.
pub const MAX_EXCERPT_CHARS: usize = 2000;

/// Fence marking the verbatim dictation inside the composed prompt.
pub(crate) const DICTATION_FENCE: &str = "\"\"\"";

/// Knowledge retrieved for the extracted keywords, size-capped so the
/// prompt stays within a predictable budget.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeExcerpt {
    diagnoses: Vec<DiagnosisCode>,
    procedures: Vec<ProcedureCode>,
    mappings: Vec<CodeMapping>,
    documents: Vec<GuidelineDocument>,
}

impl KnowledgeExcerpt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds unless the cap is reached or the code is already present.
    pub fn add_diagnosis(&mut self, dx: DiagnosisCode) {
        if self.diagnoses.len() < MAX_EXCERPT_DIAGNOSES
            && !self.diagnoses.iter().any(|d| d.code == dx.code)
        {
            self.diagnoses.push(dx);
        }
    }

    pub fn add_procedure(&mut self, px: ProcedureCode) {
        if self.procedures.len() < MAX_EXCERPT_PROCEDURES
            && !self.procedures.iter().any(|p| p.code == px.code)
        {
            self.procedures.push(px);
        }
    }

    pub fn add_mapping(&mut self, mapping: CodeMapping) {
        if self.mappings.len() < MAX_EXCERPT_MAPPINGS
            && !self.mappings.iter().any(|m| {
                m.diagnosis_code == mapping.diagnosis_code
                    && m.procedure_code == mapping.procedure_code
            })
        {
            self.mappings.push(mapping);
        }
    }

    pub fn add_document(&mut self, doc: GuidelineDocument) {
        if self.documents.len() < MAX_EXCERPT_DOCUMENTS
            && !self.documents.iter().any(|d| d.slug == doc.slug)
        {
            self.documents.push(doc);
        }
    }

    pub fn diagnoses(&self) -> &[DiagnosisCode] {
        &self.diagnoses
    }

    pub fn procedures(&self) -> &[ProcedureCode] {
        &self.procedures
    }

    pub fn mappings(&self) -> &[CodeMapping] {
        &self.mappings
    }

    pub fn documents(&self) -> &[GuidelineDocument] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.diagnoses.is_empty()
            && self.procedures.is_empty()
            && self.mappings.is_empty()
            && self.documents.is_empty()
    }

    /// Plain-text serialization for the prompt, truncated to
    /// [`MAX_EXCERPT_CHARS`].
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No knowledge-base entries matched this dictation.".to_string();
        }

        let mut out = String::new();
        if !self.diagnoses.is_empty() {
            out.push_str("Candidate diagnoses:\n");
            for dx in &self.diagnoses {
                let billable = if dx.billable { "billable" } else { "non-billable" };
                out.push_str(&format!(
                    "- {}: {} ({}, {})\n",
                    dx.code, dx.description, dx.category, billable
                ));
            }
        }
        if !self.procedures.is_empty() {
            out.push_str("Candidate procedures:\n");
            for px in &self.procedures {
                out.push_str(&format!(
                    "- {}: {} ({} of {})\n",
                    px.code, px.description, px.modality, px.body_part
                ));
            }
        }
        if !self.mappings.is_empty() {
            out.push_str("Appropriateness guidance:\n");
            for m in &self.mappings {
                out.push_str(&format!(
                    "- {} with {}: rated {}/9, {} (evidence {}): {}\n",
                    m.diagnosis_code,
                    m.procedure_code,
                    m.appropriateness_rating,
                    m.level().as_str(),
                    m.evidence_level.as_str(),
                    m.justification
                ));
            }
        }
        if !self.documents.is_empty() {
            out.push_str("Guidelines:\n");
            for doc in &self.documents {
                out.push_str(&format!("- {} [{}]: {}\n", doc.title, doc.source, doc.body));
            }
        }

        if out.chars().count() > MAX_EXCERPT_CHARS {
            out = out.chars().take(MAX_EXCERPT_CHARS).collect();
        }
        out
    }
}

/// Composes the single reviewer prompt. Pure; all inputs resolved by the
/// orchestrator beforehand.
pub struct PromptComposer;

impl PromptComposer {
    pub fn compose(
        dictation: &str,
        patient: &PatientContext,
        specialty: &str,
        checklist: &[String],
        excerpt: &KnowledgeExcerpt,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are a clinical order reviewer for an imaging order-intake platform. \
             Judge whether the dictation below justifies the requested study.\n\n",
        );
        prompt.push_str(&format!("Patient: {}\n", patient.describe()));
        prompt.push_str(&format!("Referring specialty: {}\n\n", specialty));

        prompt.push_str("Review checklist:\n");
        for (idx, check) in checklist.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", idx + 1, check));
        }

        prompt.push_str(&format!(
            "\nDictation:\n{fence}\n{dictation}\n{fence}\n",
            fence = DICTATION_FENCE,
            dictation = dictation
        ));

        prompt.push_str(&format!("\nKnowledge excerpt:\n{}\n", excerpt.render()));

        prompt.push_str(
            "\nRespond with exactly one JSON object and nothing else:\n\
             {\n\
             \x20 \"status\": \"valid\" | \"needs_clarification\" | \"invalid\",\n\
             \x20 \"compliance_score\": <integer 0-9>,\n\
             \x20 \"feedback\": \"<concise reviewer feedback>\",\n\
             \x20 \"suggested_diagnosis_codes\": [\"<ICD-10-CM code>\"],\n\
             \x20 \"suggested_procedure_codes\": [\"<CPT code>\"]\n\
             }\n\
             A compliance_score of 7 or higher justifies \"valid\". \
             Do not wrap the object in markdown fences or commentary.\n",
        );

        prompt
    }
}

#[cfg(test)]
mod tests {
    use knowledge_cache::EvidenceLevel;

    use super::*;
    use crate::models::Gender;

    fn sample_excerpt() -> KnowledgeExcerpt {
        let mut excerpt = KnowledgeExcerpt::new();
        excerpt.add_diagnosis(DiagnosisCode {
            code: "R07.9".to_string(),
            description: "Chest pain, unspecified".to_string(),
            category: "symptoms".to_string(),
            billable: true,
        });
        excerpt.add_mapping(CodeMapping {
            diagnosis_code: "R07.9".to_string(),
            procedure_code: "71046".to_string(),
            appropriateness_rating: 8,
            evidence_level: EvidenceLevel::High,
            justification: "First-line study for undifferentiated chest pain".to_string(),
        });
        excerpt
    }

    #[test]
    fn test_prompt_carries_context_checklist_and_dictation() {
        let patient = PatientContext {
            age: Some(48),
            gender: Some(Gender::Male),
        };
        let checklist = vec![
            "Indication stated".to_string(),
            "Necessity supported".to_string(),
        ];
        let prompt = PromptComposer::compose(
            "Follow-up chest X-ray, no new symptoms",
            &patient,
            "Family Medicine",
            &checklist,
            &sample_excerpt(),
        );

        assert!(prompt.contains("48-year-old male patient"));
        assert!(prompt.contains("Referring specialty: Family Medicine"));
        assert!(prompt.contains("1. Indication stated"));
        assert!(prompt.contains("2. Necessity supported"));
        assert!(prompt.contains("Follow-up chest X-ray, no new symptoms"));
        assert!(prompt.contains("R07.9"));
        assert!(prompt.contains("\"compliance_score\""));
    }

    #[test]
    fn test_excerpt_caps_entries_and_dedups_codes() {
        let mut excerpt = KnowledgeExcerpt::new();
        for i in 0..10 {
            excerpt.add_diagnosis(DiagnosisCode {
                code: format!("R{:02}.0", i),
                description: "dup test".to_string(),
                category: "symptoms".to_string(),
                billable: true,
            });
        }
        assert_eq!(excerpt.diagnoses().len(), MAX_EXCERPT_DIAGNOSES);

        let before = excerpt.diagnoses().len();
        excerpt.add_diagnosis(DiagnosisCode {
            code: "R00.0".to_string(),
            description: "already present".to_string(),
            category: "symptoms".to_string(),
            billable: true,
        });
        assert_eq!(excerpt.diagnoses().len(), before);
    }

    #[test]
    fn test_rendered_excerpt_respects_char_cap() {
        let mut excerpt = KnowledgeExcerpt::new();
        for i in 0..MAX_EXCERPT_MAPPINGS {
            excerpt.add_mapping(CodeMapping {
                diagnosis_code: format!("C{:02}.9", i),
                procedure_code: "74176".to_string(),
                appropriateness_rating: 5,
                evidence_level: EvidenceLevel::Moderate,
                justification: "x".repeat(600),
            });
        }
        assert!(excerpt.render().chars().count() <= MAX_EXCERPT_CHARS);
    }

    #[test]
    fn test_empty_excerpt_renders_placeholder() {
        let excerpt = KnowledgeExcerpt::new();
        assert!(excerpt.is_empty());
        assert!(excerpt.render().contains("No knowledge-base entries"));
    }
}

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::KnowledgeResult;
use crate::models::{CodeMapping, DiagnosisCode, EvidenceLevel, GuidelineDocument, ProcedureCode};
use crate::store::{
    normalize_diagnosis_code, normalize_keyword, normalize_procedure_code, KnowledgeStore,
    SEARCH_RESULT_LIMIT,
};

/// In-process knowledge store.
///
/// Serves as the durable tier when no database connection is configured, so
/// the whole engine runs self-contained, the knowledge analogue of the
/// offline generation provider. Tests build on it directly.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    diagnoses: HashMap<String, DiagnosisCode>,
    procedures: HashMap<String, ProcedureCode>,
    mappings: Vec<CodeMapping>,
    documents: HashMap<String, GuidelineDocument>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a compact imaging-appropriateness data set:
    /// common ICD-10-CM indications, CPT imaging studies, and ACR-style
    /// mappings between them.
    pub fn with_seed_data() -> Self {
        let mut store = Self::new();

        for (code, description, category) in [
            ("R07.9", "Chest pain, unspecified", "Symptoms and signs"),
            (
                "Z09",
                "Encounter for follow-up examination after completed treatment",
                "Factors influencing health status",
            ),
            ("M25.511", "Pain in right shoulder", "Musculoskeletal"),
            ("M54.50", "Low back pain, unspecified", "Musculoskeletal"),
            (
                "M75.101",
                "Unspecified rotator cuff tear or rupture of right shoulder",
                "Musculoskeletal",
            ),
            ("R51.9", "Headache, unspecified", "Symptoms and signs"),
            (
                "G43.909",
                "Migraine, unspecified, not intractable",
                "Nervous system",
            ),
            (
                "S42.001A",
                "Fracture of unspecified part of right clavicle, initial encounter",
                "Injury",
            ),
            ("J18.9", "Pneumonia, unspecified organism", "Respiratory"),
            ("R10.9", "Unspecified abdominal pain", "Symptoms and signs"),
            ("R06.02", "Shortness of breath", "Symptoms and signs"),
            (
                "Z12.31",
                "Encounter for screening mammogram for malignant neoplasm of breast",
                "Factors influencing health status",
            ),
        ] {
            store.insert_diagnosis(DiagnosisCode {
                code: code.to_string(),
                description: description.to_string(),
                category: category.to_string(),
                billable: true,
            });
        }

        for (code, description, modality, body_part) in [
            ("71046", "Radiologic examination, chest; 2 views", "X-ray", "Chest"),
            (
                "73000",
                "Radiologic examination; clavicle, complete",
                "X-ray",
                "Shoulder girdle",
            ),
            (
                "71250",
                "Computed tomography, thorax, diagnostic; without contrast material",
                "CT",
                "Chest",
            ),
            (
                "70450",
                "Computed tomography, head or brain; without contrast material",
                "CT",
                "Head",
            ),
            (
                "74176",
                "Computed tomography, abdomen and pelvis; without contrast material",
                "CT",
                "Abdomen and pelvis",
            ),
            (
                "73221",
                "Magnetic resonance imaging, any joint of upper extremity; without contrast material",
                "MRI",
                "Upper extremity joint",
            ),
            (
                "72148",
                "Magnetic resonance imaging, spinal canal and contents, lumbar; without contrast material",
                "MRI",
                "Lumbar spine",
            ),
            (
                "70551",
                "Magnetic resonance imaging, brain; without contrast material",
                "MRI",
                "Head",
            ),
            (
                "76700",
                "Ultrasound, abdominal, real time with image documentation; complete",
                "Ultrasound",
                "Abdomen",
            ),
            (
                "77067",
                "Screening mammography, bilateral (2-view study of each breast)",
                "Mammography",
                "Breast",
            ),
        ] {
            store.insert_procedure(ProcedureCode {
                code: code.to_string(),
                description: description.to_string(),
                modality: modality.to_string(),
                body_part: body_part.to_string(),
                requires_contrast: false,
            });
        }

        for (dx, px, rating, evidence, justification) in [
            (
                "R07.9",
                "71046",
                8,
                EvidenceLevel::High,
                "Chest radiograph is the usual first-line study for undifferentiated chest pain.",
            ),
            (
                "R07.9",
                "71250",
                5,
                EvidenceLevel::Moderate,
                "CT thorax may be appropriate when radiographic findings are equivocal.",
            ),
            (
                "Z09",
                "71046",
                7,
                EvidenceLevel::Moderate,
                "Follow-up chest radiograph is usually appropriate after treated thoracic disease.",
            ),
            (
                "M25.511",
                "73221",
                8,
                EvidenceLevel::High,
                "MRI without contrast is usually appropriate for persistent shoulder pain with suspected soft-tissue injury.",
            ),
            (
                "M75.101",
                "73221",
                9,
                EvidenceLevel::High,
                "MRI is the study of choice for characterizing rotator cuff tears.",
            ),
            (
                "M54.50",
                "72148",
                4,
                EvidenceLevel::Moderate,
                "MRI lumbar spine may be appropriate for low back pain persisting beyond six weeks of conservative therapy.",
            ),
            (
                "R51.9",
                "70450",
                3,
                EvidenceLevel::Limited,
                "CT head is rarely appropriate for uncomplicated headache without red-flag features.",
            ),
            (
                "R51.9",
                "70551",
                4,
                EvidenceLevel::Moderate,
                "MRI brain may be appropriate for new headache with atypical features.",
            ),
            (
                "G43.909",
                "70551",
                3,
                EvidenceLevel::Limited,
                "Neuroimaging is rarely appropriate for typical migraine with a normal neurologic examination.",
            ),
            (
                "S42.001A",
                "73000",
                9,
                EvidenceLevel::High,
                "Radiographs are the definitive initial study for suspected clavicle fracture.",
            ),
            (
                "J18.9",
                "71046",
                9,
                EvidenceLevel::High,
                "Chest radiography confirms pneumonia and documents resolution.",
            ),
            (
                "R10.9",
                "74176",
                6,
                EvidenceLevel::Moderate,
                "CT abdomen and pelvis may be appropriate for undifferentiated abdominal pain in adults.",
            ),
            (
                "R10.9",
                "76700",
                5,
                EvidenceLevel::Moderate,
                "Ultrasound is a reasonable first study for biliary-pattern abdominal pain.",
            ),
            (
                "R06.02",
                "71046",
                8,
                EvidenceLevel::High,
                "Chest radiograph is usually appropriate for new shortness of breath.",
            ),
            (
                "Z12.31",
                "77067",
                9,
                EvidenceLevel::High,
                "Screening mammography is the standard breast cancer screening examination.",
            ),
        ] {
            store.insert_mapping(CodeMapping {
                diagnosis_code: dx.to_string(),
                procedure_code: px.to_string(),
                appropriateness_rating: rating,
                evidence_level: evidence,
                justification: justification.to_string(),
            });
        }

        for (slug, title, body, source) in [
            (
                "chest-pain-imaging",
                "Imaging of nonspecific chest pain",
                "Begin with a two-view chest radiograph. Reserve CT for equivocal \
                 radiographic findings, suspected aortic pathology, or high-risk \
                 presentations.",
                "appropriateness guidelines",
            ),
            (
                "low-back-pain-imaging",
                "Imaging for uncomplicated low back pain",
                "Imaging is not indicated within the first six weeks in the absence \
                 of red flags such as trauma, fever, or neurologic deficit.",
                "appropriateness guidelines",
            ),
            (
                "headache-neuroimaging",
                "Neuroimaging for primary headache",
                "Neuroimaging is not routinely indicated for primary headache with a \
                 normal neurologic examination; MRI is preferred over CT when imaging \
                 is warranted.",
                "appropriateness guidelines",
            ),
            (
                "follow-up-imaging",
                "Interval imaging after treated disease",
                "Follow-up radiographs after treated pneumonia are usually obtained \
                 at six to eight weeks to confirm resolution.",
                "appropriateness guidelines",
            ),
        ] {
            store.insert_document(GuidelineDocument {
                slug: slug.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                source: source.to_string(),
            });
        }

        store
    }

    pub fn insert_diagnosis(&mut self, diagnosis: DiagnosisCode) {
        let mut diagnosis = diagnosis;
        diagnosis.code = normalize_diagnosis_code(&diagnosis.code);
        self.diagnoses.insert(diagnosis.code.clone(), diagnosis);
    }

    pub fn insert_procedure(&mut self, procedure: ProcedureCode) {
        let mut procedure = procedure;
        procedure.code = normalize_procedure_code(&procedure.code);
        self.procedures.insert(procedure.code.clone(), procedure);
    }

    pub fn insert_mapping(&mut self, mapping: CodeMapping) {
        let mut mapping = mapping;
        mapping.diagnosis_code = normalize_diagnosis_code(&mapping.diagnosis_code);
        mapping.procedure_code = normalize_procedure_code(&mapping.procedure_code);
        self.mappings.push(mapping);
    }

    pub fn insert_document(&mut self, document: GuidelineDocument) {
        self.documents.insert(document.slug.clone(), document);
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn get_diagnosis(&self, code: &str) -> KnowledgeResult<Option<DiagnosisCode>> {
        Ok(self.diagnoses.get(&normalize_diagnosis_code(code)).cloned())
    }

    async fn get_procedure(&self, code: &str) -> KnowledgeResult<Option<ProcedureCode>> {
        Ok(self.procedures.get(&normalize_procedure_code(code)).cloned())
    }

    async fn diagnoses_by_category(&self, category: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let wanted = normalize_keyword(category);
        let mut matches: Vec<DiagnosisCode> = self
            .diagnoses
            .values()
            .filter(|dx| dx.category.to_lowercase() == wanted)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(matches)
    }

    async fn procedures_by_modality(&self, modality: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let wanted = normalize_keyword(modality);
        let mut matches: Vec<ProcedureCode> = self
            .procedures
            .values()
            .filter(|px| px.modality.to_lowercase() == wanted)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(matches)
    }

    async fn get_mapping(
        &self,
        diagnosis_code: &str,
        procedure_code: &str,
    ) -> KnowledgeResult<Option<CodeMapping>> {
        let dx = normalize_diagnosis_code(diagnosis_code);
        let px = normalize_procedure_code(procedure_code);
        Ok(self
            .mappings
            .iter()
            .find(|m| m.diagnosis_code == dx && m.procedure_code == px)
            .cloned())
    }

    async fn mappings_for_diagnosis(
        &self,
        diagnosis_code: &str,
    ) -> KnowledgeResult<Vec<CodeMapping>> {
        let dx = normalize_diagnosis_code(diagnosis_code);
        let mut matches: Vec<CodeMapping> = self
            .mappings
            .iter()
            .filter(|m| m.diagnosis_code == dx)
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.appropriateness_rating
                .cmp(&a.appropriateness_rating)
                .then_with(|| a.procedure_code.cmp(&b.procedure_code))
        });
        Ok(matches)
    }

    async fn search_diagnoses(&self, keyword: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<DiagnosisCode> = self
            .diagnoses
            .values()
            .filter(|dx| dx.description.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.code.cmp(&b.code));
        matches.truncate(SEARCH_RESULT_LIMIT);
        Ok(matches)
    }

    async fn search_procedures(&self, keyword: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<ProcedureCode> = self
            .procedures
            .values()
            .filter(|px| {
                px.description.to_lowercase().contains(&needle)
                    || px.modality.to_lowercase().contains(&needle)
                    || px.body_part.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.code.cmp(&b.code));
        matches.truncate(SEARCH_RESULT_LIMIT);
        Ok(matches)
    }

    async fn get_document(&self, slug: &str) -> KnowledgeResult<Option<GuidelineDocument>> {
        Ok(self.documents.get(slug.trim()).cloned())
    }

    async fn search_documents(&self, keyword: &str) -> KnowledgeResult<Vec<GuidelineDocument>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<GuidelineDocument> = self
            .documents
            .values()
            .filter(|doc| {
                doc.title.to_lowercase().contains(&needle)
                    || doc.body.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.slug.cmp(&b.slug));
        matches.truncate(SEARCH_RESULT_LIMIT);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_store_answers_code_lookups_case_insensitively() {
        let store = InMemoryKnowledgeStore::with_seed_data();
        let dx = store.get_diagnosis("m25.511").await;
        assert_eq!(
            dx.ok().flatten().map(|d| d.description),
            Some("Pain in right shoulder".to_string())
        );
    }

    #[tokio::test]
    async fn test_mappings_come_back_ordered_by_appropriateness() {
        let store = InMemoryKnowledgeStore::with_seed_data();
        let mappings = store
            .mappings_for_diagnosis("R51.9")
            .await
            .unwrap_or_default();
        assert_eq!(mappings.len(), 2);
        assert!(mappings[0].appropriateness_rating >= mappings[1].appropriateness_rating);
        assert_eq!(mappings[0].procedure_code, "70551");
    }

    #[tokio::test]
    async fn test_search_matches_substrings_of_descriptions() {
        let store = InMemoryKnowledgeStore::with_seed_data();
        let hits = store.search_diagnoses("shoulder").await.unwrap_or_default();
        assert!(hits.iter().any(|dx| dx.code == "M25.511"));
        assert!(hits.iter().any(|dx| dx.code == "M75.101"));

        let none = store.search_diagnoses("").await.unwrap_or_default();
        assert!(none.is_empty());
    }
}

use async_trait::async_trait;

use crate::error::KnowledgeResult;
use crate::models::{CodeMapping, DiagnosisCode, GuidelineDocument, ProcedureCode};

/// Hard cap on keyword search results, across every implementation.
pub const SEARCH_RESULT_LIMIT: usize = 100;

/// Read-only query interface over the medical-code knowledge base.
///
/// Implemented by the durable tier (`PostgresKnowledgeStore`), the seeded
/// in-process store (`InMemoryKnowledgeStore`), and the caching decorator
/// (`CachedKnowledgeStore`), so fallback and repopulation are written once
/// against this trait rather than per backend.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Look up one diagnosis code (case-insensitive).
    async fn get_diagnosis(&self, code: &str) -> KnowledgeResult<Option<DiagnosisCode>>;

    /// Look up one procedure code.
    async fn get_procedure(&self, code: &str) -> KnowledgeResult<Option<ProcedureCode>>;

    /// All diagnosis codes in a clinical category.
    async fn diagnoses_by_category(&self, category: &str) -> KnowledgeResult<Vec<DiagnosisCode>>;

    /// All procedure codes for an imaging modality.
    async fn procedures_by_modality(&self, modality: &str) -> KnowledgeResult<Vec<ProcedureCode>>;

    /// Appropriateness mapping for one diagnosis/procedure pair.
    async fn get_mapping(
        &self,
        diagnosis_code: &str,
        procedure_code: &str,
    ) -> KnowledgeResult<Option<CodeMapping>>;

    /// Every mapping for a diagnosis, ordered by appropriateness descending.
    async fn mappings_for_diagnosis(
        &self,
        diagnosis_code: &str,
    ) -> KnowledgeResult<Vec<CodeMapping>>;

    /// Substring search on diagnosis descriptions, capped at
    /// [`SEARCH_RESULT_LIMIT`].
    async fn search_diagnoses(&self, keyword: &str) -> KnowledgeResult<Vec<DiagnosisCode>>;

    /// Substring search on procedure descriptions, capped at
    /// [`SEARCH_RESULT_LIMIT`].
    async fn search_procedures(&self, keyword: &str) -> KnowledgeResult<Vec<ProcedureCode>>;

    /// Look up one explanatory guideline document.
    async fn get_document(&self, slug: &str) -> KnowledgeResult<Option<GuidelineDocument>>;

    /// Substring search on document titles and bodies, capped at
    /// [`SEARCH_RESULT_LIMIT`].
    async fn search_documents(&self, keyword: &str) -> KnowledgeResult<Vec<GuidelineDocument>>;

    /// Liveness probe; in-process stores are healthy by definition.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Key normalization shared by every tier: diagnosis codes are
/// case-insensitive (stored uppercase), procedure codes pass through
/// trimmed, and keywords fold to lowercase.
pub fn normalize_diagnosis_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn normalize_procedure_code(code: &str) -> String {
    code.trim().to_string()
}

pub fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

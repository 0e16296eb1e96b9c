// Durable knowledge tier over PostgreSQL
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::models::{CodeMapping, DiagnosisCode, EvidenceLevel, GuidelineDocument, ProcedureCode};
use crate::store::{
    normalize_diagnosis_code, normalize_keyword, normalize_procedure_code, KnowledgeStore,
    SEARCH_RESULT_LIMIT,
};

/// Read-only durable tier backed by the knowledge-base schema
/// (`diagnosis_codes`, `procedure_codes`, `code_mappings`,
/// `guideline_documents`).
pub struct PostgresKnowledgeStore {
    pool: PgPool,
}

impl PostgresKnowledgeStore {
    /// Connect with pool sizing suited to a read-mostly workload.
    pub async fn connect(database_url: &str) -> KnowledgeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| KnowledgeError::ConnectionFailed(e.to_string()))?;

        info!("Knowledge store connection pool created");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct DiagnosisRow {
    code: String,
    description: String,
    category: String,
    billable: bool,
}

impl From<DiagnosisRow> for DiagnosisCode {
    fn from(row: DiagnosisRow) -> Self {
        DiagnosisCode {
            code: row.code,
            description: row.description,
            category: row.category,
            billable: row.billable,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProcedureRow {
    code: String,
    description: String,
    modality: String,
    body_part: String,
    requires_contrast: bool,
}

impl From<ProcedureRow> for ProcedureCode {
    fn from(row: ProcedureRow) -> Self {
        ProcedureCode {
            code: row.code,
            description: row.description,
            modality: row.modality,
            body_part: row.body_part,
            requires_contrast: row.requires_contrast,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MappingRow {
    diagnosis_code: String,
    procedure_code: String,
    appropriateness_rating: i16,
    evidence_level: String,
    justification: String,
}

impl From<MappingRow> for CodeMapping {
    fn from(row: MappingRow) -> Self {
        CodeMapping {
            diagnosis_code: row.diagnosis_code,
            procedure_code: row.procedure_code,
            appropriateness_rating: row.appropriateness_rating,
            evidence_level: EvidenceLevel::parse(&row.evidence_level),
            justification: row.justification,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    slug: String,
    title: String,
    body: String,
    source: String,
}

impl From<DocumentRow> for GuidelineDocument {
    fn from(row: DocumentRow) -> Self {
        GuidelineDocument {
            slug: row.slug,
            title: row.title,
            body: row.body,
            source: row.source,
        }
    }
}

#[async_trait]
impl KnowledgeStore for PostgresKnowledgeStore {
    async fn get_diagnosis(&self, code: &str) -> KnowledgeResult<Option<DiagnosisCode>> {
        let row = sqlx::query_as::<_, DiagnosisRow>(
            "SELECT code, description, category, billable \
             FROM diagnosis_codes WHERE code = $1",
        )
        .bind(normalize_diagnosis_code(code))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DiagnosisCode::from))
    }

    async fn get_procedure(&self, code: &str) -> KnowledgeResult<Option<ProcedureCode>> {
        let row = sqlx::query_as::<_, ProcedureRow>(
            "SELECT code, description, modality, body_part, requires_contrast \
             FROM procedure_codes WHERE code = $1",
        )
        .bind(normalize_procedure_code(code))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProcedureCode::from))
    }

    async fn diagnoses_by_category(&self, category: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let rows = sqlx::query_as::<_, DiagnosisRow>(
            "SELECT code, description, category, billable \
             FROM diagnosis_codes WHERE LOWER(category) = $1 ORDER BY code",
        )
        .bind(normalize_keyword(category))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiagnosisCode::from).collect())
    }

    async fn procedures_by_modality(&self, modality: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let rows = sqlx::query_as::<_, ProcedureRow>(
            "SELECT code, description, modality, body_part, requires_contrast \
             FROM procedure_codes WHERE LOWER(modality) = $1 ORDER BY code",
        )
        .bind(normalize_keyword(modality))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProcedureCode::from).collect())
    }

    async fn get_mapping(
        &self,
        diagnosis_code: &str,
        procedure_code: &str,
    ) -> KnowledgeResult<Option<CodeMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT diagnosis_code, procedure_code, appropriateness_rating, \
                    evidence_level, justification \
             FROM code_mappings WHERE diagnosis_code = $1 AND procedure_code = $2",
        )
        .bind(normalize_diagnosis_code(diagnosis_code))
        .bind(normalize_procedure_code(procedure_code))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CodeMapping::from))
    }

    async fn mappings_for_diagnosis(
        &self,
        diagnosis_code: &str,
    ) -> KnowledgeResult<Vec<CodeMapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT diagnosis_code, procedure_code, appropriateness_rating, \
                    evidence_level, justification \
             FROM code_mappings WHERE diagnosis_code = $1 \
             ORDER BY appropriateness_rating DESC, procedure_code",
        )
        .bind(normalize_diagnosis_code(diagnosis_code))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CodeMapping::from).collect())
    }

    async fn search_diagnoses(&self, keyword: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DiagnosisRow>(
            "SELECT code, description, category, billable \
             FROM diagnosis_codes WHERE description ILIKE '%' || $1 || '%' \
             ORDER BY code LIMIT $2",
        )
        .bind(needle)
        .bind(SEARCH_RESULT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiagnosisCode::from).collect())
    }

    async fn search_procedures(&self, keyword: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ProcedureRow>(
            "SELECT code, description, modality, body_part, requires_contrast \
             FROM procedure_codes \
             WHERE description ILIKE '%' || $1 || '%' \
                OR modality ILIKE '%' || $1 || '%' \
                OR body_part ILIKE '%' || $1 || '%' \
             ORDER BY code LIMIT $2",
        )
        .bind(needle)
        .bind(SEARCH_RESULT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProcedureCode::from).collect())
    }

    async fn get_document(&self, slug: &str) -> KnowledgeResult<Option<GuidelineDocument>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT slug, title, body, source FROM guideline_documents WHERE slug = $1",
        )
        .bind(slug.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(GuidelineDocument::from))
    }

    async fn search_documents(&self, keyword: &str) -> KnowledgeResult<Vec<GuidelineDocument>> {
        let needle = normalize_keyword(keyword);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT slug, title, body, source FROM guideline_documents \
             WHERE title ILIKE '%' || $1 || '%' OR body ILIKE '%' || $1 || '%' \
             ORDER BY slug LIMIT $2",
        )
        .bind(needle)
        .bind(SEARCH_RESULT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GuidelineDocument::from).collect())
    }

    async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Knowledge store health check failed: {}", e);
                false
            }
        }
    }
}

// End-to-end pipeline tests wiring the validation service to the seeded
// in-memory knowledge store and the offline review heuristic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use knowledge_cache::{
    CacheConfig, CachedKnowledgeStore, CodeMapping, DiagnosisCode, GuidelineDocument,
    InMemoryKnowledgeStore, KnowledgeError, KnowledgeResult, KnowledgeStore, MemoryCacheTier,
    ProcedureCode,
};
use uuid::Uuid;
use validation_engine::providers::offline::OfflineProvider;
use validation_engine::{
    AttemptRecord, DictationRequest, EngineConfig, EngineError, EngineResult, Gender,
    GenerationProvider, OverrideRequest, PatientContext, ValidationResult, ValidationService,
    ValidationStatus, PASSING_SCORE,
};

// ====== HELPERS ======

const JUSTIFICATION: &str =
    "Attending physician reviewed the case with radiology and confirmed imaging urgency.";

/// Route engine logs through the test harness when RUST_LOG is set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Durable tier whose backend is down; the cached store must degrade.
struct FailingStore;

fn backend_down<T>() -> KnowledgeResult<T> {
    Err(KnowledgeError::QueryFailed("backend offline".to_string()))
}

#[async_trait]
impl KnowledgeStore for FailingStore {
    async fn get_diagnosis(&self, _code: &str) -> KnowledgeResult<Option<DiagnosisCode>> {
        backend_down()
    }

    async fn get_procedure(&self, _code: &str) -> KnowledgeResult<Option<ProcedureCode>> {
        backend_down()
    }

    async fn diagnoses_by_category(&self, _category: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        backend_down()
    }

    async fn procedures_by_modality(
        &self,
        _modality: &str,
    ) -> KnowledgeResult<Vec<ProcedureCode>> {
        backend_down()
    }

    async fn get_mapping(
        &self,
        _diagnosis_code: &str,
        _procedure_code: &str,
    ) -> KnowledgeResult<Option<CodeMapping>> {
        backend_down()
    }

    async fn mappings_for_diagnosis(
        &self,
        _diagnosis_code: &str,
    ) -> KnowledgeResult<Vec<CodeMapping>> {
        backend_down()
    }

    async fn search_diagnoses(&self, _keyword: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        backend_down()
    }

    async fn search_procedures(&self, _keyword: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        backend_down()
    }

    async fn get_document(&self, _slug: &str) -> KnowledgeResult<Option<GuidelineDocument>> {
        backend_down()
    }

    async fn search_documents(&self, _keyword: &str) -> KnowledgeResult<Vec<GuidelineDocument>> {
        backend_down()
    }

    async fn is_healthy(&self) -> bool {
        false
    }
}

/// Provider that never answers within any reasonable deadline.
struct SleepyProvider;

#[async_trait]
impl GenerationProvider for SleepyProvider {
    async fn generate(&self, _prompt: &str) -> EngineResult<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(r#"{"status": "valid", "compliance_score": 9}"#.to_string())
    }

    fn name(&self) -> &str {
        "sleepy"
    }
}

/// Provider whose endpoint is hard down.
struct OutageProvider;

#[async_trait]
impl GenerationProvider for OutageProvider {
    async fn generate(&self, _prompt: &str) -> EngineResult<String> {
        Err(EngineError::GenerationUnavailable(
            "model endpoint returned 503".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "outage"
    }
}

fn seeded_knowledge() -> Arc<CachedKnowledgeStore> {
    Arc::new(CachedKnowledgeStore::new(
        Arc::new(InMemoryKnowledgeStore::with_seed_data()),
        Arc::new(MemoryCacheTier::new()),
        &CacheConfig::default(),
    ))
}

fn failing_knowledge() -> Arc<CachedKnowledgeStore> {
    Arc::new(CachedKnowledgeStore::new(
        Arc::new(FailingStore),
        Arc::new(MemoryCacheTier::new()),
        &CacheConfig::default(),
    ))
}

fn offline_service(knowledge: Arc<CachedKnowledgeStore>) -> ValidationService {
    ValidationService::with_provider(
        EngineConfig::default(),
        knowledge,
        Box::new(OfflineProvider::new()),
    )
}

fn chest_request() -> DictationRequest {
    DictationRequest {
        order_id: Uuid::new_v4(),
        raw_text: "Follow-up chest X-ray to evaluate resolution of right lower lobe pneumonia \
                   after antibiotics."
            .to_string(),
        patient: PatientContext {
            age: Some(62),
            gender: Some(Gender::Female),
        },
        specialty: "Family Medicine".to_string(),
        prior_attempts: Vec::new(),
    }
}

fn non_passing_verdict() -> ValidationResult {
    ValidationResult {
        status: ValidationStatus::NeedsClarification,
        feedback: "Document the duration and severity of symptoms.".to_string(),
        compliance_score: 5,
        suggested_diagnosis_codes: vec!["M54.50".to_string()],
        suggested_procedure_codes: vec!["72148".to_string()],
        overridden: false,
        provider: "offline".to_string(),
        checked_at: Utc::now(),
    }
}

fn failing_history(attempts: u32) -> Vec<AttemptRecord> {
    (1..=attempts)
        .map(|n| AttemptRecord::new(n, "Lumbar MRI requested.", non_passing_verdict()))
        .collect()
}

// ====== VALIDATION PIPELINE ======

#[tokio::test]
async fn test_clean_dictation_validates_end_to_end() {
    init_tracing();
    let service = offline_service(seeded_knowledge());

    let result = service.validate(chest_request()).await.unwrap();

    assert_eq!(result.status, ValidationStatus::Valid);
    assert!(result.is_valid());
    assert!(result.compliance_score >= PASSING_SCORE);
    assert!(!result.overridden);
    assert_eq!(result.provider, "offline");
    assert!(result
        .suggested_diagnosis_codes
        .contains(&"R07.9".to_string()));
    assert!(result
        .suggested_procedure_codes
        .contains(&"71046".to_string()));
}

#[tokio::test]
async fn test_feedback_respects_the_specialty_word_budget() {
    let service = offline_service(seeded_knowledge());

    // Family Medicine carries a 29-word budget.
    let result = service.validate(chest_request()).await.unwrap();

    assert!(!result.feedback.is_empty());
    assert!(result.feedback.split_whitespace().count() <= 29);
}

#[tokio::test]
async fn test_degraded_knowledge_still_produces_a_verdict() {
    init_tracing();
    let knowledge = failing_knowledge();

    // The cached store swallows backend failures and serves empty sets.
    let diagnoses = knowledge.search_diagnoses("chest").await.unwrap();
    assert!(diagnoses.is_empty());

    let service = offline_service(knowledge);
    let result = service.validate(chest_request()).await.unwrap();

    assert!(result.compliance_score <= 9);
    assert!(!result.feedback.is_empty());
}

#[tokio::test]
async fn test_generation_timeout_degrades_to_needs_clarification() {
    init_tracing();
    let mut config = EngineConfig::default();
    config.generation.timeout_secs = 0;
    let service =
        ValidationService::with_provider(config, seeded_knowledge(), Box::new(SleepyProvider));

    let mut request = chest_request();
    request.specialty = "Internal Medicine".to_string();
    let result = service.validate(request).await.unwrap();

    assert_eq!(result.status, ValidationStatus::NeedsClarification);
    assert_eq!(result.compliance_score, 0);
    assert!(!result.overridden);
    assert!(result.feedback.contains("could not be reached"));
}

#[tokio::test]
async fn test_provider_outage_degrades_to_needs_clarification() {
    let service = ValidationService::with_provider(
        EngineConfig::default(),
        seeded_knowledge(),
        Box::new(OutageProvider),
    );

    let result = service.validate(chest_request()).await.unwrap();

    assert_eq!(result.status, ValidationStatus::NeedsClarification);
    assert!(!result.is_valid());
}

// ====== FAIL-FAST REQUEST CHECKS ======

#[tokio::test]
async fn test_nil_order_id_is_rejected() {
    let service = offline_service(seeded_knowledge());
    let mut request = chest_request();
    request.order_id = Uuid::nil();

    let result = service.validate(request).await;
    assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_blank_dictation_is_rejected() {
    let service = offline_service(seeded_knowledge());
    let mut request = chest_request();
    request.raw_text = "   \n\t  ".to_string();

    let result = service.validate(request).await;
    assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_malformed_attempt_history_is_rejected() {
    let service = offline_service(seeded_knowledge());
    let mut request = chest_request();
    request.prior_attempts = vec![
        AttemptRecord::new(2, "earlier dictation", non_passing_verdict()),
        AttemptRecord::new(1, "earlier dictation", non_passing_verdict()),
    ];

    let result = service.validate(request).await;
    assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
}

// ====== OVERRIDE GOVERNANCE ======

#[tokio::test]
async fn test_override_after_three_failures_is_accepted() {
    let service = offline_service(seeded_knowledge());

    let request = OverrideRequest {
        order_id: Uuid::new_v4(),
        justification: JUSTIFICATION.to_string(),
        specialty: "Family Medicine".to_string(),
        prior_attempts: failing_history(3),
    };
    let result = service.request_override(request).await.unwrap();

    assert!(result.overridden);
    assert_eq!(result.status, ValidationStatus::NeedsClarification);
    assert_eq!(result.compliance_score, 5);
    assert_eq!(result.suggested_diagnosis_codes, vec!["M54.50".to_string()]);
    assert_eq!(result.provider, "override");
    assert!(result
        .feedback
        .starts_with("Order accepted on physician override:"));
    assert!(result.feedback.split_whitespace().count() <= 29);
}

#[tokio::test]
async fn test_override_at_first_attempt_is_rejected() {
    let service = offline_service(seeded_knowledge());

    let history = failing_history(1);
    let request = OverrideRequest {
        order_id: Uuid::new_v4(),
        justification: JUSTIFICATION.to_string(),
        specialty: "Family Medicine".to_string(),
        prior_attempts: history.clone(),
    };

    match service.request_override(request).await {
        Err(EngineError::OverrideNotEligible { attempts, required }) => {
            assert_eq!(attempts, 1);
            assert_eq!(required, 3);
        }
        other => panic!("expected OverrideNotEligible, got {other:?}"),
    }
    // Rejection is synchronous; the caller's history is untouched.
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_short_justification_is_rejected_even_when_eligible() {
    let service = offline_service(seeded_knowledge());

    let request = OverrideRequest {
        order_id: Uuid::new_v4(),
        justification: "urgent".to_string(),
        specialty: "Family Medicine".to_string(),
        prior_attempts: failing_history(3),
    };

    assert!(matches!(
        service.request_override(request).await,
        Err(EngineError::JustificationTooShort { .. })
    ));
}

// ====== CACHE CONTROL ======

#[tokio::test]
async fn test_cache_toggle_reaches_the_knowledge_layer() {
    let knowledge = seeded_knowledge();
    let service = offline_service(knowledge.clone());

    assert!(knowledge.cache_enabled());
    service.set_cache_enabled(false);
    assert!(!knowledge.cache_enabled());
    service.set_cache_enabled(true);
    assert!(knowledge.cache_enabled());
}

//! Validation orchestrator. One entry point per caller action, wiring
//! extraction, knowledge gathering, policy, prompting, generation, and
//! normalization into a single verdict.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use knowledge_cache::{CachedKnowledgeStore, KnowledgeStore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::attempts::AttemptTracker;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extraction::KeywordExtractor;
use crate::models::{
    DictationRequest, OverrideRequest, ValidationResult, ValidationStatus,
};
use crate::policy::SpecialtyPolicyProvider;
use crate::prompt::{KnowledgeExcerpt, PromptComposer};
use crate::providers::{create_provider, GenerationProvider};
use crate::response::ResponseNormalizer;

/// Keywords beyond this many rarely add signal and multiply lookups.
const MAX_SEARCH_KEYWORDS: usize = 8;

const UNAVAILABLE_FEEDBACK: &str =
    "The clinical reviewer model could not be reached, so no determination was made \
     about this dictation. Please resubmit; the order has not been rejected.";

/// Shared, `&self`-only service. Callers wrap it in an `Arc` and must
/// serialize concurrent calls for the same order themselves.
pub struct ValidationService {
    config: EngineConfig,
    policy: SpecialtyPolicyProvider,
    knowledge: Arc<CachedKnowledgeStore>,
    provider: Box<dyn GenerationProvider>,
}

impl ValidationService {
    /// Builds the service with the provider selected from configuration.
    pub fn new(config: EngineConfig, knowledge: Arc<CachedKnowledgeStore>) -> EngineResult<Self> {
        let provider = create_provider(&config.generation)?;
        Ok(Self::with_provider(config, knowledge, provider))
    }

    /// Provider injection constructor, used by tests and embedders.
    pub fn with_provider(
        config: EngineConfig,
        knowledge: Arc<CachedKnowledgeStore>,
        provider: Box<dyn GenerationProvider>,
    ) -> Self {
        let policy = SpecialtyPolicyProvider::new(config.default_word_budget);
        Self {
            config,
            policy,
            knowledge,
            provider,
        }
    }

    pub fn policy(&self) -> &SpecialtyPolicyProvider {
        &self.policy
    }

    /// Setup-phase access for registering site-specific budgets and
    /// checklists before the service is shared.
    pub fn policy_mut(&mut self) -> &mut SpecialtyPolicyProvider {
        &mut self.policy
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.knowledge.set_cache_enabled(enabled);
    }

    /// Validates one dictation. Fail-fast argument errors come back as
    /// `Err`; past those checks every outcome, including generation
    /// unavailability, is a well-formed [`ValidationResult`].
    pub async fn validate(&self, request: DictationRequest) -> EngineResult<ValidationResult> {
        if request.order_id.is_nil() {
            return Err(EngineError::InvalidRequest(
                "order id must not be nil".to_string(),
            ));
        }
        if request.raw_text.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "dictation text must not be blank".to_string(),
            ));
        }
        let tracker = AttemptTracker::from_history(
            request.order_id,
            request.prior_attempts.clone(),
            self.config.override_attempt_threshold,
            self.config.min_justification_chars,
        )?;

        info!(
            order_id = %request.order_id,
            specialty = %request.specialty,
            attempt = tracker.next_attempt_number(),
            "Validating dictation"
        );

        let keywords = KeywordExtractor::extract(&request.raw_text);
        debug!(order_id = %request.order_id, keyword_count = keywords.len(), "Extracted keywords");

        let excerpt = self.gather_excerpt(&keywords).await;
        if excerpt.is_empty() {
            debug!(order_id = %request.order_id, "No knowledge entries matched the dictation");
        }

        let checklist = self.policy.resolve_checklist(&request.specialty);
        let prompt = PromptComposer::compose(
            &request.raw_text,
            &request.patient,
            &request.specialty,
            &checklist,
            &excerpt,
        );

        let budget = Duration::from_secs(self.config.generation.timeout_secs);
        let raw = match timeout(budget, self.provider.generate(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(EngineError::GenerationUnavailable(reason))) => {
                warn!(order_id = %request.order_id, %reason, "Generation unavailable");
                return Ok(self.unavailable_result(&request.specialty));
            }
            Ok(Err(other)) => return Err(other),
            Err(_) => {
                warn!(
                    order_id = %request.order_id,
                    timeout_secs = self.config.generation.timeout_secs,
                    "Generation timed out"
                );
                return Ok(self.unavailable_result(&request.specialty));
            }
        };

        let result = ResponseNormalizer::normalize(
            &raw,
            &request.specialty,
            &self.policy,
            self.provider.name(),
        );
        info!(
            order_id = %request.order_id,
            status = %result.status,
            compliance_score = result.compliance_score,
            "Validation complete"
        );
        Ok(result)
    }

    /// Explicit caller override. Authorization is checked against the
    /// supplied history; rejections are synchronous errors and mutate
    /// nothing. The issued result carries the prior attempt's status,
    /// score, and codes with `overridden` set.
    pub async fn request_override(
        &self,
        request: OverrideRequest,
    ) -> EngineResult<ValidationResult> {
        if request.order_id.is_nil() {
            return Err(EngineError::InvalidRequest(
                "order id must not be nil".to_string(),
            ));
        }
        let tracker = AttemptTracker::from_history(
            request.order_id,
            request.prior_attempts,
            self.config.override_attempt_threshold,
            self.config.min_justification_chars,
        )?;
        tracker.authorize_override(&request.justification)?;

        let Some(prior) = tracker.latest() else {
            // Unreachable past authorization, which requires history.
            return Err(EngineError::InvalidRequest(
                "override requires a recorded attempt".to_string(),
            ));
        };

        let feedback = format!(
            "Order accepted on physician override: {}",
            request.justification.trim()
        );
        info!(
            order_id = %request.order_id,
            prior_attempt = prior.attempt_number,
            prior_status = %prior.result.status,
            "Issuing override result"
        );
        Ok(ValidationResult {
            status: prior.result.status,
            feedback: self.policy.enforce_word_budget(&feedback, &request.specialty),
            compliance_score: prior.result.compliance_score,
            suggested_diagnosis_codes: prior.result.suggested_diagnosis_codes.clone(),
            suggested_procedure_codes: prior.result.suggested_procedure_codes.clone(),
            overridden: true,
            provider: "override".to_string(),
            checked_at: Utc::now(),
        })
    }

    async fn gather_excerpt(&self, keywords: &[String]) -> KnowledgeExcerpt {
        let mut excerpt = KnowledgeExcerpt::new();
        for keyword in keywords.iter().take(MAX_SEARCH_KEYWORDS) {
            for diagnosis in self
                .knowledge
                .search_diagnoses(keyword)
                .await
                .unwrap_or_default()
            {
                excerpt.add_diagnosis(diagnosis);
            }
            for procedure in self
                .knowledge
                .search_procedures(keyword)
                .await
                .unwrap_or_default()
            {
                excerpt.add_procedure(procedure);
            }
            for document in self
                .knowledge
                .search_documents(keyword)
                .await
                .unwrap_or_default()
            {
                excerpt.add_document(document);
            }
        }

        // Expand appropriateness guidance for every matched diagnosis.
        let codes: Vec<String> = excerpt
            .diagnoses()
            .iter()
            .map(|dx| dx.code.clone())
            .collect();
        for code in codes {
            for mapping in self
                .knowledge
                .mappings_for_diagnosis(&code)
                .await
                .unwrap_or_default()
            {
                if let Ok(Some(procedure)) =
                    self.knowledge.get_procedure(&mapping.procedure_code).await
                {
                    excerpt.add_procedure(procedure);
                }
                excerpt.add_mapping(mapping);
            }
        }
        excerpt
    }

    fn unavailable_result(&self, specialty: &str) -> ValidationResult {
        ValidationResult {
            status: ValidationStatus::NeedsClarification,
            feedback: self.policy.enforce_word_budget(UNAVAILABLE_FEEDBACK, specialty),
            compliance_score: 0,
            suggested_diagnosis_codes: Vec::new(),
            suggested_procedure_codes: Vec::new(),
            overridden: false,
            provider: self.provider.name().to_string(),
            checked_at: Utc::now(),
        }
    }
}

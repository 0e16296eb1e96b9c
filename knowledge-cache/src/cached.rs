// Caching decorator: fast tier in front of the durable knowledge store
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, DomainTtls};
use crate::error::KnowledgeResult;
use crate::memory::InMemoryKnowledgeStore;
use crate::models::{CodeMapping, DiagnosisCode, GuidelineDocument, ProcedureCode};
use crate::postgres::PostgresKnowledgeStore;
use crate::store::{
    normalize_diagnosis_code, normalize_keyword, normalize_procedure_code, KnowledgeStore,
};
use crate::tier::{CacheTier, MemoryCacheTier, RedisCacheTier};

/// Knowledge domains carry distinct TTLs: code tables are near-static,
/// mappings are reviewed periodically, search results are cheap to recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheDomain {
    Codes,
    Mappings,
    Documents,
    Search,
}

impl CacheDomain {
    fn ttl_secs(self, ttls: &DomainTtls) -> u64 {
        match self {
            CacheDomain::Codes => ttls.codes_secs,
            CacheDomain::Mappings => ttls.mappings_secs,
            CacheDomain::Documents => ttls.documents_secs,
            CacheDomain::Search => ttls.search_secs,
        }
    }
}

/// Wraps a durable [`KnowledgeStore`] with a fast cache tier.
///
/// Lookups probe the fast tier first; misses fall through to the inner
/// store and populate the tier with a per-domain TTL. Both tiers degrade:
/// a failing cache tier counts as a miss, a failing inner store yields an
/// empty result. Neither surfaces as an error to the validation pipeline.
pub struct CachedKnowledgeStore {
    inner: Arc<dyn KnowledgeStore>,
    fast: Arc<dyn CacheTier>,
    ttls: DomainTtls,
    enabled: AtomicBool,
}

impl CachedKnowledgeStore {
    pub fn new(
        inner: Arc<dyn KnowledgeStore>,
        fast: Arc<dyn CacheTier>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            inner,
            fast,
            ttls: config.ttls.clone(),
            enabled: AtomicBool::new(config.enabled),
        }
    }

    /// Wire up tiers from configuration: Postgres when a database URL is
    /// set (seeded in-memory store otherwise), Redis when a Redis URL is
    /// set (in-process tier otherwise).
    pub async fn from_config(config: &CacheConfig) -> KnowledgeResult<Self> {
        let inner: Arc<dyn KnowledgeStore> = match &config.database_url {
            Some(url) => Arc::new(PostgresKnowledgeStore::connect(url).await?),
            None => {
                info!("No knowledge database configured, using seeded in-memory store");
                Arc::new(InMemoryKnowledgeStore::with_seed_data())
            }
        };
        let fast: Arc<dyn CacheTier> = match &config.redis_url {
            Some(url) => Arc::new(RedisCacheTier::connect(url).await?),
            None => Arc::new(MemoryCacheTier::new()),
        };
        Ok(Self::new(inner, fast, config))
    }

    /// Administrative toggle; takes effect on the next lookup.
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!(enabled, "Knowledge cache toggled");
    }

    pub fn cache_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Probe the fast tier, fall back to `fetch`, populate on success.
    ///
    /// `fetch` is only polled on a cache miss. Inner-store failures degrade
    /// to `T::default()` so a knowledge outage never aborts validation.
    async fn cached_fetch<T, F>(
        &self,
        key: String,
        domain: CacheDomain,
        fetch: F,
    ) -> KnowledgeResult<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: Future<Output = KnowledgeResult<T>> + Send,
    {
        if self.cache_enabled() {
            match self.fast.get(&key).await {
                Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                    Ok(value) => {
                        debug!(key = %key, "Knowledge cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(key = %key, "Discarding undecodable cache payload: {}", e);
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, "Cache tier read failed: {}", e);
                }
            }
        }

        let value = match fetch.await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "Knowledge lookup failed, degrading to empty: {}", e);
                return Ok(T::default());
            }
        };

        if self.cache_enabled() {
            match serde_json::to_string(&value) {
                Ok(payload) => {
                    if let Err(e) = self
                        .fast
                        .put(&key, payload, domain.ttl_secs(&self.ttls))
                        .await
                    {
                        warn!(key = %key, "Cache tier write failed: {}", e);
                    }
                }
                Err(e) => warn!(key = %key, "Cache payload serialization failed: {}", e),
            }
        }

        Ok(value)
    }
}

#[async_trait]
impl KnowledgeStore for CachedKnowledgeStore {
    async fn get_diagnosis(&self, code: &str) -> KnowledgeResult<Option<DiagnosisCode>> {
        let code = normalize_diagnosis_code(code);
        let key = format!("knowledge:dx:{code}");
        self.cached_fetch(key, CacheDomain::Codes, self.inner.get_diagnosis(&code))
            .await
    }

    async fn get_procedure(&self, code: &str) -> KnowledgeResult<Option<ProcedureCode>> {
        let code = normalize_procedure_code(code);
        let key = format!("knowledge:px:{code}");
        self.cached_fetch(key, CacheDomain::Codes, self.inner.get_procedure(&code))
            .await
    }

    async fn diagnoses_by_category(&self, category: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let category = normalize_keyword(category);
        let key = format!("knowledge:dxcat:{category}");
        self.cached_fetch(
            key,
            CacheDomain::Codes,
            self.inner.diagnoses_by_category(&category),
        )
        .await
    }

    async fn procedures_by_modality(&self, modality: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let modality = normalize_keyword(modality);
        let key = format!("knowledge:pxmod:{modality}");
        self.cached_fetch(
            key,
            CacheDomain::Codes,
            self.inner.procedures_by_modality(&modality),
        )
        .await
    }

    async fn get_mapping(
        &self,
        diagnosis_code: &str,
        procedure_code: &str,
    ) -> KnowledgeResult<Option<CodeMapping>> {
        let dx = normalize_diagnosis_code(diagnosis_code);
        let px = normalize_procedure_code(procedure_code);
        let key = format!("knowledge:map:{dx}:{px}");
        self.cached_fetch(key, CacheDomain::Mappings, self.inner.get_mapping(&dx, &px))
            .await
    }

    async fn mappings_for_diagnosis(
        &self,
        diagnosis_code: &str,
    ) -> KnowledgeResult<Vec<CodeMapping>> {
        let dx = normalize_diagnosis_code(diagnosis_code);
        let key = format!("knowledge:maps:{dx}");
        self.cached_fetch(
            key,
            CacheDomain::Mappings,
            self.inner.mappings_for_diagnosis(&dx),
        )
        .await
    }

    async fn search_diagnoses(&self, keyword: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
        let keyword = normalize_keyword(keyword);
        let key = format!("knowledge:dxq:{keyword}");
        self.cached_fetch(
            key,
            CacheDomain::Search,
            self.inner.search_diagnoses(&keyword),
        )
        .await
    }

    async fn search_procedures(&self, keyword: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
        let keyword = normalize_keyword(keyword);
        let key = format!("knowledge:pxq:{keyword}");
        self.cached_fetch(
            key,
            CacheDomain::Search,
            self.inner.search_procedures(&keyword),
        )
        .await
    }

    async fn get_document(&self, slug: &str) -> KnowledgeResult<Option<GuidelineDocument>> {
        let slug = slug.trim().to_string();
        let key = format!("knowledge:doc:{slug}");
        self.cached_fetch(key, CacheDomain::Documents, self.inner.get_document(&slug))
            .await
    }

    async fn search_documents(&self, keyword: &str) -> KnowledgeResult<Vec<GuidelineDocument>> {
        let keyword = normalize_keyword(keyword);
        let key = format!("knowledge:docq:{keyword}");
        self.cached_fetch(
            key,
            CacheDomain::Search,
            self.inner.search_documents(&keyword),
        )
        .await
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KnowledgeError;
    use chrono::{Duration, Utc};

    /// Inner store whose every lookup fails, for degraded-path tests.
    struct FailingStore;

    #[async_trait]
    impl KnowledgeStore for FailingStore {
        async fn get_diagnosis(&self, _: &str) -> KnowledgeResult<Option<DiagnosisCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn get_procedure(&self, _: &str) -> KnowledgeResult<Option<ProcedureCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn diagnoses_by_category(&self, _: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn procedures_by_modality(&self, _: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn get_mapping(&self, _: &str, _: &str) -> KnowledgeResult<Option<CodeMapping>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn mappings_for_diagnosis(&self, _: &str) -> KnowledgeResult<Vec<CodeMapping>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn search_diagnoses(&self, _: &str) -> KnowledgeResult<Vec<DiagnosisCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn search_procedures(&self, _: &str) -> KnowledgeResult<Vec<ProcedureCode>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn get_document(&self, _: &str) -> KnowledgeResult<Option<GuidelineDocument>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn search_documents(&self, _: &str) -> KnowledgeResult<Vec<GuidelineDocument>> {
            Err(KnowledgeError::QueryFailed("store offline".to_string()))
        }
        async fn is_healthy(&self) -> bool {
            false
        }
    }

    fn seeded_cached_store() -> (CachedKnowledgeStore, Arc<MemoryCacheTier>) {
        let tier = Arc::new(MemoryCacheTier::new());
        let store = CachedKnowledgeStore::new(
            Arc::new(InMemoryKnowledgeStore::with_seed_data()),
            tier.clone(),
            &CacheConfig::default(),
        );
        (store, tier)
    }

    #[tokio::test]
    async fn test_lookup_populates_fast_tier() {
        let (store, tier) = seeded_cached_store();

        let dx = store.get_diagnosis("r07.9").await.unwrap();
        assert!(dx.is_some(), "seeded code should resolve");

        // Key is normalized (uppercased) before it reaches the tier.
        let payload = tier.get("knowledge:dx:R07.9").await.unwrap();
        assert!(payload.is_some(), "lookup should populate the tier");
    }

    #[tokio::test]
    async fn test_hit_is_served_from_fast_tier() {
        let (store, tier) = seeded_cached_store();

        let doctored = DiagnosisCode {
            code: "R07.9".to_string(),
            description: "planted payload".to_string(),
            category: "symptoms".to_string(),
            billable: true,
        };
        let payload = serde_json::to_string(&Some(doctored)).unwrap();
        tier.put("knowledge:dx:R07.9", payload, 60).await.unwrap();

        let dx = store.get_diagnosis("R07.9").await.unwrap().unwrap();
        assert_eq!(dx.description, "planted payload");
    }

    #[tokio::test]
    async fn test_expired_entry_falls_through_to_inner_store() {
        let (store, tier) = seeded_cached_store();

        let doctored = DiagnosisCode {
            code: "R07.9".to_string(),
            description: "stale payload".to_string(),
            category: "symptoms".to_string(),
            billable: true,
        };
        let payload = serde_json::to_string(&Some(doctored)).unwrap();
        tier.put_with_expiry(
            "knowledge:dx:R07.9",
            payload,
            Utc::now() - Duration::seconds(1),
        );

        let dx = store.get_diagnosis("R07.9").await.unwrap().unwrap();
        assert_ne!(dx.description, "stale payload");
    }

    #[tokio::test]
    async fn test_inner_failure_degrades_to_empty() {
        let store = CachedKnowledgeStore::new(
            Arc::new(FailingStore),
            Arc::new(MemoryCacheTier::new()),
            &CacheConfig::default(),
        );

        assert!(store.get_diagnosis("R07.9").await.unwrap().is_none());
        assert!(store.search_procedures("chest").await.unwrap().is_empty());
        assert!(store
            .mappings_for_diagnosis("R07.9")
            .await
            .unwrap()
            .is_empty());
        assert!(!store.is_healthy().await);
    }

    #[tokio::test]
    async fn test_disabled_cache_skips_tier() {
        let tier = Arc::new(MemoryCacheTier::new());
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let store = CachedKnowledgeStore::new(
            Arc::new(InMemoryKnowledgeStore::with_seed_data()),
            tier.clone(),
            &config,
        );

        assert!(store.get_diagnosis("R07.9").await.unwrap().is_some());
        assert!(tier.get("knowledge:dx:R07.9").await.unwrap().is_none());

        store.set_cache_enabled(true);
        assert!(store.cache_enabled());
        assert!(store.get_diagnosis("R07.9").await.unwrap().is_some());
        assert!(tier.get("knowledge:dx:R07.9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_negative_lookup_is_cached() {
        let (store, tier) = seeded_cached_store();

        assert!(store.get_diagnosis("X99.9").await.unwrap().is_none());
        let payload = tier.get("knowledge:dx:X99.9").await.unwrap();
        assert_eq!(payload.as_deref(), Some("null"));
    }
}

use serde::{Deserialize, Serialize};

/// Per-domain TTLs for the fast tier, in seconds.
///
/// Codes are near-static, mappings see periodic guideline review, and search
/// results get their own shorter window because they are the most expensive
/// lookups to recompute against the durable tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTtls {
    pub codes_secs: u64,
    pub mappings_secs: u64,
    pub documents_secs: u64,
    pub search_secs: u64,
}

impl Default for DomainTtls {
    fn default() -> Self {
        Self {
            codes_secs: 86_400,
            mappings_secs: 21_600,
            documents_secs: 43_200,
            search_secs: 1_800,
        }
    }
}

/// Knowledge cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seed value for the runtime cache toggle
    pub enabled: bool,
    /// Durable tier connection string; absent selects the seeded in-memory store
    pub database_url: Option<String>,
    /// Fast tier connection string; absent selects the in-process tier
    pub redis_url: Option<String>,
    pub ttls: DomainTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: None,
            redis_url: None,
            ttls: DomainTtls::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let enabled = std::env::var("KNOWLEDGE_CACHE_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let database_url = std::env::var("KNOWLEDGE_DATABASE_URL").ok();
        let redis_url = std::env::var("KNOWLEDGE_REDIS_URL").ok();

        let defaults = DomainTtls::default();
        let ttls = DomainTtls {
            codes_secs: std::env::var("KNOWLEDGE_TTL_CODES_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.codes_secs),
            mappings_secs: std::env::var("KNOWLEDGE_TTL_MAPPINGS_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.mappings_secs),
            documents_secs: std::env::var("KNOWLEDGE_TTL_DOCUMENTS_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.documents_secs),
            search_secs: std::env::var("KNOWLEDGE_TTL_SEARCH_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.search_secs),
        };

        Self {
            enabled,
            database_url,
            redis_url,
            ttls,
        }
    }
}

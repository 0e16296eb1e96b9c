use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::error::{KnowledgeError, KnowledgeResult};

/// A fast-tier entry: serialized payload plus its expiry instant.
///
/// An entry is valid only while `now < expires_at`; expired entries are
/// misses, never served stale.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Fast cache tier: get/put of serialized payloads with a per-entry TTL.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> KnowledgeResult<Option<String>>;
    async fn put(&self, key: &str, payload: String, ttl_secs: u64) -> KnowledgeResult<()>;
}

/// In-process fast tier.
///
/// Used when no Redis URL is configured; population races are benign
/// (idempotent payloads, last writer wins).
#[derive(Debug, Default)]
pub struct MemoryCacheTier {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_with_expiry(&self, key: &str, payload: String, expires_at: DateTime<Utc>) {
        self.entries
            .insert(key.to_string(), CacheEntry { payload, expires_at });
    }
}

#[async_trait]
impl CacheTier for MemoryCacheTier {
    async fn get(&self, key: &str) -> KnowledgeResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.payload.clone()));
            }
        }
        // Drop the read guard before removing the stale entry.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn put(&self, key: &str, payload: String, ttl_secs: u64) -> KnowledgeResult<()> {
        let expires_at = Utc::now() + Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64);
        self.put_with_expiry(key, payload, expires_at);
        Ok(())
    }
}

/// Redis-backed fast tier, shared across engine instances.
pub struct RedisCacheTier {
    redis: ConnectionManager,
}

impl RedisCacheTier {
    pub async fn connect(redis_url: &str) -> KnowledgeResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| KnowledgeError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| KnowledgeError::ConnectionFailed(e.to_string()))?;
        Ok(Self { redis })
    }
}

#[async_trait]
impl CacheTier for RedisCacheTier {
    async fn get(&self, key: &str) -> KnowledgeResult<Option<String>> {
        let mut conn = self.redis.clone();
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload)
    }

    async fn put(&self, key: &str, payload: String, ttl_secs: u64) -> KnowledgeResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_is_a_hard_boundary() {
        let expired = CacheEntry {
            payload: "{}".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        assert!(expired.is_expired());

        let fresh = CacheEntry {
            payload: "{}".to_string(),
            expires_at: Utc::now() + Duration::seconds(60),
        };
        assert!(!fresh.is_expired());
    }

    #[tokio::test]
    async fn test_memory_tier_round_trips_before_ttl() {
        let tier = MemoryCacheTier::new();
        tier.put("dx:R07.9", "payload".to_string(), 60).await.ok();
        let hit = tier.get("dx:R07.9").await.unwrap_or(None);
        assert_eq!(hit.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn test_memory_tier_treats_expired_entries_as_misses() {
        let tier = MemoryCacheTier::new();
        tier.put_with_expiry(
            "dx:R07.9",
            "stale".to_string(),
            Utc::now() - Duration::seconds(5),
        );
        let hit = tier.get("dx:R07.9").await.unwrap_or(None);
        assert_eq!(hit, None);
    }
}

use super::{IpBlockStore, RateLimitStore, SecurityEventStore};
use crate::error::Result;
use crate::models::{BlockedIp, SecurityEvent, SecurityEventType};
use crate::redis_client::RedisClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Key layout and retention for the Redis-backed stores
#[derive(Clone, Debug)]
pub struct RedisStoreConfig {
    /// Prefix put in front of every key
    pub key_prefix: String,
    /// TTL applied to sliding-window keys so idle keys clean themselves up
    pub window_retention_secs: i64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "sentinel".to_string(),
            window_retention_secs: 86400,
        }
    }
}

/// Redis-backed implementation of the shared-state hot paths: rate-limit
/// windows, IP blocks and the security-event history
///
/// Sliding windows live in sorted sets scored by epoch seconds; counting a
/// window prunes entries older than its start first. IP blocks are JSON rows
/// keyed by address. Multi-instance deployments share all three through one
/// Redis.
#[derive(Clone)]
pub struct RedisSecurityStore {
    redis: RedisClient,
    config: RedisStoreConfig,
}

impl RedisSecurityStore {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            config: RedisStoreConfig::default(),
        }
    }

    pub fn with_config(redis: RedisClient, config: RedisStoreConfig) -> Self {
        Self { redis, config }
    }

    fn rate_key(&self, identifier: &str, action: &str) -> String {
        format!("{}:ratelimit:{}:{}", self.config.key_prefix, identifier, action)
    }

    fn block_key(&self, ip_address: &str) -> String {
        format!("{}:ipblock:{}", self.config.key_prefix, ip_address)
    }

    fn event_key(&self, ip_address: &str) -> String {
        format!("{}:events:{}", self.config.key_prefix, ip_address)
    }

    fn epoch(at: DateTime<Utc>) -> f64 {
        at.timestamp_millis() as f64 / 1000.0
    }

    async fn events_since(&self, ip_address: &str, since: DateTime<Utc>) -> Result<Vec<SecurityEvent>> {
        let key = self.event_key(ip_address);
        let entries = self.redis.zrange_withscores(&key, 0, -1).await?;

        let floor = Self::epoch(since);
        let mut events = Vec::new();
        for (json, score) in entries {
            if score < floor {
                continue;
            }
            if let Ok(event) = serde_json::from_str::<SecurityEvent>(&json) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl RateLimitStore for RedisSecurityStore {
    async fn count_hits(
        &self,
        identifier: &str,
        action: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let key = self.rate_key(identifier, action);
        let from_ts = Self::epoch(from);
        let to_ts = Self::epoch(to);

        // Drop entries that slid out of the window before counting
        self.redis.zrembyscore(&key, 0.0, from_ts - 0.001).await?;
        let count = self.redis.zcount(&key, from_ts, to_ts).await?;
        Ok(count.max(0) as u64)
    }

    async fn record_hit(&self, identifier: &str, action: &str, at: DateTime<Utc>) -> Result<()> {
        let key = self.rate_key(identifier, action);
        let member = uuid::Uuid::new_v4().to_string();

        self.redis.zadd(&key, Self::epoch(at), &member).await?;
        self.redis.expire(&key, self.config.window_retention_secs).await?;
        Ok(())
    }
}

#[async_trait]
impl IpBlockStore for RedisSecurityStore {
    async fn upsert_block(&self, block: BlockedIp) -> Result<()> {
        let key = self.block_key(&block.ip_address);
        let json = serde_json::to_string(&block)?;
        self.redis.set(&key, &json).await?;
        Ok(())
    }

    async fn get_block(&self, ip_address: &str) -> Result<Option<BlockedIp>> {
        let key = self.block_key(ip_address);
        match self.redis.get(&key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_block_active(&self, ip_address: &str, active: bool) -> Result<()> {
        // Read-modify-write; block rows are flag flips toward a fixed target
        // state, so the last writer wins harmlessly
        let key = self.block_key(ip_address);
        if let Some(json) = self.redis.get(&key).await? {
            let mut block: BlockedIp = serde_json::from_str(&json)?;
            if block.active != active {
                block.active = active;
                block.updated_at = Utc::now();
                self.redis.set(&key, &serde_json::to_string(&block)?).await?;
            }
        }
        Ok(())
    }

    async fn list_blocks(&self, active_only: bool) -> Result<Vec<BlockedIp>> {
        let pattern = format!("{}:ipblock:*", self.config.key_prefix);
        let keys = self.redis.keys(&pattern).await?;

        let mut blocks = Vec::new();
        for key in keys {
            if let Some(json) = self.redis.get(&key).await? {
                if let Ok(block) = serde_json::from_str::<BlockedIp>(&json) {
                    if !active_only || block.active {
                        blocks.push(block);
                    }
                }
            }
        }
        Ok(blocks)
    }
}

#[async_trait]
impl SecurityEventStore for RedisSecurityStore {
    async fn record_event(&self, event: SecurityEvent) -> Result<()> {
        let key = self.event_key(&event.ip_address);
        let score = Self::epoch(event.created_at);
        let json = serde_json::to_string(&event)?;

        self.redis.zadd(&key, score, &json).await?;
        let cutoff = Self::epoch(Utc::now()) - self.config.window_retention_secs as f64;
        self.redis.zrembyscore(&key, 0.0, cutoff).await?;
        self.redis.expire(&key, self.config.window_retention_secs).await?;
        Ok(())
    }

    async fn count_events(
        &self,
        ip_address: &str,
        event_type: SecurityEventType,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let events = self.events_since(ip_address, since).await?;
        Ok(events.iter().filter(|e| e.event_type == event_type).count() as u64)
    }

    async fn recent_events(&self, ip_address: &str, since: DateTime<Utc>) -> Result<Vec<SecurityEvent>> {
        self.events_since(ip_address, since).await
    }
}

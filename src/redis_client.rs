use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};

use crate::error::{EngineError, Result};

/// Redis client wrapper for the shared-state store backends
///
/// Production deployments should pass an authenticated URL
/// (redis://:password@host:port); both plain and rediss:// are accepted.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Create a new Redis client from a connection URL
    pub async fn new(redis_url: &str) -> Result<Self> {
        if !redis_url.contains("://") {
            return Err(EngineError::Config(
                "invalid Redis URL, expected redis://:password@host:port".to_string(),
            ));
        }

        if !redis_url.contains('@') {
            tracing::warn!("Redis URL does not include a password; use one in production");
        }

        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }

    /// Set a key-value pair with no expiration
    pub async fn set(&self, key: &str, value: &str) -> std::result::Result<(), RedisError> {
        let mut conn = self.manager.clone();
        conn.set(key, value).await
    }

    /// Get a value by key
    pub async fn get(&self, key: &str) -> std::result::Result<Option<String>, RedisError> {
        let mut conn = self.manager.clone();
        conn.get(key).await
    }

    /// Delete a key
    pub async fn del(&self, key: &str) -> std::result::Result<(), RedisError> {
        let mut conn = self.manager.clone();
        conn.del(key).await
    }

    /// Add an element to a sorted set with a score (for sliding windows)
    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> std::result::Result<(), RedisError> {
        let mut conn = self.manager.clone();
        conn.zadd(key, member, score).await
    }

    /// Remove elements from a sorted set by score range
    pub async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> std::result::Result<i64, RedisError> {
        let mut conn = self.manager.clone();
        conn.zrembyscore(key, min, max).await
    }

    /// Count elements in a sorted set within a score range
    pub async fn zcount(&self, key: &str, min: f64, max: f64) -> std::result::Result<i64, RedisError> {
        let mut conn = self.manager.clone();
        conn.zcount(key, min, max).await
    }

    /// Get a range from a sorted set with scores
    pub async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> std::result::Result<Vec<(String, f64)>, RedisError> {
        let mut conn = self.manager.clone();
        redis::cmd("ZRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
    }

    /// Set expiration on a key
    pub async fn expire(&self, key: &str, seconds: i64) -> std::result::Result<bool, RedisError> {
        let mut conn = self.manager.clone();
        conn.expire(key, seconds).await
    }

    /// Get all keys matching a pattern
    pub async fn keys(&self, pattern: &str) -> std::result::Result<Vec<String>, RedisError> {
        let mut conn = self.manager.clone();
        redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await
    }

    /// Ping Redis to check if the connection is alive
    pub async fn ping(&self) -> std::result::Result<bool, RedisError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|resp| resp == "PONG")
    }
}

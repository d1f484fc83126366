use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::config::{keys, SecurityConfig};
use crate::error::Result;
use crate::store::RateLimitStore;

/// How a rate-limit decision was reached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Under the limit; the hit was recorded
    Allowed,
    /// At or over the limit; nothing was recorded
    Denied,
    /// The store failed and the request was let through unverified.
    /// Deliberate availability-over-strictness tradeoff; never conflate
    /// with a genuine Allowed when reading logs or metrics.
    FailOpen,
}

/// Result of one rate-limit check
#[derive(Clone, Debug)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub outcome: RateLimitOutcome,
    /// Requests left in the window after this one
    pub remaining: u64,
    /// When the current window stops constraining the caller
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window rate limiter keyed by (identifier, action)
///
/// Limits and window sizes come from SecurityConfig at decision time:
/// `rate_limit.<action>.limit` / `rate_limit.<action>.window_secs`, falling
/// back to the global defaults.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: Arc<SecurityConfig>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: Arc<SecurityConfig>) -> Self {
        Self { store, config }
    }

    /// Check a request, reading the limit and window for `action` from config
    pub async fn check(&self, identifier: &str, action: &str) -> RateLimitDecision {
        let default_limit = self.config.get_u64(keys::RATE_LIMIT_DEFAULT_LIMIT, 60);
        let default_window = self.config.get_u64(keys::RATE_LIMIT_DEFAULT_WINDOW_SECS, 60);

        let limit = self
            .config
            .get_u64(&format!("rate_limit.{action}.limit"), default_limit);
        let window_secs = self
            .config
            .get_u64(&format!("rate_limit.{action}.window_secs"), default_window);

        self.check_with(identifier, action, limit, window_secs).await
    }

    /// Check a request with an explicit limit and window
    pub async fn check_with(
        &self,
        identifier: &str,
        action: &str,
        limit: u64,
        window_secs: u64,
    ) -> RateLimitDecision {
        self.check_at(identifier, action, limit, window_secs, Utc::now()).await
    }

    /// Check a request against the window ending at `now`
    pub async fn check_at(
        &self,
        identifier: &str,
        action: &str,
        limit: u64,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        match self.evaluate(identifier, action, limit, window_secs, now).await {
            Ok(decision) => {
                match decision.outcome {
                    RateLimitOutcome::Denied => {
                        metrics::counter!("rate_limit_denied_total", 1);
                        tracing::debug!(identifier, action, "rate limit denied");
                    }
                    _ => metrics::counter!("rate_limit_allowed_total", 1),
                }
                decision
            }
            Err(err) => {
                // Fail open: a storage outage must not take posting down
                // with it. The outcome stays distinguishable from Allowed.
                metrics::counter!("rate_limit_fail_open_total", 1);
                tracing::warn!(
                    identifier,
                    action,
                    error = %err,
                    "rate limit store unavailable, failing open"
                );
                RateLimitDecision {
                    allowed: true,
                    outcome: RateLimitOutcome::FailOpen,
                    remaining: 0,
                    reset_at: now,
                }
            }
        }
    }

    async fn evaluate(
        &self,
        identifier: &str,
        action: &str,
        limit: u64,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let window_start = now - Duration::seconds(window_secs as i64);
        let count = self.store.count_hits(identifier, action, window_start, now).await?;

        if count >= limit {
            return Ok(RateLimitDecision {
                allowed: false,
                outcome: RateLimitOutcome::Denied,
                remaining: 0,
                reset_at: now + Duration::seconds(window_secs as i64),
            });
        }

        // Denied requests are never recorded; only consumed quota counts
        self.store.record_hit(identifier, action, now).await?;

        Ok(RateLimitDecision {
            allowed: true,
            outcome: RateLimitOutcome::Allowed,
            remaining: limit - count - 1,
            reset_at: now + Duration::seconds(window_secs as i64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), Arc::new(SecurityConfig::new()))
    }

    #[tokio::test]
    async fn test_window_allows_then_denies() {
        let limiter = limiter();
        let now = Utc::now();

        for i in 0..5 {
            let decision = limiter.check_at("u1", "post", 5, 60, now).await;
            assert!(decision.allowed, "call {i} should be allowed");
            assert_eq!(decision.outcome, RateLimitOutcome::Allowed);
            assert_eq!(decision.remaining, 4 - i);
        }

        let sixth = limiter.check_at("u1", "post", 5, 60, now).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.outcome, RateLimitOutcome::Denied);
        assert_eq!(sixth.remaining, 0);
    }

    #[tokio::test]
    async fn test_window_elapses() {
        let limiter = limiter();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(limiter.check_at("u1", "post", 5, 60, now).await.allowed);
        }
        assert!(!limiter.check_at("u1", "post", 5, 60, now).await.allowed);

        // All five hits slide out of the window
        let later = now + Duration::seconds(61);
        let decision = limiter.check_at("u1", "post", 5, 60, later).await;
        assert!(decision.allowed);
        assert_eq!(decision.outcome, RateLimitOutcome::Allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(limiter.check_at("u1", "post", 5, 60, now).await.allowed);
        }
        assert!(!limiter.check_at("u1", "post", 5, 60, now).await.allowed);

        // Different identifier and different action both start fresh
        assert!(limiter.check_at("u2", "post", 5, 60, now).await.allowed);
        assert!(limiter.check_at("u1", "comment", 5, 60, now).await.allowed);
    }

    #[tokio::test]
    async fn test_denied_requests_are_not_recorded() {
        let limiter = limiter();
        let now = Utc::now();

        assert!(limiter.check_at("u1", "post", 1, 60, now).await.allowed);
        for _ in 0..10 {
            assert!(!limiter.check_at("u1", "post", 1, 60, now).await.allowed);
        }

        // Only the single allowed hit occupies the window, so it frees up
        // exactly one window after it was recorded
        let later = now + Duration::seconds(61);
        assert!(limiter.check_at("u1", "post", 1, 60, later).await.allowed);
    }

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn count_hits(
            &self,
            _identifier: &str,
            _action: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<u64> {
            Err(EngineError::Store("connection refused".to_string()))
        }

        async fn record_hit(&self, _identifier: &str, _action: &str, _at: DateTime<Utc>) -> Result<()> {
            Err(EngineError::Store("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore), Arc::new(SecurityConfig::new()));

        let decision = limiter.check("u1", "post").await;
        assert!(decision.allowed);
        assert_eq!(decision.outcome, RateLimitOutcome::FailOpen);
    }

    #[tokio::test]
    async fn test_per_action_config_override() {
        use crate::config::ConfigValue;

        let mut config = SecurityConfig::new();
        config.set("rate_limit.post.limit", ConfigValue::Int(2), "rate_limit", "");
        config.set("rate_limit.post.window_secs", ConfigValue::Int(60), "rate_limit", "");

        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), Arc::new(config));
        assert!(limiter.check("u1", "post").await.allowed);
        assert!(limiter.check("u1", "post").await.allowed);
        assert!(!limiter.check("u1", "post").await.allowed);
    }
}

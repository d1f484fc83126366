//! Content moderation and security threat decision engine
//!
//! A library consumed by request-handling code: it scores user content,
//! routes violations into a prioritized review queue, drives the per-user
//! status state machine, classifies security events into threats with
//! automatic IP mitigation, throttles abusive traffic and resolves appeals
//! that reverse prior actions.
//!
//! Persistence and notifications are collaborators behind the traits in
//! [`store`] and [`notify`]; [`store::MemoryStore`] is the in-process
//! reference implementation and [`store::RedisSecurityStore`] backs the
//! shared hot paths for multi-instance deployments.

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod moderation;
pub mod notify;
pub mod redis_client;
pub mod security;
pub mod store;

pub use analytics::{AnalyticsAggregator, ModerationStats, SecurityHealth, SecurityOverview};
pub use config::{ConfigEntry, ConfigValue, SecurityConfig};
pub use engine::{ModerationEngine, ModerationOutcome};
pub use error::{EngineError, Result};
pub use moderation::{
    AppealDecision, AppealWorkflow, ModerationQueueManager, ReportManager, UserStatusMachine,
};
pub use notify::{LogDispatcher, Notification, NotificationDispatcher, NotificationKind};
pub use redis_client::RedisClient;
pub use security::{
    CustomFilter, FilterAction, FilterResult, IpBlockRegistry, PatternClassifier,
    RateLimitDecision, RateLimitOutcome, RateLimiter, ThreatDetector, UserBehaviorSnapshot,
};
pub use store::MemoryStore;

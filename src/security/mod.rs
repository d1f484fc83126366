pub mod classifier;
pub mod ip_registry;
pub mod rate_limiter;
pub mod threat_detector;

pub use classifier::{
    ClassifierThresholds, CustomFilter, FilterAction, FilterResult, PatternClassifier,
    UserBehaviorSnapshot,
};
pub use ip_registry::IpBlockRegistry;
pub use rate_limiter::{RateLimitDecision, RateLimitOutcome, RateLimiter};
pub use threat_detector::ThreatDetector;

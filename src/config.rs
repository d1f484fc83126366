use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known configuration keys
///
/// Every numeric threshold the engine consults lives here rather than being
/// hard-coded at the call site. Components read these at decision time, so a
/// config loaded from the backing store can tune the engine without a
/// redeploy.
pub mod keys {
    /// Score above which content is blocked outright
    pub const CLASSIFIER_BLOCK_SCORE: &str = "classifier.block_score";
    /// Score above which content is flagged for review
    pub const CLASSIFIER_FLAG_SCORE: &str = "classifier.flag_score";
    /// Link count above which the link penalty applies
    pub const CLASSIFIER_MAX_LINKS: &str = "classifier.max_links";
    /// Uppercase ratio above which the caps penalty applies
    pub const CLASSIFIER_CAPS_RATIO: &str = "classifier.caps_ratio";
    /// Word repetition ratio above which repetition scores as a family
    pub const CLASSIFIER_REPETITION_RATIO: &str = "classifier.repetition_ratio";
    /// Image count above which a post is flagged
    pub const CLASSIFIER_MAX_IMAGES: &str = "classifier.max_images";

    /// Posts per minute above which behavior is flagged
    pub const BEHAVIOR_MAX_POSTS_PER_MINUTE: &str = "behavior.max_posts_per_minute";
    /// Repeated content ratio above which behavior is flagged
    pub const BEHAVIOR_REPETITION_RATIO: &str = "behavior.repetition_ratio";
    /// Precomputed spam score above which the user is hard-blocked
    pub const BEHAVIOR_SPAM_SCORE: &str = "behavior.spam_score";

    /// Score above which a queue entry is created even without reasons
    pub const QUEUE_REVIEW_SCORE: &str = "queue.review_score";
    /// Score above which an entry is queued as urgent
    pub const QUEUE_URGENT_SCORE: &str = "queue.urgent_score";
    /// Score above which an entry is queued as high priority
    pub const QUEUE_HIGH_SCORE: &str = "queue.high_score";
    /// Score above which an entry is queued as medium priority
    pub const QUEUE_MEDIUM_SCORE: &str = "queue.medium_score";

    /// Failed logins from one IP before a brute-force threat fires
    pub const THREAT_FAILED_LOGIN_LIMIT: &str = "threat.failed_login_limit";
    /// Trailing window for counting failed logins, in seconds
    pub const THREAT_FAILED_LOGIN_WINDOW_SECS: &str = "threat.failed_login_window_secs";

    /// Default requests allowed per window when no per-action limit is set
    pub const RATE_LIMIT_DEFAULT_LIMIT: &str = "rate_limit.default_limit";
    /// Default window size in seconds
    pub const RATE_LIMIT_DEFAULT_WINDOW_SECS: &str = "rate_limit.default_window_secs";

    /// Security score at or above which the system reports healthy
    pub const ANALYTICS_HEALTHY_SCORE: &str = "analytics.healthy_score";
    /// Security score at or above which the system reports degraded
    pub const ANALYTICS_DEGRADED_SCORE: &str = "analytics.degraded_score";
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// One configuration entry: key, typed value, category, description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: ConfigValue,
    pub category: String,
    pub description: String,
}

/// Flat key/value configuration map consulted by the engine at decision time
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    entries: HashMap<String, ConfigEntry>,
}

impl SecurityConfig {
    /// Create a config pre-populated with the engine defaults
    pub fn new() -> Self {
        let mut config = Self {
            entries: HashMap::new(),
        };

        config.set_default(keys::CLASSIFIER_BLOCK_SCORE, ConfigValue::Float(0.7), "classifier");
        config.set_default(keys::CLASSIFIER_FLAG_SCORE, ConfigValue::Float(0.4), "classifier");
        config.set_default(keys::CLASSIFIER_MAX_LINKS, ConfigValue::Int(3), "classifier");
        config.set_default(keys::CLASSIFIER_CAPS_RATIO, ConfigValue::Float(0.7), "classifier");
        config.set_default(keys::CLASSIFIER_REPETITION_RATIO, ConfigValue::Float(0.5), "classifier");
        config.set_default(keys::CLASSIFIER_MAX_IMAGES, ConfigValue::Int(10), "classifier");

        config.set_default(keys::BEHAVIOR_MAX_POSTS_PER_MINUTE, ConfigValue::Float(5.0), "behavior");
        config.set_default(keys::BEHAVIOR_REPETITION_RATIO, ConfigValue::Float(0.8), "behavior");
        config.set_default(keys::BEHAVIOR_SPAM_SCORE, ConfigValue::Float(0.7), "behavior");

        config.set_default(keys::QUEUE_REVIEW_SCORE, ConfigValue::Float(0.7), "queue");
        config.set_default(keys::QUEUE_URGENT_SCORE, ConfigValue::Float(0.8), "queue");
        config.set_default(keys::QUEUE_HIGH_SCORE, ConfigValue::Float(0.6), "queue");
        config.set_default(keys::QUEUE_MEDIUM_SCORE, ConfigValue::Float(0.4), "queue");

        config.set_default(keys::THREAT_FAILED_LOGIN_LIMIT, ConfigValue::Int(5), "threat");
        config.set_default(keys::THREAT_FAILED_LOGIN_WINDOW_SECS, ConfigValue::Int(900), "threat");

        config.set_default(keys::RATE_LIMIT_DEFAULT_LIMIT, ConfigValue::Int(60), "rate_limit");
        config.set_default(keys::RATE_LIMIT_DEFAULT_WINDOW_SECS, ConfigValue::Int(60), "rate_limit");

        config.set_default(keys::ANALYTICS_HEALTHY_SCORE, ConfigValue::Int(80), "analytics");
        config.set_default(keys::ANALYTICS_DEGRADED_SCORE, ConfigValue::Int(60), "analytics");

        config
    }

    fn set_default(&mut self, key: &str, value: ConfigValue, category: &str) {
        self.entries.insert(
            key.to_string(),
            ConfigEntry {
                key: key.to_string(),
                value,
                category: category.to_string(),
                description: String::new(),
            },
        );
    }

    /// Insert or replace an entry
    pub fn set(&mut self, key: &str, value: ConfigValue, category: &str, description: &str) {
        self.entries.insert(
            key.to_string(),
            ConfigEntry {
                key: key.to_string(),
                value,
                category: category.to_string(),
                description: description.to_string(),
            },
        );
    }

    /// Get the raw entry for a key
    pub fn entry(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.get(key)
    }

    /// Get a float value, falling back to `default` when missing or mistyped
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.entries.get(key).map(|e| &e.value) {
            Some(ConfigValue::Float(v)) => *v,
            Some(ConfigValue::Int(v)) => *v as f64,
            _ => default,
        }
    }

    /// Get an integer value, falling back to `default` when missing or mistyped
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.entries.get(key).map(|e| &e.value) {
            Some(ConfigValue::Int(v)) => *v,
            _ => default,
        }
    }

    /// Get an unsigned value, clamping negatives to zero
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get_i64(key, default as i64).max(0) as u64
    }

    /// Get a boolean value, falling back to `default` when missing or mistyped
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key).map(|e| &e.value) {
            Some(ConfigValue::Bool(v)) => *v,
            _ => default,
        }
    }

    /// All entries in a category
    pub fn category(&self, category: &str) -> Vec<&ConfigEntry> {
        self.entries
            .values()
            .filter(|e| e.category == category)
            .collect()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::new()
    }
}

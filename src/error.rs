use thiserror::Error;

/// Result type alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Typed error surface for the decision engine
///
/// Persistence failures are never swallowed: queue, action and status
/// transition writes propagate a variant the caller can match on and retry.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Storage backend errors
    #[error("storage error: {0}")]
    Store(String),

    /// Redis errors
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity lookup failures
    #[error("not found: {0}")]
    NotFound(String),

    /// Conditional write lost to a concurrent writer and retries ran out
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Requested state transition is not legal from the current state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A compensating action (e.g. the unblock that follows an approved
    /// appeal) could not be completed after exhausting retries
    #[error("compensation failed: {0}")]
    CompensationFailed(String),
}

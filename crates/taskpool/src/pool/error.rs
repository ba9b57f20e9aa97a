//! Pool errors

use std::time::Duration;

/// Task pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Construction-time configuration rejected
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Call argument rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a started pool
    #[error("task pool is not running")]
    NotRunning,

    /// Pool already started
    #[error("task pool is already running")]
    AlreadyRunning,

    /// Pool is draining after shutdown
    #[error("task pool is closing")]
    Closing,

    /// Pool has shut down
    #[error("task pool is closed")]
    Closed,

    /// The queue stayed full until the submission deadline
    #[error("task submission timed out after {0:?}")]
    SubmitTimeout(Duration),

    /// The caller's token or the pool interrupt signal is already cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl PoolError {
    /// Check if retrying the same call later may succeed
    ///
    /// Only submission timeouts are transient; every other error reflects a
    /// lifecycle or argument problem that a retry cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SubmitTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_submit_timeout_is_retryable() {
        assert!(PoolError::SubmitTimeout(Duration::from_millis(5)).is_retryable());
        assert!(!PoolError::Closed.is_retryable());
        assert!(!PoolError::Closing.is_retryable());
        assert!(!PoolError::NotRunning.is_retryable());
        assert!(!PoolError::InvalidConfig("x".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(PoolError::Closed.to_string(), "task pool is closed");
        assert_eq!(
            PoolError::InvalidConfig("init_workers must be greater than 0".into()).to_string(),
            "invalid pool configuration: init_workers must be greater than 0"
        );
    }
}

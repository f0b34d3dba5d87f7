//! Error types for scuttle.
//!
//! Cancellation itself never fails: registering, unregistering and cancelling
//! an unknown id are no-ops. The errors here only come from constructing the
//! pieces a subscription runs on.

use thiserror::Error;

/// Errors raised while setting up registries and schedulers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScuttleError {
    /// A tokio-backed scheduler was requested outside of a tokio runtime.
    #[error("no tokio runtime is available on the current thread")]
    NoRuntime,

    /// The registry shard amount was rejected.
    #[error("shard amount must be a power of two greater than one, got {0}")]
    InvalidShardAmount(usize),
}

/// Result alias used throughout scuttle.
pub type Result<T> = std::result::Result<T, ScuttleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_cause() {
        assert_eq!(
            ScuttleError::NoRuntime.to_string(),
            "no tokio runtime is available on the current thread"
        );
        assert_eq!(
            ScuttleError::InvalidShardAmount(3).to_string(),
            "shard amount must be a power of two greater than one, got 3"
        );
    }
}

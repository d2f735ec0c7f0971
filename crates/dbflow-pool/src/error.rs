//! Pool error types.
//!
//! Runtime errors carry stable string tags (see [`PoolError::code`]) so that
//! adapters built on top of the pool can match on error kinds without
//! depending on this crate's enum layout.

use std::time::Duration;

use thiserror::Error;

/// Boxed error type used at the boundary between the pool and the
/// backend-specific resource factory.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors detected while validating pool configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A release timeout was configured but the resource manager does not
    /// take over closing responsibility when it fires.
    #[error("release_timeout is set but the resource manager does not handle release timeouts")]
    ReleaseTimeoutHandlerRequired,
}

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening a new backend resource did not complete within the configured
    /// open timeout. The late resource, if it ever materializes, is closed
    /// in the background instead of joining the pool.
    #[error("opening a connection timed out after {elapsed:?}")]
    OpenTimeout {
        /// How long the acquirer waited before giving up.
        elapsed: Duration,
    },

    /// The caller waited in the acquisition queue longer than the configured
    /// queue timeout.
    #[error("timed out after {elapsed:?} waiting for a connection")]
    QueueTimeout {
        /// How long the acquirer waited before giving up.
        elapsed: Duration,
    },

    /// A connection handle was returned to the pool twice.
    #[error("connection was already released back to the pool")]
    DoubleRelease,

    /// The pool is draining; no new acquisitions are served.
    #[error("pool is draining")]
    Draining,

    /// Opening a new backend resource failed.
    #[error("failed to open a connection")]
    Open(#[source] BoxDynError),

    /// A lifecycle hook (`on_active` / `on_idle`) failed; the resource it ran
    /// against has been destroyed.
    #[error("connection lifecycle hook failed")]
    Hook(#[source] BoxDynError),
}

impl PoolError {
    /// Stable string tag identifying this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OpenTimeout { .. } => "CONNECTION_POOL:OPEN_TIMEOUT",
            Self::QueueTimeout { .. } => "CONNECTION_POOL:QUEUE_TIMEOUT",
            Self::DoubleRelease => "CONNECTION_POOL:DOUBLE_RELEASE",
            Self::Draining => "CONNECTION_POOL:DRAINING",
            Self::Open(_) => "CONNECTION_POOL:OPEN_FAILED",
            Self::Hook(_) => "CONNECTION_POOL:HOOK_FAILED",
        }
    }

    /// Whether the caller may reasonably retry the acquisition later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OpenTimeout { .. } | Self::QueueTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let timeout = PoolError::OpenTimeout {
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(timeout.code(), "CONNECTION_POOL:OPEN_TIMEOUT");

        let queued = PoolError::QueueTimeout {
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(queued.code(), "CONNECTION_POOL:QUEUE_TIMEOUT");

        assert_eq!(PoolError::DoubleRelease.code(), "CONNECTION_POOL:DOUBLE_RELEASE");
        assert_eq!(PoolError::Draining.code(), "CONNECTION_POOL:DRAINING");
    }

    #[test]
    fn timeouts_are_retryable() {
        let timeout = PoolError::OpenTimeout {
            elapsed: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(!PoolError::DoubleRelease.is_retryable());
        assert!(!PoolError::Draining.is_retryable());
    }
}

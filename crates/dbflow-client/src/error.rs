//! Client error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error type used at the boundary between the orchestration layer
/// and a backend driver.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by connection and transaction handles.
#[derive(Debug, Error)]
pub enum Error {
    /// A driver operation failed.
    #[error("driver operation failed")]
    Driver(#[source] BoxDynError),

    /// A post-commit step failed. The transaction itself has already
    /// durably committed; remaining steps were skipped.
    #[error("post-commit step failed after the transaction committed")]
    PostCommit(#[source] BoxDynError),

    /// An application-level failure raised inside a transaction or task
    /// body.
    #[error(transparent)]
    Other(BoxDynError),

    /// The handle was disposed; no further operations are served.
    #[error("handle was already disposed")]
    Disposed,

    /// The operation lock could not be acquired in time.
    #[error("timed out after {elapsed:?} acquiring the operation lock")]
    LockTimeout {
        /// How long the caller waited for the lock.
        elapsed: Duration,
    },
}

impl From<BoxDynError> for Error {
    fn from(error: BoxDynError) -> Self {
        Self::Other(error)
    }
}

impl Error {
    /// Convenience constructor for application-level failures.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<BoxDynError>,
    {
        Self::Other(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_wraps_messages() {
        let error = Error::other("borked");
        assert!(matches!(error, Error::Other(_)));
        assert_eq!(error.to_string(), "borked");
    }
}

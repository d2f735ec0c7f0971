//! Pool configuration.
//!
//! Every numeric limit follows the same convention: a zero value means
//! "unlimited". Normalization happens through the `*_limit` accessors, which
//! return `None` for unlimited settings, so the pool itself never has to
//! special-case zero.

use std::time::Duration;

/// Default bound on opening a single backend resource.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on closing a single backend resource.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a [`Pool`](crate::Pool).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use dbflow_pool::PoolConfig;
///
/// let config = PoolConfig::new()
///     .max_size(10)
///     .max_uses(500)
///     .idle_timeout(Duration::from_secs(300))
///     .queue_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.size_limit(), Some(10));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live connections (idle + handed out). Zero means
    /// unlimited.
    pub max_size: usize,

    /// Maximum number of activations per connection before it is closed
    /// instead of recycled. Zero means unlimited.
    pub max_uses: u64,

    /// How long a connection may sit idle before it is closed. Zero means
    /// forever.
    pub idle_timeout: Duration,

    /// How long a caller may hold a connection before the release-timeout
    /// handler takes it away. Zero disables the timer.
    pub release_timeout: Duration,

    /// How long an acquirer waits in the queue for a connection. Zero means
    /// forever.
    pub queue_timeout: Duration,

    /// Bound on opening one backend resource. Zero means unbounded.
    pub open_timeout: Duration,

    /// Bound on closing one backend resource. Zero means unbounded.
    pub close_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 0,
            max_uses: 0,
            idle_timeout: Duration::ZERO,
            release_timeout: Duration::ZERO,
            queue_timeout: Duration::ZERO,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live connections.
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the maximum number of activations per connection.
    #[must_use]
    pub fn max_uses(mut self, max_uses: u64) -> Self {
        self.max_uses = max_uses;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the release timeout.
    #[must_use]
    pub fn release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Set the queue timeout.
    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Set the open timeout.
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the close timeout.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Normalized capacity bound, `None` when unlimited.
    #[must_use]
    pub fn size_limit(&self) -> Option<usize> {
        (self.max_size > 0).then_some(self.max_size)
    }

    /// Normalized per-connection use bound, `None` when unlimited.
    #[must_use]
    pub fn use_limit(&self) -> Option<u64> {
        (self.max_uses > 0).then_some(self.max_uses)
    }

    /// Normalized idle timeout, `None` when idle connections live forever.
    #[must_use]
    pub fn idle_limit(&self) -> Option<Duration> {
        normalize(self.idle_timeout)
    }

    /// Normalized release timeout, `None` when disabled.
    #[must_use]
    pub fn release_limit(&self) -> Option<Duration> {
        normalize(self.release_timeout)
    }

    /// Normalized queue timeout, `None` when acquirers wait forever.
    #[must_use]
    pub fn queue_limit(&self) -> Option<Duration> {
        normalize(self.queue_timeout)
    }

    /// Normalized open timeout, `None` when unbounded.
    #[must_use]
    pub fn open_limit(&self) -> Option<Duration> {
        normalize(self.open_timeout)
    }

    /// Normalized close timeout, `None` when unbounded.
    #[must_use]
    pub fn close_limit(&self) -> Option<Duration> {
        normalize(self.close_timeout)
    }
}

fn normalize(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

//! Single-flight serialization for connection and transaction handles.
//!
//! A pooled backend connection cannot tolerate two logical call sites
//! interleaving statements on it. [`SerializationLock`] guarantees at most
//! one operation sequence is in flight per handle; acquirers are served in
//! FIFO order, so two tasks racing on one handle observe a stable ordering.
//!
//! The lock knows nothing about drivers or statements; the per-connection
//! and per-transaction handles reuse it identically.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Why a lock acquisition failed.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not released within the given timeout.
    #[error("timed out after {elapsed:?} waiting for the lock")]
    Timeout {
        /// The timeout that elapsed.
        elapsed: Duration,
    },

    /// The lock has been drained and permanently closed.
    #[error("lock is closed")]
    Closed,
}

/// A timeout-aware FIFO mutex.
///
/// Built on a single-permit [`Semaphore`], which queues acquirers fairly.
#[derive(Debug, Clone)]
pub struct SerializationLock {
    semaphore: Arc<Semaphore>,
}

impl SerializationLock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait until the lock is free, bounded by `timeout` when given.
    ///
    /// The returned guard releases the lock on drop, waking the next queued
    /// acquirer.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<LockGuard, LockError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| LockError::Timeout { elapsed: timeout })?,
            None => acquire.await,
        };
        let permit = permit.map_err(|_| LockError::Closed)?;
        Ok(LockGuard { _permit: permit })
    }

    /// Wait for the current holder and every acquirer queued ahead of this
    /// call to finish, then close the lock permanently.
    ///
    /// Later `acquire` calls fail immediately with [`LockError::Closed`].
    /// Idempotent.
    pub async fn drain(&self) {
        // Queueing for the permit puts this call behind everyone already
        // admitted; an Err means another drain got there first.
        if let Ok(permit) = self.semaphore.acquire().await {
            self.semaphore.close();
            drop(permit);
        }
    }

    /// Whether the lock has been drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for SerializationLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the handle guarded by a [`SerializationLock`].
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive() {
        let lock = SerializationLock::new();
        let guard = lock.acquire(None).await.expect("first acquire");

        let second = lock.acquire(Some(Duration::from_millis(10))).await;
        assert!(matches!(second, Err(LockError::Timeout { .. })));

        drop(guard);
        let third = lock.acquire(Some(Duration::from_millis(10))).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn acquirers_are_served_in_fifo_order() {
        let lock = SerializationLock::new();
        let order = Arc::new(AtomicUsize::new(0));
        let guard = lock.acquire(None).await.expect("initial acquire");

        let mut tasks = Vec::new();
        for expected in 0..4usize {
            let lock = lock.clone();
            let order = Arc::clone(&order);
            // Acquire inside the task; yield below makes arrival order match
            // spawn order.
            tasks.push(tokio::spawn(async move {
                let _guard = lock.acquire(None).await.expect("queued acquire");
                assert_eq!(order.fetch_add(1, Ordering::SeqCst), expected);
            }));
            tokio::task::yield_now().await;
        }

        drop(guard);
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(order.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn drain_waits_for_holder_then_closes() {
        let lock = SerializationLock::new();
        let guard = lock.acquire(None).await.expect("acquire");

        let drainer = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.drain().await })
        };
        tokio::task::yield_now().await;
        assert!(!lock.is_closed());

        drop(guard);
        drainer.await.expect("drain");
        assert!(lock.is_closed());

        let after = lock.acquire(None).await;
        assert!(matches!(after, Err(LockError::Closed)));
    }

    #[tokio::test]
    async fn drain_is_idempotent() {
        let lock = SerializationLock::new();
        lock.drain().await;
        lock.drain().await;
        assert!(lock.is_closed());
    }
}

//! Internal lifecycle bookkeeping for pooled resources.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::PoolError;

/// Tracks one physical resource through its pool lifecycle.
///
/// A record's lifecycle state is positional: an idle record lives on the
/// pool's idle list, an active record lives inside the lease slot of the
/// handle that owns it, and a destroyed record simply no longer exists.
pub(crate) struct Record<R> {
    /// Stable identity within one pool, used by timer tasks to find their
    /// record without holding a reference into the pool's containers.
    pub(crate) id: u64,

    pub(crate) resource: Arc<R>,

    /// Incremented on every activation, including waiter hand-offs. Doubles
    /// as a generation counter so a stale idle timer cannot reap a record
    /// that was reused in the meantime.
    pub(crate) activation_count: u64,

    /// Set while active when the owner decided the resource must be closed
    /// on release instead of recycled.
    pub(crate) should_destroy: bool,

    /// Timer reaping this record if it idles too long. Armed when the record
    /// enters the idle list, aborted on activation and destruction.
    pub(crate) idle_timer: Option<JoinHandle<()>>,
}

impl<R> Record<R> {
    pub(crate) fn new(id: u64, resource: Arc<R>) -> Self {
        Self {
            id,
            resource,
            activation_count: 0,
            should_destroy: false,
            idle_timer: None,
        }
    }

    pub(crate) fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

impl<R> Drop for Record<R> {
    fn drop(&mut self) {
        self.cancel_idle_timer();
    }
}

/// One pending acquisition that could not be served immediately.
///
/// The waiting side owns the receiver half and applies its own queue
/// timeout. A timed-out waiter is not removed from the queue; it is detected
/// lazily when `tx.send` fails on dequeue, which hands the record back for
/// the next candidate.
pub(crate) struct Waiter<R> {
    pub(crate) tx: oneshot::Sender<Result<Record<R>, PoolError>>,
    #[allow(dead_code)] // Diagnostic value, read when tracing queue pressure
    pub(crate) enqueued_at: Instant,
}

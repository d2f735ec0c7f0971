//! Connection pool implementation.
//!
//! The pool coordinates when a backend resource is opened, handed out,
//! recycled, or closed. It knows nothing about the resources themselves;
//! everything backend-specific goes through the
//! [`ResourceManager`](crate::ResourceManager) it was built with.
//!
//! Capacity allocation is FIFO-fair: a resource freed by `release` or
//! `dispose` is offered to the oldest live waiter before it can reach the
//! idle list, so a waiting caller is never starved by one that arrived
//! later. Idle reuse itself is LIFO (most recently released first).

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::{ConfigError, PoolError};
use crate::manager::ResourceManager;
use crate::record::{Record, Waiter};

/// A capacity-bounded pool of backend resources.
///
/// The pool hands out [`PooledConnection`] handles. Each handle must be
/// returned with [`release`](PooledConnection::release) (recycle) or
/// [`dispose`](PooledConnection::dispose) (close); dropping a handle without
/// doing either releases it in the background and logs a warning.
///
/// # Example
///
/// ```rust,ignore
/// use dbflow_pool::{Pool, PoolConfig};
///
/// let pool = Pool::new(manager, PoolConfig::new().max_size(10))?;
///
/// let conn = pool.acquire().await?;
/// // use conn.resource() ...
/// conn.release().await?;
///
/// pool.drain().await;
/// ```
pub struct Pool<M: ResourceManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ResourceManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<M: ResourceManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Resource>>,
    metrics: Mutex<MetricsInner>,
    /// Flips to `true` once draining has started and the live count reached
    /// zero. Every `drain` caller observes the same completion.
    drained: watch::Sender<bool>,
}

struct PoolState<R> {
    /// Records not currently in use, most recently released last.
    idle: Vec<Record<R>>,

    /// Pending acquisitions in arrival order. Entries whose receiver has
    /// timed out are skipped lazily on dequeue.
    waiters: VecDeque<Waiter<R>>,

    /// Total records currently open, idle and handed out combined.
    live: usize,

    draining: bool,

    next_record_id: u64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    connections_opened: u64,
    connections_closed: u64,
    waiter_hand_offs: u64,
    open_timeouts: u64,
    queue_timeouts: u64,
    release_timeouts: u64,
}

/// What an acquisition decided to do while the bookkeeping lock was held.
enum Plan<R> {
    Reuse(Record<R>),
    Open,
    Wait(oneshot::Receiver<Result<Record<R>, PoolError>>),
}

impl<M: ResourceManager> Pool<M> {
    /// Create a pool over the given resource manager.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError::ReleaseTimeoutHandlerRequired`] when
    /// `config` sets a release timeout but `manager` does not take over
    /// closing responsibility for timed-out resources.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, ConfigError> {
        if config.release_limit().is_some() && !manager.handles_release_timeout() {
            return Err(ConfigError::ReleaseTimeoutHandlerRequired);
        }

        let (drained, _) = watch::channel(false);
        let inner = Arc::new(PoolInner {
            manager,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                waiters: VecDeque::new(),
                live: 0,
                draining: false,
                next_record_id: 0,
            }),
            metrics: Mutex::new(MetricsInner::default()),
            drained,
            config,
        });

        tracing::info!(
            max_size = inner.config.max_size,
            max_uses = inner.config.max_uses,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Acquire a connection, waiting for capacity if the pool is full.
    ///
    /// Reuses the most recently released idle resource when one exists,
    /// opens a new resource when the pool is below capacity, and otherwise
    /// queues behind earlier acquirers. Queueing and opening are each
    /// bounded by their configured timeouts.
    pub async fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        let inner = &self.inner;
        let plan = {
            let mut state = inner.state.lock();
            if state.draining {
                return Err(PoolError::Draining);
            }
            if let Some(record) = state.idle.pop() {
                Plan::Reuse(record)
            } else if inner.config.size_limit().is_none_or(|max| state.live < max) {
                // Reserve the capacity slot before the open happens so
                // concurrent acquirers cannot overshoot max_size.
                state.live += 1;
                Plan::Open
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter {
                    tx,
                    enqueued_at: Instant::now(),
                });
                Plan::Wait(rx)
            }
        };

        match plan {
            Plan::Reuse(record) => inner.activate(record).await,
            Plan::Open => {
                let record = inner.open_record().await?;
                inner.activate(record).await
            }
            Plan::Wait(rx) => inner.wait_for_record(rx).await,
        }
    }

    /// Stop serving acquisitions, close idle resources, and wait until every
    /// outstanding connection has been returned and closed.
    ///
    /// Queued waiters are failed with [`PoolError::Draining`]. Connections
    /// currently handed out are not forcibly closed; they drain naturally as
    /// their owners release or dispose them. Idempotent: concurrent callers
    /// all observe the same completion.
    pub async fn drain(&self) {
        let inner = &self.inner;
        let (idle, waiters) = {
            let mut state = inner.state.lock();
            state.draining = true;
            (mem::take(&mut state.idle), mem::take(&mut state.waiters))
        };

        for waiter in waiters {
            let _ = waiter.tx.send(Err(PoolError::Draining));
        }
        for record in idle {
            inner.destroy(record).await;
        }

        if inner.state.lock().live == 0 {
            // send_replace stores the value even with no subscriber yet.
            inner.drained.send_replace(true);
        }

        let mut rx = inner.drained.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("connection pool drained");
    }

    /// Total connections currently open, idle and handed out combined.
    #[must_use]
    pub fn connections_count(&self) -> usize {
        self.inner.state.lock().live
    }

    /// Connections currently sitting on the idle list.
    #[must_use]
    pub fn idle_connections_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Queued acquisitions, including entries whose caller has already timed
    /// out but has not yet been skipped on dequeue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Whether draining has started.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    /// Snapshot of the pool's current occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            live: state.live,
            idle: state.idle.len(),
            waiting: state.waiters.len(),
            max_size: self.inner.config.size_limit(),
        }
    }

    /// Cumulative pool counters.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let metrics = self.inner.metrics.lock();
        PoolMetrics {
            connections_opened: metrics.connections_opened,
            connections_closed: metrics.connections_closed,
            waiter_hand_offs: metrics.waiter_hand_offs,
            open_timeouts: metrics.open_timeouts,
            queue_timeouts: metrics.queue_timeouts,
            release_timeouts: metrics.release_timeouts,
        }
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The resource manager this pool was built with.
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }
}

impl<M: ResourceManager> PoolInner<M> {
    /// Turn a record into a live handle: bump the activation count, run the
    /// `on_active` hook, and arm the release timer.
    async fn activate(
        self: &Arc<Self>,
        mut record: Record<M::Resource>,
    ) -> Result<PooledConnection<M>, PoolError> {
        record.cancel_idle_timer();
        record.activation_count += 1;

        if let Err(error) = self.manager.on_active(&record.resource).await {
            tracing::warn!(
                record_id = record.id,
                error = %error,
                "on_active hook failed; destroying connection"
            );
            self.destroy(record).await;
            self.offer_capacity();
            return Err(PoolError::Hook(error));
        }

        let resource = Arc::clone(&record.resource);
        let record_id = record.id;
        let slot = Arc::new(Mutex::new(LeaseState::Held(record)));

        let release_timer = self.config.release_limit().map(|timeout| {
            let pool = Arc::downgrade(self);
            let slot = Arc::clone(&slot);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(pool) = pool.upgrade() {
                    pool.release_timeout_fired(&slot, record_id).await;
                }
            })
        });

        Ok(PooledConnection {
            pool: Arc::clone(self),
            slot,
            resource,
            release_timer,
        })
    }

    /// Open a new resource for an already-reserved capacity slot.
    ///
    /// The open runs on its own task: a timed-out open is not cancelled, and
    /// a reaper closes the late resource instead of letting it join the
    /// pool. The reserved slot is given back on every failure path.
    async fn open_record(self: &Arc<Self>) -> Result<Record<M::Resource>, PoolError> {
        let mut opener = {
            let pool = Arc::clone(self);
            tokio::spawn(async move { pool.manager.open().await })
        };
        let started = Instant::now();

        let joined = match self.config.open_limit() {
            Some(timeout) => match tokio::time::timeout(timeout, &mut opener).await {
                Ok(joined) => joined,
                Err(_) => {
                    let pool = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Ok(Ok(resource)) = opener.await {
                            tracing::warn!("closing connection that opened after the open timeout");
                            pool.close_resource(&resource).await;
                        }
                    });
                    self.retire_one();
                    self.metrics.lock().open_timeouts += 1;
                    return Err(PoolError::OpenTimeout {
                        elapsed: started.elapsed(),
                    });
                }
            },
            None => opener.await,
        };

        let resource = match joined {
            Ok(Ok(resource)) => resource,
            Ok(Err(error)) => {
                self.retire_one();
                return Err(PoolError::Open(error));
            }
            Err(join_error) => {
                self.retire_one();
                return Err(PoolError::Open(Box::new(join_error)));
            }
        };

        // Draining may have started while the open was in flight; the new
        // resource must not join the pool.
        let id = {
            let mut state = self.state.lock();
            if state.draining {
                None
            } else {
                state.next_record_id += 1;
                Some(state.next_record_id)
            }
        };
        let resource = Arc::new(resource);
        let Some(id) = id else {
            self.close_resource(&resource).await;
            self.retire_one();
            return Err(PoolError::Draining);
        };

        self.metrics.lock().connections_opened += 1;
        tracing::debug!(record_id = id, "opened new connection");
        Ok(Record::new(id, resource))
    }

    /// Wait on the acquisition queue, bounded by the queue timeout.
    async fn wait_for_record(
        self: &Arc<Self>,
        mut rx: oneshot::Receiver<Result<Record<M::Resource>, PoolError>>,
    ) -> Result<PooledConnection<M>, PoolError> {
        let started = Instant::now();
        let outcome = match self.config.queue_limit() {
            Some(timeout) => tokio::time::timeout(timeout, &mut rx).await,
            None => Ok((&mut rx).await),
        };

        match outcome {
            Ok(Ok(Ok(record))) => self.activate(record).await,
            Ok(Ok(Err(error))) => Err(error),
            // The sender half is only dropped when the pool tears down.
            Ok(Err(_)) => Err(PoolError::Draining),
            Err(_) => {
                // Shut the channel first so a record cannot land after we
                // looked; one delivered just before that goes back to the
                // pool instead of leaking.
                rx.close();
                if let Ok(Ok(record)) = rx.try_recv() {
                    self.route_idle(record).await;
                }
                self.metrics.lock().queue_timeouts += 1;
                Err(PoolError::QueueTimeout {
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// Return a record to service after its holder released it.
    async fn release_record(
        self: &Arc<Self>,
        record: Record<M::Resource>,
    ) -> Result<(), PoolError> {
        if self.state.lock().draining {
            self.destroy(record).await;
            return Ok(());
        }

        let exhausted = self
            .config
            .use_limit()
            .is_some_and(|max| record.activation_count >= max);
        if record.should_destroy || exhausted {
            tracing::debug!(
                record_id = record.id,
                activation_count = record.activation_count,
                "closing connection instead of recycling"
            );
            self.destroy(record).await;
            self.offer_capacity();
            return Ok(());
        }

        if let Err(error) = self.manager.on_idle(&record.resource).await {
            tracing::warn!(
                record_id = record.id,
                error = %error,
                "on_idle hook failed; destroying connection"
            );
            self.destroy(record).await;
            self.offer_capacity();
            return Err(PoolError::Hook(error));
        }

        self.route_idle(record).await;
        Ok(())
    }

    /// Hand a free record to the oldest live waiter, or park it on the idle
    /// list when nobody is waiting.
    async fn route_idle(self: &Arc<Self>, record: Record<M::Resource>) {
        enum Routed<R> {
            Served,
            Parked,
            Drain(Record<R>),
        }

        let routed = {
            let mut state = self.state.lock();
            if state.draining {
                Routed::Drain(record)
            } else {
                let mut record = record;
                loop {
                    match state.waiters.pop_front() {
                        Some(waiter) => match waiter.tx.send(Ok(record)) {
                            Ok(()) => break Routed::Served,
                            // Stale waiter: its receiver timed out. Take the
                            // record back and try the next one.
                            Err(Ok(returned)) => record = returned,
                            Err(Err(_)) => break Routed::Served,
                        },
                        None => {
                            record.idle_timer =
                                self.spawn_idle_timer(record.id, record.activation_count);
                            state.idle.push(record);
                            break Routed::Parked;
                        }
                    }
                }
            }
        };

        match routed {
            Routed::Served => self.metrics.lock().waiter_hand_offs += 1,
            Routed::Parked => {}
            Routed::Drain(record) => self.destroy(record).await,
        }
    }

    /// If a waiter is queued and capacity allows, open a fresh resource on
    /// their behalf. Called whenever a capacity slot is freed.
    fn offer_capacity(self: &Arc<Self>) {
        let should_open = {
            let mut state = self.state.lock();
            if state.draining || state.waiters.is_empty() {
                false
            } else if self.config.size_limit().is_none_or(|max| state.live < max) {
                state.live += 1;
                true
            } else {
                false
            }
        };

        if should_open {
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                match pool.open_record().await {
                    Ok(record) => pool.route_idle(record).await,
                    Err(error) => pool.fail_oldest_waiter(error),
                }
            });
        }
    }

    /// Settle the oldest live waiter with an error.
    fn fail_oldest_waiter(&self, error: PoolError) {
        let mut error = error;
        loop {
            let waiter = self.state.lock().waiters.pop_front();
            match waiter {
                Some(waiter) => match waiter.tx.send(Err(error)) {
                    Ok(()) => return,
                    Err(Err(returned)) => error = returned,
                    Err(Ok(_)) => return,
                },
                None => {
                    tracing::debug!("open failure had no live waiter to deliver to");
                    return;
                }
            }
        }
    }

    /// Close a record's resource and give its capacity slot back.
    async fn destroy(&self, mut record: Record<M::Resource>) {
        record.cancel_idle_timer();
        self.close_resource(&record.resource).await;
        drop(record);
        self.retire_one();
        self.metrics.lock().connections_closed += 1;
    }

    /// Close a resource, bounded by the close timeout. Close failures are
    /// logged and swallowed: closing happens on paths with no caller left to
    /// receive an error, and must never block capacity recovery.
    async fn close_resource(&self, resource: &M::Resource) {
        let close = self.manager.close(resource);
        let outcome = match self.config.close_limit() {
            Some(timeout) => tokio::time::timeout(timeout, close).await,
            None => Ok(close.await),
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::error!(error = %error, "failed to close connection"),
            Err(_) => tracing::error!("closing a connection timed out"),
        }
    }

    /// Drop one unit of live count and complete the drain if it was the
    /// last.
    fn retire_one(&self) {
        let (live, draining) = {
            let mut state = self.state.lock();
            state.live = state.live.saturating_sub(1);
            (state.live, state.draining)
        };
        if draining && live == 0 {
            self.drained.send_replace(true);
        }
    }

    /// Arm a timer that reaps this record if it is still idle (same
    /// activation generation) when the idle timeout elapses.
    fn spawn_idle_timer(
        self: &Arc<Self>,
        record_id: u64,
        activation_count: u64,
    ) -> Option<JoinHandle<()>> {
        let timeout = self.config.idle_limit()?;
        let pool = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(pool) = pool.upgrade() else { return };
            let record = {
                let mut state = pool.state.lock();
                state
                    .idle
                    .iter()
                    .position(|record| {
                        record.id == record_id && record.activation_count == activation_count
                    })
                    .map(|index| state.idle.remove(index))
            };
            if let Some(mut record) = record {
                // This task is the record's own timer; detach the handle so
                // destroying the record does not abort the task mid-close.
                record.idle_timer.take();
                tracing::debug!(record_id, "closing connection after idle timeout");
                pool.destroy(record).await;
            }
        }))
    }

    /// The release timer fired: take the resource away from its holder and
    /// hand closing responsibility to the manager.
    async fn release_timeout_fired(
        self: &Arc<Self>,
        slot: &Mutex<LeaseState<M::Resource>>,
        record_id: u64,
    ) {
        let record = {
            let mut slot = slot.lock();
            match mem::replace(&mut *slot, LeaseState::TimedOut) {
                LeaseState::Held(record) => record,
                settled => {
                    *slot = settled;
                    return;
                }
            }
        };

        tracing::warn!(
            record_id,
            "connection held past the release timeout; invoking handler"
        );
        self.manager.on_release_timeout(&record.resource).await;
        drop(record);
        self.retire_one();
        {
            let mut metrics = self.metrics.lock();
            metrics.release_timeouts += 1;
            metrics.connections_closed += 1;
        }
        self.offer_capacity();
    }
}

/// Who the resource inside a lease currently belongs to.
enum LeaseState<R> {
    /// The handle still owns the record.
    Held(Record<R>),
    /// The handle returned the record to the pool.
    Released,
    /// The release timer took the record away; later release/dispose calls
    /// from the original holder are silent no-ops.
    TimedOut,
}

enum SettleMode {
    Release,
    Dispose,
}

/// An active connection checked out of a [`Pool`].
///
/// Return it with [`release`](Self::release) to recycle the resource or
/// [`dispose`](Self::dispose) to close it. Which one to call after a query
/// error is the owner's decision, typically guided by the backend driver's
/// judgement on whether the connection is still salvageable.
#[must_use]
pub struct PooledConnection<M: ResourceManager> {
    pool: Arc<PoolInner<M>>,
    slot: Arc<Mutex<LeaseState<M::Resource>>>,
    resource: Arc<M::Resource>,
    release_timer: Option<JoinHandle<()>>,
}

impl<M: ResourceManager> std::fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl<M: ResourceManager> PooledConnection<M> {
    /// The backend resource this handle wraps.
    #[must_use]
    pub fn resource(&self) -> &M::Resource {
        &self.resource
    }

    /// Mark the resource to be closed instead of recycled when this handle
    /// is released.
    pub fn discard_on_release(&self) {
        if let LeaseState::Held(record) = &mut *self.slot.lock() {
            record.should_destroy = true;
        }
    }

    /// Return the resource to the pool for reuse.
    ///
    /// The resource is handed to the oldest queued waiter when one exists,
    /// closed when the pool is draining or the use limit is exhausted, and
    /// parked on the idle list otherwise. A no-op when the release timer
    /// already took the resource away.
    pub async fn release(mut self) -> Result<(), PoolError> {
        self.settle(SettleMode::Release).await
    }

    /// Close the resource and free its capacity slot.
    ///
    /// Close errors are logged, never returned. The freed capacity is
    /// immediately offered to the oldest queued waiter. A no-op when the
    /// release timer already took the resource away.
    pub async fn dispose(mut self) -> Result<(), PoolError> {
        self.settle(SettleMode::Dispose).await
    }

    async fn settle(&mut self, mode: SettleMode) -> Result<(), PoolError> {
        if let Some(timer) = self.release_timer.take() {
            timer.abort();
        }

        let record = {
            let mut slot = self.slot.lock();
            match mem::replace(&mut *slot, LeaseState::Released) {
                LeaseState::Held(record) => record,
                LeaseState::TimedOut => {
                    *slot = LeaseState::TimedOut;
                    return Ok(());
                }
                LeaseState::Released => return Err(PoolError::DoubleRelease),
            }
        };

        match mode {
            SettleMode::Release => self.pool.release_record(record).await,
            SettleMode::Dispose => {
                self.pool.destroy(record).await;
                self.pool.offer_capacity();
                Ok(())
            }
        }
    }
}

impl<M: ResourceManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(timer) = self.release_timer.take() {
            timer.abort();
        }
        let record = {
            let mut slot = self.slot.lock();
            match mem::replace(&mut *slot, LeaseState::Released) {
                LeaseState::Held(record) => record,
                settled => {
                    *slot = settled;
                    return;
                }
            }
        };

        tracing::warn!(
            record_id = record.id,
            "connection handle dropped without release; releasing in background"
        );
        let pool = Arc::clone(&self.pool);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = pool.release_record(record).await;
                });
            }
            Err(_) => tracing::error!(
                record_id = record.id,
                "connection handle dropped outside a runtime; resource leaked"
            ),
        }
    }
}

/// Point-in-time occupancy of a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Total open connections, idle and handed out combined.
    pub live: usize,
    /// Connections on the idle list.
    pub idle: usize,
    /// Queued acquisitions (including not-yet-skipped stale entries).
    pub waiting: usize,
    /// Capacity bound, `None` when unlimited.
    pub max_size: Option<usize>,
}

impl PoolStatus {
    /// Whether no further connection can be opened.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.max_size.is_some_and(|max| self.live >= max)
    }

    /// Fraction of capacity currently open, 0.0 for unbounded pools.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        match self.max_size {
            Some(max) if max > 0 => self.live as f64 / max as f64,
            _ => 0.0,
        }
    }
}

/// Cumulative counters collected by a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolMetrics {
    /// Connections opened since pool creation.
    pub connections_opened: u64,
    /// Connections closed since pool creation, including those handed to the
    /// release-timeout handler.
    pub connections_closed: u64,
    /// Free connections handed directly to a queued waiter.
    pub waiter_hand_offs: u64,
    /// Acquisitions that failed on the open timeout.
    pub open_timeouts: u64,
    /// Acquisitions that failed on the queue timeout.
    pub queue_timeouts: u64,
    /// Connections taken away from their holder by the release timer.
    pub release_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::BoxDynError;

    struct CountingManager {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl CountingManager {
        fn new() -> Self {
            Self {
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResourceManager for CountingManager {
        type Resource = usize;

        async fn open(&self) -> Result<usize, BoxDynError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        async fn close(&self, _resource: &usize) -> Result<(), BoxDynError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn recycles_released_connection() {
        let pool = Pool::new(CountingManager::new(), PoolConfig::new().max_size(3))
            .expect("valid config");

        let first = pool.acquire().await.expect("acquire");
        let first_id = *first.resource();
        first.release().await.expect("release");
        assert_eq!(pool.idle_connections_count(), 1);

        let second = pool.acquire().await.expect("acquire");
        assert_eq!(*second.resource(), first_id);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 1);
        second.release().await.expect("release");
    }

    #[tokio::test]
    async fn dispose_closes_instead_of_recycling() {
        let pool =
            Pool::new(CountingManager::new(), PoolConfig::new().max_size(1)).expect("valid config");

        let conn = pool.acquire().await.expect("acquire");
        conn.dispose().await.expect("dispose");

        assert_eq!(pool.connections_count(), 0);
        assert_eq!(pool.manager().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discard_on_release_closes() {
        let pool =
            Pool::new(CountingManager::new(), PoolConfig::new().max_size(2)).expect("valid config");

        let conn = pool.acquire().await.expect("acquire");
        conn.discard_on_release();
        conn.release().await.expect("release");

        assert_eq!(pool.idle_connections_count(), 0);
        assert_eq!(pool.manager().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn draining_pool_rejects_acquires() {
        let pool =
            Pool::new(CountingManager::new(), PoolConfig::new().max_size(1)).expect("valid config");

        pool.drain().await;
        let error = pool.acquire().await.expect_err("must fail fast");
        assert_eq!(error.code(), "CONNECTION_POOL:DRAINING");
    }
}

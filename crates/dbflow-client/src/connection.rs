//! Per-connection handle and the top-level transaction loop.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::driver::{Driver, TransactionOptions};
use crate::error::Error;
use crate::lock::{LockError, LockGuard, SerializationLock};
use crate::stream::QueryStream;
use crate::transaction::Transaction;

/// State shared between a connection handle and the transaction handles
/// spawned from it.
pub(crate) struct ConnectionShared<D: Driver> {
    pub(crate) driver: D,
    pub(crate) lock: SerializationLock,
    pub(crate) disposed: AtomicBool,
    pub(crate) lock_timeout: Option<Duration>,
    /// Source of unique savepoint names across nested transactions.
    pub(crate) savepoint_seq: AtomicU64,
}

impl<D: Driver> ConnectionShared<D> {
    pub(crate) async fn guard(&self) -> Result<LockGuard, Error> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        let guard = self
            .lock
            .acquire(self.lock_timeout)
            .await
            .map_err(|error| match error {
                LockError::Timeout { elapsed } => Error::LockTimeout { elapsed },
                LockError::Closed => Error::Disposed,
            })?;
        // Dispose may have won the race for the lock.
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        Ok(guard)
    }
}

/// A handle to one backend connection.
///
/// Every entry point serializes against the others through one
/// [`SerializationLock`]: at most one query, task, or transaction sequence
/// is in flight against the underlying connection at a time, and queued
/// callers are served in FIFO order.
///
/// # Example
///
/// ```rust,ignore
/// use dbflow_client::{Connection, TransactionOptions};
///
/// let conn = Connection::new(driver);
///
/// let results = conn.query(&[statement]).await?;
///
/// let total = conn
///     .tx(TransactionOptions::new(), |tx| async move {
///         tx.query(&[insert]).await?;
///         tx.query(&[count]).await
///     })
///     .await?;
///
/// conn.dispose().await;
/// ```
pub struct Connection<D: Driver> {
    inner: Arc<ConnectionShared<D>>,
}

impl<D: Driver> Clone for Connection<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> Connection<D> {
    /// Wrap a driver bound to one physical connection.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::with_lock_timeout(driver, None)
    }

    /// Wrap a driver, bounding every lock acquisition by `lock_timeout`.
    #[must_use]
    pub fn with_lock_timeout(driver: D, lock_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(ConnectionShared {
                driver,
                lock: SerializationLock::new(),
                disposed: AtomicBool::new(false),
                lock_timeout,
                savepoint_seq: AtomicU64::new(0),
            }),
        }
    }

    /// The underlying driver.
    ///
    /// Calls made directly on the driver bypass serialization; use the
    /// handle's entry points for statement execution.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    /// Execute a batch of statements, returning the last result set.
    pub async fn query(&self, statements: &[D::Statement]) -> Result<D::Results, Error> {
        let _guard = self.inner.guard().await?;
        self.inner
            .driver
            .execute_last(statements)
            .await
            .map_err(Error::Driver)
    }

    /// Execute a batch of statements, returning every result set.
    pub async fn query_all(&self, statements: &[D::Statement]) -> Result<Vec<D::Results>, Error> {
        let _guard = self.inner.guard().await?;
        self.inner
            .driver
            .execute_all(statements)
            .await
            .map_err(Error::Driver)
    }

    /// Execute one statement, streaming its rows.
    ///
    /// The returned stream holds the serialization lock until it is dropped,
    /// so no other caller can interleave statements while rows are still
    /// being produced.
    pub async fn query_stream(&self, statement: D::Statement) -> Result<QueryStream<D>, Error> {
        let guard = self.inner.guard().await?;
        let stream = self
            .inner
            .driver
            .execute_stream(statement)
            .await
            .map_err(Error::Driver)?;
        Ok(QueryStream::new(stream, guard))
    }

    /// Run `body` with exclusive access to the driver, outside any
    /// transaction.
    pub async fn task<'a, T, F>(&'a self, body: F) -> Result<T, Error>
    where
        F: for<'b> FnOnce(&'b D) -> BoxFuture<'b, Result<T, Error>> + 'a,
    {
        let _guard = self.inner.guard().await?;
        body(&self.inner.driver).await
    }

    /// Run `body` inside a transaction, retrying whole failed attempts when
    /// the driver says so.
    ///
    /// Each attempt gets a fresh [`Transaction`] handle; `body` must
    /// therefore be re-invocable. On success the transaction commits and the
    /// attempt's post-commit steps run in registration order; on failure the
    /// transaction rolls back, the driver's
    /// [`should_retry_transaction_failure`](Driver::should_retry_transaction_failure)
    /// is consulted with the running failure count, and the error propagates
    /// once it declines.
    pub async fn tx<T, F, Fut>(&self, options: TransactionOptions, body: F) -> Result<T, Error>
    where
        F: Fn(Transaction<D>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let _guard = self.inner.guard().await?;
        let driver = &self.inner.driver;
        let mut failure_count: u32 = 0;

        loop {
            driver
                .begin_transaction(&options)
                .await
                .map_err(Error::Driver)?;
            let tx = Transaction::root(Arc::clone(&self.inner));

            let attempt = async {
                let value = body(tx.clone()).await?;
                tx.dispose().await;
                driver.commit_transaction().await.map_err(Error::Driver)?;
                Ok(value)
            }
            .await;

            match attempt {
                Ok(value) => {
                    for step in tx.take_post_commit_steps() {
                        step().await.map_err(Error::PostCommit)?;
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tx.dispose().await;
                    if let Err(rollback_error) = driver.rollback_transaction().await {
                        tracing::error!(
                            error = %rollback_error,
                            "failed to roll back transaction"
                        );
                    }
                    failure_count += 1;
                    if driver.should_retry_transaction_failure(&options, &error, failure_count) {
                        tracing::debug!(failure_count, "retrying failed transaction");
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Mark the handle disposed and wait for in-flight operations to finish.
    ///
    /// Queued and future operations fail with [`Error::Disposed`].
    /// Idempotent.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.lock.drain().await;
    }

    /// Whether this handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

//! Per-transaction handle with savepoint-based nesting.

use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::connection::ConnectionShared;
use crate::driver::Driver;
use crate::error::{BoxDynError, Error};
use crate::lock::{LockGuard, SerializationLock};
use crate::stream::QueryStream;

/// A deferred side effect, run only after the enclosing top-level
/// transaction has physically committed.
pub type PostCommitStep = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxDynError>> + Send>;

struct TransactionShared<D: Driver> {
    connection: Arc<ConnectionShared<D>>,
    /// Serializes operations issued through this handle, independently of
    /// the connection-level lock already held for the transaction's
    /// duration.
    lock: SerializationLock,
    disposed: AtomicBool,
    post_commit: Mutex<Vec<PostCommitStep>>,
}

/// A handle bound to one open transaction (or savepoint scope).
///
/// Clones share the same underlying transaction; the handle is disposed by
/// the orchestration loop when its attempt ends, after which every entry
/// point fails with [`Error::Disposed`].
pub struct Transaction<D: Driver> {
    inner: Arc<TransactionShared<D>>,
}

impl<D: Driver> Clone for Transaction<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> Transaction<D> {
    /// A handle for a fresh top-level transaction attempt.
    pub(crate) fn root(connection: Arc<ConnectionShared<D>>) -> Self {
        Self {
            inner: Arc::new(TransactionShared {
                connection,
                lock: SerializationLock::new(),
                disposed: AtomicBool::new(false),
                post_commit: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A child handle scoped to one savepoint.
    fn child(&self) -> Self {
        Self::root(Arc::clone(&self.inner.connection))
    }

    async fn guard(&self) -> Result<LockGuard, Error> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        let guard = self
            .inner
            .lock
            .acquire(self.inner.connection.lock_timeout)
            .await
            .map_err(|error| match error {
                crate::lock::LockError::Timeout { elapsed } => Error::LockTimeout { elapsed },
                crate::lock::LockError::Closed => Error::Disposed,
            })?;
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        Ok(guard)
    }

    /// Execute a batch of statements inside the transaction, returning the
    /// last result set.
    pub async fn query(&self, statements: &[D::Statement]) -> Result<D::Results, Error> {
        let _guard = self.guard().await?;
        self.inner
            .connection
            .driver
            .execute_last(statements)
            .await
            .map_err(Error::Driver)
    }

    /// Execute a batch of statements inside the transaction, returning every
    /// result set.
    pub async fn query_all(&self, statements: &[D::Statement]) -> Result<Vec<D::Results>, Error> {
        let _guard = self.guard().await?;
        self.inner
            .connection
            .driver
            .execute_all(statements)
            .await
            .map_err(Error::Driver)
    }

    /// Execute one statement inside the transaction, streaming its rows.
    ///
    /// The stream holds this handle's serialization lock until dropped.
    pub async fn query_stream(&self, statement: D::Statement) -> Result<QueryStream<D>, Error> {
        let guard = self.guard().await?;
        let stream = self
            .inner
            .connection
            .driver
            .execute_stream(statement)
            .await
            .map_err(Error::Driver)?;
        Ok(QueryStream::new(stream, guard))
    }

    /// Run `body` with exclusive access to the driver inside the
    /// transaction.
    pub async fn task<'a, T, F>(&'a self, body: F) -> Result<T, Error>
    where
        F: for<'b> FnOnce(&'b D) -> BoxFuture<'b, Result<T, Error>> + 'a,
    {
        let _guard = self.guard().await?;
        body(&self.inner.connection.driver).await
    }

    /// Run `body` in a nested sub-transaction backed by a savepoint.
    ///
    /// On success the savepoint is released and the child's post-commit
    /// steps are promoted into this handle; on failure the transaction rolls
    /// back to the savepoint and the child's steps are discarded, while this
    /// transaction remains open and usable. Nested transactions are never
    /// retried; retry happens only at the top level, where no outer
    /// uncommitted state can be invalidated by replaying.
    pub async fn tx<T, F, Fut>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce(Transaction<D>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let _guard = self.guard().await?;
        let driver = &self.inner.connection.driver;

        let seq = self
            .inner
            .connection
            .savepoint_seq
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        let name = format!("dbflow_sp_{seq}");

        driver.create_savepoint(&name).await.map_err(Error::Driver)?;
        let child = self.child();

        let attempt = body(child.clone()).await;
        child.dispose().await;

        match attempt {
            Ok(value) => {
                driver
                    .release_savepoint(&name)
                    .await
                    .map_err(Error::Driver)?;
                self.append_post_commit_steps(child.take_post_commit_steps());
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = driver.rollback_to_savepoint(&name).await {
                    tracing::error!(
                        savepoint = %name,
                        error = %rollback_error,
                        "failed to roll back to savepoint"
                    );
                }
                Err(error)
            }
        }
    }

    /// Register a side effect to run only after the enclosing top-level
    /// transaction has durably committed.
    ///
    /// Steps registered on a handle whose attempt rolls back never run.
    pub fn add_post_commit_step<F, Fut>(&self, step: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxDynError>> + Send + 'static,
    {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        self.inner
            .post_commit
            .lock()
            .push(Box::new(move || Box::pin(step())));
        Ok(())
    }

    pub(crate) fn take_post_commit_steps(&self) -> Vec<PostCommitStep> {
        mem::take(&mut *self.inner.post_commit.lock())
    }

    fn append_post_commit_steps(&self, steps: Vec<PostCommitStep>) {
        self.inner.post_commit.lock().extend(steps);
    }

    /// Mark the handle disposed and wait for in-flight operations to finish.
    /// Idempotent; called by the orchestration loop at the end of every
    /// attempt.
    pub(crate) async fn dispose(&self) {
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

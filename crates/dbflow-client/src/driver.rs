//! The pluggable backend contract.
//!
//! One [`Driver`] implementation exists per backend, outside this crate. The
//! orchestration layer depends on this trait only: it decides *when* to
//! begin, commit, roll back, or retry, and the driver decides *how* those
//! operations reach the wire.

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::{BoxDynError, Error};

/// Transaction isolation level.
///
/// Mapping each level to backend syntax is the driver's job; backends that
/// do not support a level should fail `begin_transaction` rather than
/// silently downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,
    /// Read committed.
    #[default]
    ReadCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable (highest isolation).
    Serializable,
    /// Snapshot isolation.
    Snapshot,
}

/// Options applied to a top-level transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Requested isolation level; `None` leaves the backend default.
    pub isolation_level: Option<IsolationLevel>,

    /// Whether the transaction is declared read-only.
    pub read_only: bool,

    /// Advisory upper bound on retry attempts, consulted by the driver's
    /// [`should_retry_transaction_failure`](Driver::should_retry_transaction_failure).
    pub retry_limit: Option<u32>,
}

impl TransactionOptions {
    /// Create options with backend defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Declare the transaction read-only.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the advisory retry limit.
    #[must_use]
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }
}

/// Backend operations required by the orchestration layer.
///
/// Every operation may fail; failures must never leave partial state
/// invisible to the caller. A `Driver` instance is bound to one physical
/// connection and its operations are never invoked concurrently: the
/// handles wrapping it hold a
/// [`SerializationLock`](crate::SerializationLock) across every call.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// One executable statement, opaque to this layer.
    type Statement: Send + Sync;

    /// The result of executing a batch of statements.
    type Results: Send;

    /// Incremental row stream produced by
    /// [`execute_stream`](Self::execute_stream).
    type RowStream: Stream + Send + Unpin;

    /// Begin a transaction.
    async fn begin_transaction(&self, options: &TransactionOptions) -> Result<(), BoxDynError>;

    /// Commit the open transaction.
    async fn commit_transaction(&self) -> Result<(), BoxDynError>;

    /// Roll back the open transaction.
    async fn rollback_transaction(&self) -> Result<(), BoxDynError>;

    /// Create a named savepoint inside the open transaction.
    async fn create_savepoint(&self, name: &str) -> Result<(), BoxDynError>;

    /// Release (forget) a named savepoint.
    async fn release_savepoint(&self, name: &str) -> Result<(), BoxDynError>;

    /// Roll back to a named savepoint, keeping the transaction open.
    async fn rollback_to_savepoint(&self, name: &str) -> Result<(), BoxDynError>;

    /// Execute a batch of statements, returning every intermediate result
    /// set.
    async fn execute_all(
        &self,
        statements: &[Self::Statement],
    ) -> Result<Vec<Self::Results>, BoxDynError>;

    /// Execute a batch of statements, returning only the last result set.
    async fn execute_last(
        &self,
        statements: &[Self::Statement],
    ) -> Result<Self::Results, BoxDynError>;

    /// Execute one statement, streaming its rows.
    async fn execute_stream(
        &self,
        statement: Self::Statement,
    ) -> Result<Self::RowStream, BoxDynError>;

    /// Whether a whole-transaction failure should be retried, given how many
    /// attempts have already failed.
    fn should_retry_transaction_failure(
        &self,
        options: &TransactionOptions,
        error: &Error,
        failure_count: u32,
    ) -> bool;

    /// Whether a connection that produced `error` is still salvageable and
    /// may return to the pool, or must be closed.
    fn can_recycle_connection_after_error(&self, error: &Error) -> bool;
}

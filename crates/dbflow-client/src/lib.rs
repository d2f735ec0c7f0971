//! # dbflow-client
//!
//! Pluggable driver contract and transaction orchestration.
//!
//! This crate owns the *when* of transactional work against one backend
//! connection: serializing concurrent callers, running the
//! begin/body/commit-or-rollback retry loop, nesting sub-transactions on
//! savepoints, and deferring side effects until after a durable commit.
//! The *how* lives in per-backend [`Driver`] implementations outside this
//! crate.
//!
//! ## Features
//!
//! - **Single-flight handles**: at most one operation sequence in flight
//!   per connection or transaction, FIFO-fair
//! - **Whole-transaction retries**: driven by the driver's own judgement of
//!   what is worth retrying
//! - **Savepoint nesting**: a failed sub-transaction rolls back to its
//!   savepoint while the outer transaction stays open
//! - **Post-commit steps**: side effects that only fire for durably
//!   committed work
//! - **Lock-holding row streams**: serialization covers streamed results
//!   end to end
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbflow_client::{Connection, TransactionOptions};
//!
//! let conn = Connection::new(driver);
//!
//! let value = conn
//!     .tx(TransactionOptions::new(), |tx| async move {
//!         tx.query(&[insert_order]).await?;
//!         tx.tx(|inner| async move {
//!             // Rolls back to a savepoint on failure; the outer
//!             // transaction continues either way.
//!             inner.query(&[optional_audit_row]).await
//!         })
//!         .await
//!         .ok();
//!         tx.query(&[select_total]).await
//!     })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod driver;
pub mod error;
pub mod lock;
pub mod stream;
pub mod transaction;

// Handles
pub use connection::Connection;
pub use transaction::{PostCommitStep, Transaction};

// Backend contract
pub use driver::{Driver, IsolationLevel, TransactionOptions};

// Error types
pub use error::{BoxDynError, Error};

// Serialization primitive
pub use lock::{LockError, LockGuard, SerializationLock};

// Streams
pub use stream::QueryStream;

//! # dbflow-pool
//!
//! Backend-agnostic async connection pool with FIFO-fair waiters and
//! explicit lifecycle timeouts.
//!
//! The pool coordinates *when* an expensive, stateful resource is opened,
//! handed out, recycled, or closed; it contains no protocol code itself.
//! Backend adapters plug in through the [`ResourceManager`] trait.
//!
//! ## Features
//!
//! - Capacity-bounded acquisition with a FIFO waiter queue
//! - Direct hand-off of freed resources to the oldest queued waiter
//! - Idle, open, close, queue, and release timeouts, each independently
//!   "zero means unlimited"
//! - Per-resource use limits (`max_uses`) and error-driven disposal
//! - Graceful draining that completes once all connections are returned
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbflow_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .max_size(10)
//!     .idle_timeout(Duration::from_secs(300))
//!     .queue_timeout(Duration::from_secs(30));
//!
//! let pool = Pool::new(manager, config)?;
//!
//! let conn = pool.acquire().await?;
//! do_work(conn.resource()).await?;
//! conn.release().await?;
//!
//! pool.drain().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod manager;
pub mod pool;

mod record;

// Configuration
pub use config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_OPEN_TIMEOUT, PoolConfig};

// Error types
pub use error::{BoxDynError, ConfigError, PoolError};

// Backend boundary
pub use manager::ResourceManager;

// Pool types
pub use pool::{Pool, PoolMetrics, PoolStatus, PooledConnection};

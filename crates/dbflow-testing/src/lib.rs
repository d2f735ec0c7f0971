//! # dbflow-testing
//!
//! Test infrastructure for dbflow development.
//!
//! Provides two scriptable fakes: [`TestManager`], an in-memory
//! [`ResourceManager`] whose opens, closes, and hooks can be delayed or made
//! to fail on demand, and [`RecordingDriver`], a [`Driver`] that records
//! every call it receives so tests can assert on exact operation order.
//!
//! The workspace's cross-crate scenario tests live in this crate's `tests/`
//! directory.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dbflow_client::{Driver, Error, TransactionOptions};
use dbflow_pool::{BoxDynError, ResourceManager};

/// An in-memory stand-in for a backend connection.
#[derive(Debug)]
pub struct TestResource {
    /// Sequential identity assigned at open time.
    pub id: usize,
}

#[derive(Default)]
struct ManagerState {
    next_id: usize,
    opened: usize,
    closed: Vec<usize>,
    release_timed_out: Vec<usize>,
    open_delay: Option<Duration>,
    open_failures: usize,
    fail_on_active: bool,
    fail_on_idle: bool,
    handles_release_timeout: bool,
}

/// A scriptable [`ResourceManager`] over [`TestResource`]s.
///
/// Clones share state, so a test can keep one handle for scripting and
/// assertions while the pool owns another.
#[derive(Clone, Default)]
pub struct TestManager {
    state: Arc<Mutex<ManagerState>>,
}

impl TestManager {
    /// A manager that opens instantly and never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager that takes responsibility for resources handed to
    /// `on_release_timeout` (it records them without closing).
    #[must_use]
    pub fn handling_release_timeouts(self) -> Self {
        self.state.lock().handles_release_timeout = true;
        self
    }

    /// Delay every subsequent `open` by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.lock().open_failures = count;
    }

    /// Make every `on_active` hook call fail.
    pub fn set_fail_on_active(&self, fail: bool) {
        self.state.lock().fail_on_active = fail;
    }

    /// Make every `on_idle` hook call fail.
    pub fn set_fail_on_idle(&self, fail: bool) {
        self.state.lock().fail_on_idle = fail;
    }

    /// How many resources were successfully opened.
    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Identities of closed resources, in close order.
    #[must_use]
    pub fn closed_ids(&self) -> Vec<usize> {
        self.state.lock().closed.clone()
    }

    /// Identities handed to the release-timeout handler.
    #[must_use]
    pub fn release_timed_out_ids(&self) -> Vec<usize> {
        self.state.lock().release_timed_out.clone()
    }
}

#[async_trait]
impl ResourceManager for TestManager {
    type Resource = TestResource;

    async fn open(&self) -> Result<TestResource, BoxDynError> {
        let (delay, fail) = {
            let mut state = self.state.lock();
            let fail = if state.open_failures > 0 {
                state.open_failures -= 1;
                true
            } else {
                false
            };
            (state.open_delay, fail)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err("scripted open failure".into());
        }

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.opened += 1;
        Ok(TestResource { id })
    }

    async fn close(&self, resource: &TestResource) -> Result<(), BoxDynError> {
        self.state.lock().closed.push(resource.id);
        Ok(())
    }

    async fn on_active(&self, _resource: &TestResource) -> Result<(), BoxDynError> {
        if self.state.lock().fail_on_active {
            return Err("scripted on_active failure".into());
        }
        Ok(())
    }

    async fn on_idle(&self, _resource: &TestResource) -> Result<(), BoxDynError> {
        if self.state.lock().fail_on_idle {
            return Err("scripted on_idle failure".into());
        }
        Ok(())
    }

    async fn on_release_timeout(&self, resource: &TestResource) {
        self.state.lock().release_timed_out.push(resource.id);
    }

    fn handles_release_timeout(&self) -> bool {
        self.state.lock().handles_release_timeout
    }
}

#[derive(Default)]
struct DriverState {
    calls: Vec<String>,
    failing_statements: HashSet<String>,
    retry_verdicts: VecDeque<bool>,
    execute_delay: Option<Duration>,
    recyclable: bool,
}

/// A [`Driver`] that records every call it receives.
///
/// Statements are plain strings; executing `"x"` yields the result
/// `"done:x"`. Clones share state, so tests can keep a handle for scripting
/// and assertions while a `Connection` owns another.
#[derive(Clone)]
pub struct RecordingDriver {
    state: Arc<Mutex<DriverState>>,
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDriver {
    /// A driver where every statement succeeds and failures are never
    /// retried.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriverState {
                recyclable: true,
                ..DriverState::default()
            })),
        }
    }

    /// Snapshot of every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Make executions of `statement` fail.
    pub fn fail_statement(&self, statement: &str) {
        self.state.lock().failing_statements.insert(statement.to_owned());
    }

    /// Script the verdicts returned by `should_retry_transaction_failure`,
    /// consumed front to back; once exhausted the verdict is `false`.
    pub fn queue_retry_verdicts<I: IntoIterator<Item = bool>>(&self, verdicts: I) {
        self.state.lock().retry_verdicts.extend(verdicts);
    }

    /// Delay every statement execution by `delay`.
    pub fn set_execute_delay(&self, delay: Duration) {
        self.state.lock().execute_delay = Some(delay);
    }

    /// Script the verdict returned by `can_recycle_connection_after_error`.
    pub fn set_recyclable(&self, recyclable: bool) {
        self.state.lock().recyclable = recyclable;
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }

    async fn run_statement(&self, statement: &str) -> Result<String, BoxDynError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(format!("execute:{statement}"));
            state.execute_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self.state.lock().failing_statements.contains(statement);
        self.record(format!("done:{statement}"));
        if failed {
            return Err(format!("scripted failure for statement {statement}").into());
        }
        Ok(format!("done:{statement}"))
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    type Statement = String;
    type Results = String;
    type RowStream = futures_util::stream::Iter<std::vec::IntoIter<String>>;

    async fn begin_transaction(&self, _options: &TransactionOptions) -> Result<(), BoxDynError> {
        self.record("begin");
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), BoxDynError> {
        self.record("commit");
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), BoxDynError> {
        self.record("rollback");
        Ok(())
    }

    async fn create_savepoint(&self, name: &str) -> Result<(), BoxDynError> {
        self.record(format!("savepoint:{name}"));
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> Result<(), BoxDynError> {
        self.record(format!("release_savepoint:{name}"));
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<(), BoxDynError> {
        self.record(format!("rollback_to_savepoint:{name}"));
        Ok(())
    }

    async fn execute_all(&self, statements: &[String]) -> Result<Vec<String>, BoxDynError> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.run_statement(statement).await?);
        }
        Ok(results)
    }

    async fn execute_last(&self, statements: &[String]) -> Result<String, BoxDynError> {
        let mut last = None;
        for statement in statements {
            last = Some(self.run_statement(statement).await?);
        }
        last.ok_or_else(|| "empty statement batch".into())
    }

    async fn execute_stream(&self, statement: String) -> Result<Self::RowStream, BoxDynError> {
        self.record(format!("stream:{statement}"));
        let rows = vec![format!("row:1:{statement}"), format!("row:2:{statement}")];
        Ok(futures_util::stream::iter(rows))
    }

    fn should_retry_transaction_failure(
        &self,
        _options: &TransactionOptions,
        _error: &Error,
        failure_count: u32,
    ) -> bool {
        let mut state = self.state.lock();
        let verdict = state.retry_verdicts.pop_front().unwrap_or(false);
        state.calls.push(format!("should_retry:{failure_count}:{verdict}"));
        verdict
    }

    fn can_recycle_connection_after_error(&self, _error: &Error) -> bool {
        let mut state = self.state.lock();
        let verdict = state.recyclable;
        state.calls.push(format!("can_recycle:{verdict}"));
        verdict
    }
}

// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deadlock-protected write execution.
//!
//! Under row and table locking, concurrent writers occasionally collide on a
//! lock that clears within milliseconds. [`DeadlockExecutor`] prepares a write
//! once, then runs it up to `max_attempts` times, pausing for a flat backoff
//! after each lock conflict. Any other failure is returned at once. When every
//! attempt conflicts the caller gets [`StowageError::DeadlockExceeded`], which
//! is deliberately distinct from the underlying driver error.
//!
//! The executor is synchronous: it runs on the worker thread that owns the
//! connection and blocks that worker for the attempts and pauses.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::ToSql;
use stowage_config::RetryConfig;
use stowage_core::{OperationKind, Params, StowageError, WriteRequest};
use tracing::{debug, warn};

use crate::bind::BoundParams;
use crate::classify::{classify, DriverFailure};
use crate::sql_log::query_hash;
use crate::stats::StatsCollector;

/// A statement that has been prepared once and can be executed repeatedly.
pub trait PreparedWrite {
    /// Execute with the given parameters and return the affected row count.
    fn execute(&mut self, params: &Params) -> Result<usize, DriverFailure>;
}

/// A connection that can prepare writes.
pub trait WriteConnection {
    type Prepared<'c>: PreparedWrite
    where
        Self: 'c;

    /// Prepare `statement`. Failures are returned uncategorized.
    fn prepare<'c>(&'c self, statement: &str) -> Result<Self::Prepared<'c>, StowageError>;
}

impl WriteConnection for rusqlite::Connection {
    type Prepared<'c> = rusqlite::Statement<'c>;

    fn prepare<'c>(&'c self, statement: &str) -> Result<rusqlite::Statement<'c>, StowageError> {
        rusqlite::Connection::prepare(self, statement).map_err(StowageError::storage)
    }
}

impl PreparedWrite for rusqlite::Statement<'_> {
    fn execute(&mut self, params: &Params) -> Result<usize, DriverFailure> {
        let bound = BoundParams::new(params);
        let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
        rusqlite::Statement::execute(self, named.as_slice()).map_err(|e| classify(&e))
    }
}

/// Something that can wait between attempts.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Attempt budget and flat backoff for protected writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.backoff(),
        }
    }
}

/// Runs writes with bounded retries on lock conflicts.
#[derive(Clone)]
pub struct DeadlockExecutor {
    policy: RetryPolicy,
    stats: Arc<StatsCollector>,
    pause: Arc<dyn Pause>,
}

impl std::fmt::Debug for DeadlockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlockExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DeadlockExecutor {
    pub fn new(policy: RetryPolicy, stats: Arc<StatsCollector>) -> Self {
        Self {
            policy,
            stats,
            pause: Arc::new(ThreadSleep),
        }
    }

    /// Replace the pause used between attempts.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Prepare `request.statement` on `conn` and run it with retries.
    pub fn execute_with_retry<C>(
        &self,
        conn: &C,
        request: &WriteRequest,
    ) -> Result<usize, StowageError>
    where
        C: WriteConnection + ?Sized,
    {
        let mut statement = conn.prepare(&request.statement)?;
        self.run(&mut statement, request)
    }

    /// Run an already prepared statement with retries.
    ///
    /// Every attempt bumps the `update` counter of the request's connection.
    /// There is no pause after the final failed attempt.
    pub fn run<P>(&self, statement: &mut P, request: &WriteRequest) -> Result<usize, StowageError>
    where
        P: PreparedWrite + ?Sized,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut remaining = max_attempts;

        while remaining > 0 {
            let attempt = max_attempts - remaining + 1;
            self.stats
                .increment(&request.connection, OperationKind::Update);

            match statement.execute(&request.params) {
                Ok(rows) => {
                    if attempt > 1 {
                        debug!(
                            connection = %request.connection,
                            attempt,
                            rows,
                            "write succeeded after lock conflict"
                        );
                    }
                    return Ok(rows);
                }
                Err(failure) if failure.is_transient() => {
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                    debug!(
                        connection = %request.connection,
                        attempt,
                        code = failure.code,
                        query = %query_hash(&request.statement, &request.params),
                        "lock conflict, retrying after {:?}",
                        self.policy.backoff
                    );
                    self.pause.pause(self.policy.backoff);
                }
                Err(failure) => return Err(failure.into_statement_error()),
            }
        }

        warn!(
            connection = %request.connection,
            max_attempts,
            query = %query_hash(&request.statement, &request.params),
            "write abandoned after repeated lock conflicts"
        );
        Err(StowageError::DeadlockExceeded { max_attempts })
    }
}

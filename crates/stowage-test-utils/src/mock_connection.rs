// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted connection for exercising the deadlock executor.
//!
//! `ScriptedConnection` implements `WriteConnection` and hands out statements
//! whose executions follow a pre-configured script of outcomes, so retry
//! behavior can be tested without real lock contention.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::ffi;
use stowage_core::{Params, StowageError};
use stowage_storage::{DriverFailure, FailureClass, Pause, PreparedWrite, WriteConnection};

/// One scripted execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Success with this many affected rows.
    Rows(usize),
    /// `SQLITE_BUSY`.
    Busy,
    /// `SQLITE_LOCKED`.
    Locked,
    /// A non-transient engine failure with the given code.
    Fatal(i32),
    /// `SQLITE_IOERR`.
    Lost,
}

impl Outcome {
    fn into_result(self) -> Result<usize, DriverFailure> {
        match self {
            Outcome::Rows(n) => Ok(n),
            Outcome::Busy => Err(DriverFailure::new(
                FailureClass::TransientWriteConflict,
                ffi::SQLITE_BUSY,
                "database is locked",
            )),
            Outcome::Locked => Err(DriverFailure::new(
                FailureClass::TransientWriteConflict,
                ffi::SQLITE_LOCKED,
                "database table is locked",
            )),
            Outcome::Fatal(code) => Err(DriverFailure::new(
                FailureClass::Fatal,
                code,
                "scripted failure",
            )),
            Outcome::Lost => Err(DriverFailure::new(
                FailureClass::ConnectionLost,
                ffi::SQLITE_IOERR,
                "disk I/O error",
            )),
        }
    }
}

/// A connection whose statements replay a script.
///
/// When the script runs out every further execution succeeds with 1 row.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    script: Mutex<VecDeque<Outcome>>,
    fail_prepare: bool,
    prepares: AtomicUsize,
    executions: AtomicUsize,
    last_params: Mutex<Option<Params>>,
}

impl ScriptedConnection {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A connection on which every prepare fails.
    pub fn unpreparable() -> Self {
        Self {
            fail_prepare: true,
            ..Self::default()
        }
    }

    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Parameters passed to the most recent execution.
    pub fn last_params(&self) -> Option<Params> {
        self.last_params
            .lock()
            .expect("params lock poisoned")
            .clone()
    }

    fn next_outcome(&self, params: &Params) -> Result<usize, DriverFailure> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().expect("params lock poisoned") = Some(params.clone());
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Outcome::Rows(1))
            .into_result()
    }
}

/// Statement handed out by [`ScriptedConnection`].
#[derive(Debug)]
pub struct ScriptedStatement<'c> {
    conn: &'c ScriptedConnection,
}

impl PreparedWrite for ScriptedStatement<'_> {
    fn execute(&mut self, params: &Params) -> Result<usize, DriverFailure> {
        self.conn.next_outcome(params)
    }
}

impl WriteConnection for ScriptedConnection {
    type Prepared<'c> = ScriptedStatement<'c>;

    fn prepare<'c>(&'c self, statement: &str) -> Result<ScriptedStatement<'c>, StowageError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        if self.fail_prepare {
            return Err(StowageError::storage(format!(
                "near \"{statement}\": syntax error"
            )));
        }
        Ok(ScriptedStatement { conn: self })
    }
}

/// A pause that records requested durations instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.pauses.lock().expect("pause lock poisoned").len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.pauses.lock().expect("pause lock poisoned").clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses
            .lock()
            .expect("pause lock poisoned")
            .push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replays_then_succeeds() {
        let conn = ScriptedConnection::new([Outcome::Busy, Outcome::Rows(3)]);
        let mut stmt = conn.prepare("UPDATE t SET x = 1").unwrap();
        assert!(stmt.execute(&Params::new()).unwrap_err().is_transient());
        assert_eq!(stmt.execute(&Params::new()).unwrap(), 3);
        assert_eq!(stmt.execute(&Params::new()).unwrap(), 1);
        assert_eq!(conn.executions(), 3);
        assert_eq!(conn.prepares(), 1);
    }

    #[test]
    fn unpreparable_connection_fails_prepare() {
        let conn = ScriptedConnection::unpreparable();
        assert!(conn.prepare("UPDTE").is_err());
        assert_eq!(conn.executions(), 0);
    }
}

// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver error classification.
//!
//! Raw SQLite result codes are resolved here, once, into a [`FailureClass`].
//! Nothing past this module looks at vendor codes.

use rusqlite::ErrorCode;
use stowage_core::StowageError;

/// Code reported for failures raised by the binding layer rather than the engine.
pub const NON_ENGINE_CODE: i32 = -1;

/// How a failed statement should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`); expected to clear on retry.
    TransientWriteConflict,
    /// The session is unusable (`SQLITE_IOERR`, `SQLITE_CANTOPEN`); reopen the handle.
    ConnectionLost,
    /// Everything else: syntax, constraints, bad parameters.
    Fatal,
}

/// A classified driver failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    pub class: FailureClass,
    /// Extended SQLite result code, or [`NON_ENGINE_CODE`].
    pub code: i32,
    pub message: String,
}

impl DriverFailure {
    pub fn new(class: FailureClass, code: i32, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == FailureClass::TransientWriteConflict
    }

    /// The error a caller sees when this failure is not retried.
    pub fn into_error(self) -> StowageError {
        match self.class {
            FailureClass::ConnectionLost => StowageError::ConnectionLost {
                code: self.code,
                message: self.message,
            },
            FailureClass::TransientWriteConflict | FailureClass::Fatal => {
                StowageError::Statement {
                    code: self.code,
                    message: self.message,
                }
            }
        }
    }

    /// Like [`into_error`](Self::into_error), but connection loss is reported as
    /// a plain statement failure. Used where no reconnect path exists.
    pub fn into_statement_error(self) -> StowageError {
        StowageError::Statement {
            code: self.code,
            message: self.message,
        }
    }
}

/// Map a primary SQLite result code to a failure class.
pub fn classify_code(code: ErrorCode) -> FailureClass {
    match code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
            FailureClass::TransientWriteConflict
        }
        ErrorCode::SystemIoFailure | ErrorCode::CannotOpen => FailureClass::ConnectionLost,
        _ => FailureClass::Fatal,
    }
}

/// Classify a rusqlite error.
pub fn classify(err: &rusqlite::Error) -> DriverFailure {
    match err {
        rusqlite::Error::SqliteFailure(inner, message) => DriverFailure::new(
            classify_code(inner.code),
            inner.extended_code,
            message.clone().unwrap_or_else(|| inner.to_string()),
        ),
        other => DriverFailure::new(FailureClass::Fatal, NON_ENGINE_CODE, other.to_string()),
    }
}

/// Convert a rusqlite error straight into a [`StowageError`].
pub fn db_error(err: rusqlite::Error) -> StowageError {
    classify(&err).into_error()
}

#[cfg(test)]
mod tests {
    use rusqlite::ffi;

    use super::*;

    fn sqlite_failure(code: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message.to_string()))
    }

    #[test]
    fn busy_and_locked_are_transient() {
        let busy = classify(&sqlite_failure(ffi::SQLITE_BUSY, "database is locked"));
        let locked = classify(&sqlite_failure(ffi::SQLITE_LOCKED, "table is locked"));
        assert!(busy.is_transient());
        assert!(locked.is_transient());
        assert_eq!(busy.code, ffi::SQLITE_BUSY);
        assert_eq!(busy.message, "database is locked");
    }

    #[test]
    fn io_failure_is_connection_lost() {
        let failure = classify(&sqlite_failure(ffi::SQLITE_IOERR, "disk I/O error"));
        assert_eq!(failure.class, FailureClass::ConnectionLost);
        assert!(failure.into_error().is_connection_lost());
    }

    #[test]
    fn constraint_is_fatal() {
        let failure = classify(&sqlite_failure(
            ffi::SQLITE_CONSTRAINT,
            "UNIQUE constraint failed: widgets.name",
        ));
        assert_eq!(failure.class, FailureClass::Fatal);
        match failure.into_error() {
            StowageError::Statement { code, message } => {
                assert_eq!(code, ffi::SQLITE_CONSTRAINT);
                assert!(message.contains("UNIQUE"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn binding_errors_are_fatal_without_engine_code() {
        let failure = classify(&rusqlite::Error::InvalidParameterName(":missing".into()));
        assert_eq!(failure.class, FailureClass::Fatal);
        assert_eq!(failure.code, NON_ENGINE_CODE);
    }

    #[test]
    fn statement_error_hides_connection_loss() {
        let failure = DriverFailure::new(FailureClass::ConnectionLost, 10, "gone");
        assert!(!failure.into_statement_error().is_connection_lost());
    }
}

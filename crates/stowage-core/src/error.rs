// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Stowage storage services.

use thiserror::Error;

/// The primary error type returned by storage, nonce, and configuration operations.
#[derive(Debug, Error)]
pub enum StowageError {
    /// Configuration errors (invalid TOML, failed validation).
    #[error("configuration error: {0}")]
    Config(String),

    /// Uncategorized storage backend errors (open, prepare, worker failures).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A statement failed with a non-transient driver error.
    #[error("statement failed with code {code}: {message}")]
    Statement { code: i32, message: String },

    /// The driver reported that the session behind a connection is gone.
    #[error("connection lost (code {code}): {message}")]
    ConnectionLost { code: i32, message: String },

    /// Every attempt of a deadlock-protected write hit a lock conflict.
    #[error(
        "failed to write to database after {max_attempts} attempts, please try again later"
    )]
    DeadlockExceeded { max_attempts: u32 },

    /// The worker owning a named connection has already shut down.
    #[error("connection `{name}` is closed")]
    ConnectionClosed { name: String },

    /// A nonce or CSRF token failed verification.
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StowageError {
    /// Wrap any error as an uncategorized storage failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// True when the failure should trigger a close-and-reopen of the connection.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    /// True when a deadlock-protected write ran out of attempts.
    pub fn is_deadlock_exceeded(&self) -> bool {
        matches!(self, Self::DeadlockExceeded { .. })
    }

    /// The driver error code, when the failure carries one.
    pub fn driver_code(&self) -> Option<i32> {
        match self {
            Self::Statement { code, .. } | Self::ConnectionLost { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_exceeded_message_names_attempts() {
        let err = StowageError::DeadlockExceeded { max_attempts: 3 };
        assert!(err.is_deadlock_exceeded());
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(err.driver_code(), None);
    }

    #[test]
    fn connection_lost_is_distinct_from_statement() {
        let lost = StowageError::ConnectionLost {
            code: 10,
            message: "disk I/O error".into(),
        };
        let stmt = StowageError::Statement {
            code: 1,
            message: "no such table: widgets".into(),
        };
        assert!(lost.is_connection_lost());
        assert!(!stmt.is_connection_lost());
        assert_eq!(lost.driver_code(), Some(10));
        assert_eq!(stmt.driver_code(), Some(1));
    }

    #[test]
    fn storage_helper_boxes_source() {
        let err = StowageError::storage("worker gone");
        assert_eq!(err.to_string(), "storage error: worker gone");
    }
}

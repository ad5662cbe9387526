// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! rejected at startup instead of silently falling back to a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Stowage configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StowageConfig {
    /// Database file and connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Deadlock retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log level and SQL logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Nonce generation defaults.
    #[serde(default)]
    pub nonce: NonceConfig,

    /// CSRF token settings.
    #[serde(default)]
    pub csrf: CsrfConfig,
}

/// Database configuration shared by every named connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    ///
    /// With `:memory:` every named connection gets its own private database.
    #[serde(default = "default_database_path")]
    pub path: String,

    /// How long SQLite itself waits on a locked database before reporting busy.
    ///
    /// Zero hands lock conflicts straight to the deadlock retry loop.
    #[serde(default)]
    pub busy_timeout_ms: u64,

    /// Enable WAL journal mode on file databases.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: 0,
            wal_mode: true,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_database_path() -> String {
    "stowage.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Deadlock retry policy for protected writes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Flat pause between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log every statement with its parameters at debug level.
    #[serde(default)]
    pub log_sql: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Nonce defaults used when callers don't pass explicit values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NonceConfig {
    /// Lifetime of a new nonce in seconds.
    #[serde(default = "default_nonce_timeout")]
    pub timeout_secs: u64,

    /// Random bytes in the secret part (hex-encoded, so twice as many chars).
    #[serde(default = "default_nonce_length")]
    pub nonce_length: usize,

    /// Random bytes in the lookup part.
    #[serde(default = "default_lookup_length")]
    pub lookup_length: usize,

    /// Separator between lookup and secret in a split token.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_nonce_timeout(),
            nonce_length: default_nonce_length(),
            lookup_length: default_lookup_length(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_nonce_timeout() -> u64 {
    3600
}

fn default_nonce_length() -> usize {
    20
}

fn default_lookup_length() -> usize {
    10
}

fn default_delimiter() -> String {
    ":::".to_string()
}

/// CSRF token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CsrfConfig {
    /// Session and form field name holding the token.
    #[serde(default = "default_csrf_key")]
    pub key: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            key: default_csrf_key(),
        }
    }
}

fn default_csrf_key() -> String {
    "csrfToken".to_string()
}

// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite storage for Stowage.
//!
//! Connections are addressed by name and each runs on its own
//! `tokio-rusqlite` worker thread. Writes that may collide on locks go
//! through the [`DeadlockExecutor`], which retries lock conflicts a bounded
//! number of times before giving up with
//! [`StowageError::DeadlockExceeded`](stowage_core::StowageError::DeadlockExceeded).

pub mod bind;
pub mod classify;
pub mod executor;
pub mod registry;
pub mod service;
pub mod sql_log;
pub mod stats;

pub use classify::{classify, DriverFailure, FailureClass};
pub use executor::{DeadlockExecutor, Pause, PreparedWrite, RetryPolicy, ThreadSleep, WriteConnection};
pub use registry::ConnectionRegistry;
pub use service::{Row, StorageService};
pub use stats::{StatsCollector, StatsSnapshot};

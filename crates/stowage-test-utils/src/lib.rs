// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Stowage integration tests.
//!
//! # Components
//!
//! - [`ScriptedConnection`] - connection whose writes replay scripted outcomes
//! - [`RecordingPause`] - retry pause that records instead of sleeping
//! - [`TestDb`] - storage service over a temporary database file

pub mod harness;
pub mod mock_connection;

pub use harness::{TestDb, TestDbBuilder};
pub use mock_connection::{Outcome, RecordingPause, ScriptedConnection, ScriptedStatement};

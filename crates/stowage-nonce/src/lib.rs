// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nonce and CSRF token services.
//!
//! - [`NonceService`] issues single-use tokens bound to an entity and action
//!   and verifies them against an Argon2id hash held by a [`NonceStore`].
//! - [`SqliteNonceStore`] keeps nonces in SQLite via the storage service.
//! - [`CsrfGuard`] checks state-changing requests against a session token.

pub mod csrf;
pub mod nonce;
pub mod service;
pub mod sqlite_store;

pub use csrf::{CsrfGuard, CSRF_HEADER};
pub use nonce::{Nonce, SecretHasher};
pub use service::{NonceService, NonceStore};
pub use sqlite_store::SqliteNonceStore;

// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named connection registry.
//!
//! Each name owns one `tokio-rusqlite` connection, and therefore one worker
//! thread. Statements sent to the same name are serialized on that worker;
//! different names run in parallel. Handles are opened lazily on first use.

use std::collections::HashMap;
use std::sync::Arc;

use stowage_config::DatabaseConfig;
use stowage_core::StowageError;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::classify::db_error;

const MEMORY_PATH: &str = ":memory:";

/// Owns the open connections, keyed by logical name.
pub struct ConnectionRegistry {
    config: DatabaseConfig,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The handle for `name`, opening it if needed.
    pub async fn get(&self, name: &str) -> Result<Arc<Connection>, StowageError> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(name) {
            return Ok(Arc::clone(conn));
        }
        let conn = Arc::new(self.open(name).await?);
        connections.insert(name.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Open a fresh handle for `name`, replacing any existing one.
    pub async fn set_connection(&self, name: &str) -> Result<Arc<Connection>, StowageError> {
        let conn = Arc::new(self.open(name).await?);
        let previous = self
            .connections
            .lock()
            .await
            .insert(name.to_string(), Arc::clone(&conn));
        if let Some(previous) = previous {
            shutdown(name, previous).await;
        }
        Ok(conn)
    }

    /// Close one named connection, or all of them when `name` is `None`.
    pub async fn close(&self, name: Option<&str>) {
        let closing: Vec<(String, Arc<Connection>)> = {
            let mut connections = self.connections.lock().await;
            match name {
                Some(name) => connections.remove_entry(name).into_iter().collect(),
                None => connections.drain().collect(),
            }
        };
        for (name, conn) in closing {
            shutdown(&name, conn).await;
        }
    }

    pub async fn is_open(&self, name: &str) -> bool {
        self.connections.lock().await.contains_key(name)
    }

    /// Names of the currently open connections, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn open(&self, name: &str) -> Result<Connection, StowageError> {
        let path = self.config.path.clone();
        let in_memory = path == MEMORY_PATH;
        let conn = if in_memory {
            Connection::open_in_memory().await
        } else {
            Connection::open(&path).await
        }
        .map_err(|e| StowageError::storage(format!("failed to open `{path}`: {e}")))?;

        let busy_timeout = self.config.busy_timeout();
        let wal = self.config.wal_mode && !in_memory;
        conn.call(move |conn| -> Result<(), StowageError> {
            conn.busy_timeout(busy_timeout).map_err(db_error)?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(db_error)?;
            if wal {
                let mode: String = conn
                    .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                    .map_err(db_error)?;
                if !mode.eq_ignore_ascii_case("wal") {
                    warn!(mode = %mode, "database refused WAL journal mode");
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| map_call_err(name, e))?;

        debug!(connection = name, path = %self.config.path, "connection opened");
        Ok(conn)
    }
}

async fn shutdown(name: &str, conn: Arc<Connection>) {
    match Arc::try_unwrap(conn) {
        Ok(conn) => match conn.close().await {
            Ok(()) => debug!(connection = name, "connection closed"),
            Err(e) => warn!(connection = name, error = %e, "error closing connection"),
        },
        // In-flight callers still hold the handle; the worker stops when the
        // last of them drops it.
        Err(_) => debug!(connection = name, "connection released"),
    }
}

/// Unwrap a worker call result into a [`StowageError`].
pub(crate) fn map_call_err(name: &str, err: tokio_rusqlite::Error<StowageError>) -> StowageError {
    match err {
        tokio_rusqlite::Error::Error(e) => e,
        tokio_rusqlite::Error::ConnectionClosed => StowageError::ConnectionClosed {
            name: name.to_string(),
        },
        other => StowageError::storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            path: MEMORY_PATH.to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[tokio::test]
    async fn get_opens_lazily_and_reuses() {
        let registry = ConnectionRegistry::new(memory_config());
        assert!(!registry.is_open("default").await);

        let a = registry.get("default").await.unwrap();
        let b = registry.get("default").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names().await, vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn close_one_leaves_others_open() {
        let registry = ConnectionRegistry::new(memory_config());
        registry.get("default").await.unwrap();
        registry.get("isolated").await.unwrap();

        registry.close(Some("default")).await;
        assert!(!registry.is_open("default").await);
        assert!(registry.is_open("isolated").await);

        registry.close(None).await;
        assert!(registry.names().await.is_empty());
    }

    #[tokio::test]
    async fn set_connection_replaces_handle() {
        let registry = ConnectionRegistry::new(memory_config());
        let first = registry.get("default").await.unwrap();
        let second = registry.set_connection("default").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let current = registry.get("default").await.unwrap();
        assert!(Arc::ptr_eq(&second, &current));
    }

    #[tokio::test]
    async fn foreign_keys_are_enabled() {
        let registry = ConnectionRegistry::new(memory_config());
        let conn = registry.get("default").await.unwrap();
        let enabled: i64 = conn
            .call(|conn| -> Result<i64, StowageError> {
                conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                    .map_err(db_error)
            })
            .await
            .map_err(|e| map_call_err("default", e))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn unopenable_path_is_a_storage_error() {
        let registry = ConnectionRegistry::new(DatabaseConfig {
            path: "/nonexistent-dir/for/stowage/test.db".to_string(),
            ..DatabaseConfig::default()
        });
        let err = registry.get("default").await.unwrap_err();
        assert!(matches!(err, StowageError::Storage { .. }), "got {err:?}");
    }
}

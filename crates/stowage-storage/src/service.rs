// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage service: named connections, counted operations, and
//! deadlock-protected writes.

use std::sync::Arc;

use rusqlite::ToSql;
use serde_json::{Map, Value as Json};
use stowage_config::StowageConfig;
use stowage_core::{
    OperationKind, Params, StowageError, WriteRequest, DEFAULT_CONNECTION, ISOLATED_CONNECTION,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::bind::{to_json, BoundParams};
use crate::classify::db_error;
use crate::executor::{DeadlockExecutor, Pause, RetryPolicy};
use crate::registry::{map_call_err, ConnectionRegistry};
use crate::sql_log::log_sql;
use crate::stats::{StatsCollector, StatsSnapshot};

/// A result row keyed by column name.
pub type Row = Map<String, Json>;

/// SQL access through named connections.
///
/// Every operation takes an optional connection name. Reads and ordinary
/// writes default to `default`; isolated and deadlock-protected writes
/// default to `isolated`, so they commit independently of any transaction
/// open on `default`.
#[derive(Debug)]
pub struct StorageService {
    registry: ConnectionRegistry,
    stats: Arc<StatsCollector>,
    executor: DeadlockExecutor,
    log_sql: bool,
    version: OnceCell<String>,
}

impl StorageService {
    pub fn new(config: &StowageConfig) -> Self {
        let stats = Arc::new(StatsCollector::new());
        let executor = DeadlockExecutor::new(RetryPolicy::from(&config.retry), Arc::clone(&stats));
        Self {
            registry: ConnectionRegistry::new(config.database.clone()),
            stats,
            executor,
            log_sql: config.logging.log_sql,
            version: OnceCell::new(),
        }
    }

    /// Replace the pause used between deadlock retries.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.executor = self.executor.with_pause(pause);
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &DeadlockExecutor {
        &self.executor
    }

    /// The underlying handle for `name`, opened if needed.
    pub async fn get_connection(
        &self,
        name: &str,
    ) -> Result<Arc<tokio_rusqlite::Connection>, StowageError> {
        self.registry.get(name).await
    }

    /// Force a fresh handle for `name`.
    pub async fn set_connection(
        &self,
        name: &str,
    ) -> Result<Arc<tokio_rusqlite::Connection>, StowageError> {
        self.registry.set_connection(name).await
    }

    /// Run `op` on the worker for `name`, uncounted and unlogged.
    pub async fn call<T, F>(&self, name: &str, op: F) -> Result<T, StowageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, StowageError> + Send + 'static,
    {
        let conn = self.registry.get(name).await?;
        conn.call(op).await.map_err(|e| map_call_err(name, e))
    }

    /// Close `name`, or every connection when `None`.
    pub async fn close(&self, name: Option<&str>) {
        self.registry.close(name).await;
    }

    /// Whether the query returns at least one row.
    pub async fn exists(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
        reconnect: bool,
    ) -> Result<bool, StowageError> {
        let name = connection.unwrap_or(DEFAULT_CONNECTION);
        log_sql(self.log_sql, sql, params);

        let sql = sql.to_string();
        let params = params.clone();
        let found = self
            .run(name, reconnect, move |conn| {
                let bound = BoundParams::new(&params);
                let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
                let mut stmt = conn.prepare(&sql).map_err(db_error)?;
                stmt.exists(named.as_slice()).map_err(db_error)
            })
            .await?;
        self.stats.increment(name, OperationKind::Exists);
        Ok(found)
    }

    /// Run an insert and return the last inserted row id.
    ///
    /// Opens a transaction on the connection when none is active; it stays
    /// open until [`commit_if_necessary`](Self::commit_if_necessary). A
    /// transaction opened by a failing call is rolled back.
    pub async fn insert(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
        reconnect: bool,
    ) -> Result<i64, StowageError> {
        let name = connection.unwrap_or(DEFAULT_CONNECTION);
        log_sql(self.log_sql, sql, params);

        let sql = sql.to_string();
        let params = params.clone();
        let id = self
            .run(name, reconnect, move |conn| {
                in_transaction(conn, |conn| {
                    let bound = BoundParams::new(&params);
                    let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
                    conn.execute(&sql, named.as_slice()).map_err(db_error)?;
                    Ok(conn.last_insert_rowid())
                })
            })
            .await?;
        self.stats.increment(name, OperationKind::Insert);
        Ok(id)
    }

    /// Run a write inside the connection's transaction and return affected rows.
    pub async fn update(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
        reconnect: bool,
    ) -> Result<usize, StowageError> {
        let name = connection.unwrap_or(DEFAULT_CONNECTION);
        log_sql(self.log_sql, sql, params);

        let sql = sql.to_string();
        let params = params.clone();
        let rows = self
            .run(name, reconnect, move |conn| {
                in_transaction(conn, |conn| {
                    let bound = BoundParams::new(&params);
                    let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
                    conn.execute(&sql, named.as_slice()).map_err(db_error)
                })
            })
            .await?;
        self.stats.increment(name, OperationKind::Update);
        Ok(rows)
    }

    pub async fn select(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
        reconnect: bool,
    ) -> Result<Vec<Row>, StowageError> {
        let name = connection.unwrap_or(DEFAULT_CONNECTION);
        log_sql(self.log_sql, sql, params);

        let sql = sql.to_string();
        let params = params.clone();
        let records = self
            .run(name, reconnect, move |conn| {
                let bound = BoundParams::new(&params);
                let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
                let mut stmt = conn.prepare(&sql).map_err(db_error)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                let mut rows = stmt.query(named.as_slice()).map_err(db_error)?;
                let mut out = Vec::new();
                while let Some(row) = rows.next().map_err(db_error)? {
                    let mut record = Row::new();
                    for (i, column) in columns.iter().enumerate() {
                        let value = row.get_ref(i).map_err(db_error)?;
                        record.insert(column.clone(), to_json(value));
                    }
                    out.push(record);
                }
                Ok(out)
            })
            .await?;
        self.stats.increment(name, OperationKind::Select);
        Ok(records)
    }

    /// Run a write outside any transaction, on `isolated` by default. Counted
    /// as an `update` on that connection.
    pub async fn isolated(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
        reconnect: bool,
    ) -> Result<usize, StowageError> {
        let name = connection.unwrap_or(ISOLATED_CONNECTION);
        log_sql(self.log_sql, sql, params);

        let sql = sql.to_string();
        let params = params.clone();
        let rows = self
            .run(name, reconnect, move |conn| {
                let bound = BoundParams::new(&params);
                let named: Vec<(&str, &dyn ToSql)> = bound.as_named();
                conn.execute(&sql, named.as_slice()).map_err(db_error)
            })
            .await?;
        self.stats.increment(name, OperationKind::Update);
        Ok(rows)
    }

    /// Run a write with bounded retries on lock conflicts, on `isolated` by default.
    pub async fn update_with_deadlock_loop(
        &self,
        sql: &str,
        params: &Params,
        connection: Option<&str>,
    ) -> Result<usize, StowageError> {
        let request = WriteRequest::new(sql, params.clone())
            .on(connection.unwrap_or(ISOLATED_CONNECTION));
        self.execute_with_retry(request).await
    }

    /// Run `request` through the deadlock executor on its connection's worker.
    pub async fn execute_with_retry(&self, request: WriteRequest) -> Result<usize, StowageError> {
        log_sql(self.log_sql, &request.statement, &request.params);
        let name = request.connection.clone();
        let conn = self.registry.get(&name).await?;
        let executor = self.executor.clone();
        conn.call(move |conn| executor.execute_with_retry(&*conn, &request))
            .await
            .map_err(|e| map_call_err(&name, e))
    }

    /// Commit the open transaction on `name`, if there is one.
    ///
    /// Returns whether a commit was issued. A connection that was never
    /// opened has nothing to commit.
    pub async fn commit_if_necessary(&self, name: &str) -> Result<bool, StowageError> {
        if !self.registry.is_open(name).await {
            return Ok(false);
        }
        let conn = self.registry.get(name).await?;
        let committed = conn
            .call(|conn| -> Result<bool, StowageError> {
                if conn.is_autocommit() {
                    return Ok(false);
                }
                conn.execute_batch("COMMIT").map_err(db_error)?;
                Ok(true)
            })
            .await
            .map_err(|e| map_call_err(name, e))?;
        if committed {
            self.stats.increment(name, OperationKind::Commit);
            debug!(connection = name, "transaction committed");
        }
        Ok(committed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The shared counters, for components that record their own operations.
    pub fn stats_collector(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.stats)
    }

    pub fn increment_stat(&self, connection: &str, kind: OperationKind) {
        self.stats.increment(connection, kind);
    }

    /// SQLite engine version, without any build suffix. Cached after the
    /// first successful lookup; `None` when the engine cannot be queried.
    pub async fn version(&self) -> Option<String> {
        let result = self
            .version
            .get_or_try_init(|| async {
                self.stats
                    .increment(DEFAULT_CONNECTION, OperationKind::Utility);
                let raw: String = self
                    .run(DEFAULT_CONNECTION, false, |conn| {
                        conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))
                            .map_err(db_error)
                    })
                    .await?;
                Ok::<_, StowageError>(engine_version(&raw))
            })
            .await;
        match result {
            Ok(version) => Some(version.clone()),
            Err(e) => {
                warn!(error = %e, "could not determine database version");
                None
            }
        }
    }

    /// Run `op` on the worker for `name`. When `reconnect` is set and the
    /// connection turns out to be lost, reopen it and run `op` once more.
    async fn run<T, F>(&self, name: &str, reconnect: bool, op: F) -> Result<T, StowageError>
    where
        T: Send + 'static,
        F: Fn(&mut rusqlite::Connection) -> Result<T, StowageError> + Clone + Send + 'static,
    {
        let conn = self.registry.get(name).await?;
        let result = conn
            .call(op.clone())
            .await
            .map_err(|e| map_call_err(name, e));
        drop(conn);

        match result {
            Err(err) if reconnect && err.is_connection_lost() => {
                warn!(connection = name, error = %err, "connection lost, reconnecting");
                self.registry.close(Some(name)).await;
                let conn = self.registry.get(name).await?;
                conn.call(op).await.map_err(|e| map_call_err(name, e))
            }
            other => other,
        }
    }
}

/// Run `op` inside the connection's transaction, opening one when none is
/// active. If this call opened it and `op` fails, it is rolled back.
fn in_transaction<T>(
    conn: &rusqlite::Connection,
    op: impl FnOnce(&rusqlite::Connection) -> Result<T, StowageError>,
) -> Result<T, StowageError> {
    let began = conn.is_autocommit();
    if began {
        conn.execute_batch("BEGIN").map_err(db_error)?;
    }
    let result = op(conn);
    if result.is_err()
        && began
        && !conn.is_autocommit()
        && let Err(e) = conn.execute_batch("ROLLBACK")
    {
        warn!(error = %e, "rollback after failed write did not complete");
    }
    result
}

/// `3.45.1-custom` -> `3.45.1`.
fn engine_version(raw: &str) -> String {
    raw.split('-').next().unwrap_or(raw).trim().to_string()
}

#[cfg(test)]
mod tests {
    use stowage_core::params;

    use super::*;

    fn memory_service() -> StorageService {
        let mut config = StowageConfig::default();
        config.database.path = ":memory:".to_string();
        StorageService::new(&config)
    }

    #[test]
    fn engine_version_drops_suffix() {
        assert_eq!(engine_version("3.45.1"), "3.45.1");
        assert_eq!(engine_version("3.45.1-sqlcipher"), "3.45.1");
    }

    #[tokio::test]
    async fn insert_select_round_trip_on_one_connection() {
        let svc = memory_service();
        svc.isolated(
            "CREATE TABLE display (id INTEGER PRIMARY KEY, name TEXT, licensed INTEGER)",
            &Params::new(),
            Some(DEFAULT_CONNECTION),
            false,
        )
        .await
        .unwrap();

        let id = svc
            .insert(
                "INSERT INTO display (name, licensed) VALUES (:name, :licensed)",
                &params! { "name" => "lobby", "licensed" => true },
                None,
                false,
            )
            .await
            .unwrap();
        assert_eq!(id, 1);

        let rows = svc
            .select("SELECT id, name, licensed FROM display", &Params::new(), None, false)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Json::from("lobby"));
        assert_eq!(rows[0]["licensed"], Json::from(1));

        assert!(
            svc.exists(
                "SELECT 1 FROM display WHERE id = :id",
                &params! { "id" => id },
                None,
                false
            )
            .await
            .unwrap()
        );
    }

    #[tokio::test]
    async fn insert_opens_transaction_and_commit_closes_it() {
        let svc = memory_service();
        svc.isolated(
            "CREATE TABLE tag (id INTEGER PRIMARY KEY, tag TEXT)",
            &Params::new(),
            Some(DEFAULT_CONNECTION),
            false,
        )
        .await
        .unwrap();
        svc.insert(
            "INSERT INTO tag (tag) VALUES (:tag)",
            &params! { "tag" => "a" },
            None,
            false,
        )
        .await
        .unwrap();

        assert!(svc.commit_if_necessary(DEFAULT_CONNECTION).await.unwrap());
        assert!(!svc.commit_if_necessary(DEFAULT_CONNECTION).await.unwrap());
        assert!(!svc.commit_if_necessary("never-opened").await.unwrap());
        assert_eq!(svc.stats()[DEFAULT_CONNECTION][&OperationKind::Commit], 1);
    }

    #[tokio::test]
    async fn operations_are_counted_per_connection() {
        let svc = memory_service();
        svc.select("SELECT 1", &Params::new(), None, false)
            .await
            .unwrap();
        svc.select("SELECT 1", &Params::new(), Some("reporting"), false)
            .await
            .unwrap();
        svc.increment_stat("reporting", OperationKind::Utility);

        let stats = svc.stats();
        assert_eq!(stats["default"][&OperationKind::Select], 1);
        assert_eq!(stats["reporting"][&OperationKind::Select], 1);
        assert_eq!(stats["reporting"][&OperationKind::Utility], 1);
    }

    #[tokio::test]
    async fn failed_statements_are_not_counted() {
        let svc = memory_service();
        svc.select("SELECT * FROM nowhere", &Params::new(), None, false)
            .await
            .unwrap_err();
        svc.isolated("DELETE FROM nowhere", &Params::new(), None, false)
            .await
            .unwrap_err();
        assert_eq!(svc.stats_collector().total(), 0);

        svc.isolated(
            "CREATE TABLE tag (id INTEGER PRIMARY KEY)",
            &Params::new(),
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(svc.stats()[ISOLATED_CONNECTION][&OperationKind::Update], 1);
    }

    #[tokio::test]
    async fn call_runs_on_the_named_worker() {
        let svc = memory_service();
        svc.call("reporting", |conn| {
            conn.execute_batch("CREATE TABLE report (id INTEGER)")
                .map_err(db_error)
        })
        .await
        .unwrap();
        let tables: i64 = svc
            .call("reporting", |conn| {
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get(0))
                    .map_err(db_error)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
        assert_eq!(svc.stats_collector().total(), 0);

        svc.close(Some("reporting")).await;
        svc.registry().get("reporting").await.unwrap();
    }

    #[tokio::test]
    async fn version_is_cached() {
        let svc = memory_service();
        let first = svc.version().await.unwrap();
        let second = svc.version().await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with('3'));
        assert_eq!(svc.stats()[DEFAULT_CONNECTION][&OperationKind::Utility], 1);
    }

    #[tokio::test]
    async fn syntax_error_propagates_without_reconnect() {
        let svc = memory_service();
        let err = svc
            .update("UPDATE nowhere SET x = 1", &Params::new(), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StowageError::Statement { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn closed_connection_reopens_on_next_use() {
        let svc = memory_service();
        svc.select("SELECT 1", &Params::new(), None, false)
            .await
            .unwrap();
        svc.close(None).await;
        assert!(!svc.registry().is_open(DEFAULT_CONNECTION).await);
        svc.select("SELECT 1", &Params::new(), None, false)
            .await
            .unwrap();
        assert!(svc.registry().is_open(DEFAULT_CONNECTION).await);
    }
}

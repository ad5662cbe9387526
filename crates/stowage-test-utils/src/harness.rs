// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness backed by a temporary SQLite file.
//!
//! `TestDb` owns a temp directory holding the database, a storage service
//! pointed at it, and the pause recorder wired into its deadlock executor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stowage_config::StowageConfig;
use stowage_core::StowageError;
use stowage_storage::{Pause, StorageService};

use crate::mock_connection::RecordingPause;

/// Builder for [`TestDb`].
pub struct TestDbBuilder {
    max_attempts: u32,
    backoff: Duration,
    busy_timeout_ms: u64,
    pause: Option<Arc<dyn Pause>>,
    schema: Vec<String>,
}

impl TestDbBuilder {
    fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            busy_timeout_ms: 0,
            pause: None,
            schema: Vec::new(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Use `pause` between retries instead of the recording pause.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = Some(pause);
        self
    }

    /// SQL batch executed on the `default` connection after opening.
    pub fn with_schema(mut self, sql: impl Into<String>) -> Self {
        self.schema.push(sql.into());
        self
    }

    pub async fn build(self) -> Result<TestDb, StowageError> {
        let temp_dir = tempfile::TempDir::new().map_err(StowageError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = StowageConfig::default();
        config.database.path = db_path.to_string_lossy().into_owned();
        config.database.busy_timeout_ms = self.busy_timeout_ms;
        config.retry.max_attempts = self.max_attempts;
        config.retry.backoff_ms = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX);

        let recorder = Arc::new(RecordingPause::new());
        let pause = self
            .pause
            .unwrap_or_else(|| Arc::clone(&recorder) as Arc<dyn Pause>);
        let storage = Arc::new(StorageService::new(&config).with_pause(pause));

        for sql in &self.schema {
            let sql = sql.clone();
            storage
                .call(stowage_core::DEFAULT_CONNECTION, move |conn| {
                    conn.execute_batch(&sql).map_err(StowageError::storage)
                })
                .await?;
        }

        tracing::debug!(path = %db_path.display(), "test database ready");
        Ok(TestDb {
            storage,
            recorder,
            config,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A storage service over a throwaway database file.
pub struct TestDb {
    pub storage: Arc<StorageService>,
    /// Records pauses unless the builder was given its own.
    pub recorder: Arc<RecordingPause>,
    pub config: StowageConfig,
    pub db_path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestDb {
    pub fn builder() -> TestDbBuilder {
        TestDbBuilder::new()
    }

    /// Default harness with `sql` applied as the schema.
    pub async fn with_schema(sql: &str) -> Result<Self, StowageError> {
        Self::builder().with_schema(sql).build().await
    }

    /// A plain rusqlite connection to the same file, outside the service.
    pub fn raw_connection(&self) -> Result<rusqlite::Connection, StowageError> {
        rusqlite::Connection::open(&self.db_path).map_err(StowageError::storage)
    }
}

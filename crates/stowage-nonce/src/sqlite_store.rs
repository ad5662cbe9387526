// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed nonce store.
//!
//! Statements go through the storage service so they are counted and logged
//! like any other query. The `nonce` table is created by refinery migrations
//! embedded at build time.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stowage_core::{params, StowageError, DEFAULT_CONNECTION};
use stowage_storage::StorageService;

use crate::nonce::Nonce;
use crate::service::NonceStore;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Nonces persisted in the `nonce` table.
#[derive(Debug, Clone)]
pub struct SqliteNonceStore {
    storage: Arc<StorageService>,
    connection: String,
}

impl SqliteNonceStore {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self {
            storage,
            connection: DEFAULT_CONNECTION.to_string(),
        }
    }

    /// Use a connection other than `default`.
    pub fn on(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    /// Apply pending schema migrations.
    pub async fn install(&self) -> Result<(), StowageError> {
        self.storage
            .call(&self.connection, |conn| {
                embedded::migrations::runner()
                    .run(conn)
                    .map_err(StowageError::storage)?;
                Ok(())
            })
            .await?;
        tracing::debug!(connection = %self.connection, "nonce schema installed");
        Ok(())
    }

    async fn commit(&self) -> Result<(), StowageError> {
        self.storage.commit_if_necessary(&self.connection).await?;
        Ok(())
    }
}

#[async_trait]
impl NonceStore for SqliteNonceStore {
    async fn get(&self, lookup: &str) -> Result<Option<Nonce>, StowageError> {
        let rows = self
            .storage
            .select(
                "SELECT nonce_id, entity_id, action, lookup, hashed, expires \
                 FROM nonce WHERE lookup = :lookup LIMIT 2",
                &params! { "lookup" => lookup },
                Some(&self.connection),
                true,
            )
            .await?;
        if rows.len() != 1 {
            return Ok(None);
        }
        let row = rows.into_iter().next().map(Value::Object);
        row.map(|value| {
            serde_json::from_value(value)
                .map_err(|e| StowageError::Internal(format!("malformed nonce row: {e}")))
        })
        .transpose()
    }

    async fn persist(&self, nonce: &mut Nonce) -> Result<(), StowageError> {
        match nonce.nonce_id {
            None => {
                let id = self
                    .storage
                    .insert(
                        "INSERT INTO nonce (entity_id, action, lookup, hashed, expires) \
                         VALUES (:entity_id, :action, :lookup, :hashed, :expires)",
                        &params! {
                            "entity_id" => nonce.entity_id,
                            "action" => nonce.action.as_str(),
                            "lookup" => nonce.lookup.as_str(),
                            "hashed" => nonce.hashed.as_str(),
                            "expires" => nonce.expires,
                        },
                        Some(&self.connection),
                        true,
                    )
                    .await?;
                nonce.nonce_id = Some(id);
            }
            Some(id) => {
                self.storage
                    .update(
                        "UPDATE nonce SET entity_id = :entity_id, action = :action, \
                         lookup = :lookup, hashed = :hashed, expires = :expires \
                         WHERE nonce_id = :nonce_id",
                        &params! {
                            "nonce_id" => id,
                            "entity_id" => nonce.entity_id,
                            "action" => nonce.action.as_str(),
                            "lookup" => nonce.lookup.as_str(),
                            "hashed" => nonce.hashed.as_str(),
                            "expires" => nonce.expires,
                        },
                        Some(&self.connection),
                        true,
                    )
                    .await?;
            }
        }
        self.commit().await
    }

    async fn remove(&self, nonce: &Nonce) -> Result<(), StowageError> {
        self.storage
            .update(
                "DELETE FROM nonce WHERE lookup = :lookup",
                &params! { "lookup" => nonce.lookup.as_str() },
                Some(&self.connection),
                true,
            )
            .await?;
        self.commit().await
    }

    async fn remove_all_for_entity(
        &self,
        entity_id: i64,
        action: &str,
    ) -> Result<usize, StowageError> {
        let removed = self
            .storage
            .update(
                "DELETE FROM nonce WHERE entity_id = :entity_id AND action = :action",
                &params! { "entity_id" => entity_id, "action" => action },
                Some(&self.connection),
                true,
            )
            .await?;
        self.commit().await?;
        Ok(removed)
    }
}

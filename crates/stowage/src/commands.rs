// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations. Each returns the text printed on success.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stowage_config::StowageConfig;
use stowage_core::{ParamValue, Params, StowageError};
use stowage_nonce::{NonceService, SqliteNonceStore};
use stowage_storage::StorageService;

use crate::{Commands, NonceCommands};

pub async fn run(command: Commands, config: &StowageConfig) -> Result<String, StowageError> {
    let storage = Arc::new(StorageService::new(config));
    let result = dispatch(command, config, &storage).await;
    storage.close(None).await;
    result
}

async fn dispatch(
    command: Commands,
    config: &StowageConfig,
    storage: &Arc<StorageService>,
) -> Result<String, StowageError> {
    match command {
        Commands::Write {
            sql,
            params,
            connection,
        } => {
            let rows = storage
                .update_with_deadlock_loop(&sql, &to_params(params), connection.as_deref())
                .await?;
            Ok(json!({ "rows": rows, "stats": storage.stats() }).to_string())
        }
        Commands::Query {
            sql,
            params,
            connection,
        } => {
            let rows = storage
                .select(&sql, &to_params(params), connection.as_deref(), true)
                .await?;
            serde_json::to_string_pretty(&rows)
                .map_err(|e| StowageError::Internal(format!("failed to render rows: {e}")))
        }
        Commands::Nonce { command } => nonce(command, config, storage).await,
        Commands::Version => Ok(storage
            .version()
            .await
            .unwrap_or_else(|| "unknown".to_string())),
    }
}

async fn nonce(
    command: NonceCommands,
    config: &StowageConfig,
    storage: &Arc<StorageService>,
) -> Result<String, StowageError> {
    let store = SqliteNonceStore::new(Arc::clone(storage));
    store.install().await?;
    let service = NonceService::new(store, config.nonce.clone());
    let delimiter = config.nonce.delimiter.as_str();

    match command {
        NonceCommands::Issue {
            entity,
            action,
            timeout,
        } => {
            let nonce = match timeout {
                None => service.issue(entity, &action).await?,
                Some(secs) => {
                    let mut nonce = service.create(
                        entity,
                        &action,
                        Duration::from_secs(secs),
                        config.nonce.nonce_length,
                        config.nonce.lookup_length,
                    )?;
                    service.persist(&mut nonce).await?;
                    nonce
                }
            };
            nonce
                .split_token(delimiter)
                .ok_or_else(|| StowageError::Internal("issued nonce has no secret".to_string()))
        }
        NonceCommands::Verify { token, action } => {
            let nonce = service
                .get_split_verified(&token, &action, delimiter)
                .await?;
            Ok(json!({
                "nonce_id": nonce.nonce_id,
                "entity_id": nonce.entity_id,
                "action": nonce.action,
                "expires": nonce.expires,
            })
            .to_string())
        }
    }
}

fn to_params(pairs: Vec<(String, ParamValue)>) -> Params {
    pairs.into_iter().collect()
}

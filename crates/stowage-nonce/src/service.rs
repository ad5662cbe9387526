// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nonce creation and verification on top of a pluggable store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stowage_config::NonceConfig;
use stowage_core::StowageError;
use tracing::debug;

use crate::nonce::{random_hex, Nonce, SecretHasher};

/// Persistence for nonces.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// The nonce with this lookup, if exactly one exists.
    async fn get(&self, lookup: &str) -> Result<Option<Nonce>, StowageError>;

    /// Insert or update. Sets `nonce_id` on first persist.
    async fn persist(&self, nonce: &mut Nonce) -> Result<(), StowageError>;

    async fn remove(&self, nonce: &Nonce) -> Result<(), StowageError>;

    /// Delete every nonce for `entity_id` and `action`, returning how many went.
    async fn remove_all_for_entity(&self, entity_id: i64, action: &str)
    -> Result<usize, StowageError>;
}

/// Issues and checks nonces.
#[derive(Debug)]
pub struct NonceService<S> {
    store: S,
    hasher: SecretHasher,
    config: NonceConfig,
}

impl<S: NonceStore> NonceService<S> {
    pub fn new(store: S, config: NonceConfig) -> Self {
        Self {
            store,
            hasher: SecretHasher::default(),
            config,
        }
    }

    pub fn with_hasher(mut self, hasher: SecretHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NonceConfig {
        &self.config
    }

    /// Build a new, unpersisted nonce.
    ///
    /// `nonce_length` and `lookup_length` are random byte counts; both parts
    /// are hex-encoded.
    pub fn create(
        &self,
        entity_id: i64,
        action: &str,
        timeout: Duration,
        nonce_length: usize,
        lookup_length: usize,
    ) -> Result<Nonce, StowageError> {
        let secret = random_hex(nonce_length)?;
        let timeout = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        Ok(Nonce {
            nonce_id: None,
            entity_id,
            action: action.to_string(),
            lookup: random_hex(lookup_length)?,
            hashed: self.hasher.hash(&secret)?,
            expires: Utc::now().timestamp().saturating_add(timeout),
            token: Some(secret),
        })
    }

    /// Create with the configured timeout and lengths, then persist.
    pub async fn issue(&self, entity_id: i64, action: &str) -> Result<Nonce, StowageError> {
        let mut nonce = self.create(
            entity_id,
            action,
            Duration::from_secs(self.config.timeout_secs),
            self.config.nonce_length,
            self.config.lookup_length,
        )?;
        self.store.persist(&mut nonce).await?;
        debug!(entity_id, action, lookup = %nonce.lookup, "nonce issued");
        Ok(nonce)
    }

    /// Rebuild a nonce from its JSON form.
    pub fn hydrate(&self, json: &str) -> Result<Nonce, StowageError> {
        serde_json::from_str(json)
            .map_err(|e| StowageError::Internal(format!("malformed nonce: {e}")))
    }

    /// Look up by `lookup` and check `secret`, expiry, and `action`.
    pub async fn get_verified(
        &self,
        secret: &str,
        lookup: &str,
        action: &str,
    ) -> Result<Nonce, StowageError> {
        let nonce = self
            .store
            .get(lookup)
            .await?
            .ok_or_else(|| StowageError::InvalidNonce("unknown nonce".to_string()))?;

        if !nonce.verify(secret, Utc::now().timestamp()) {
            return Err(StowageError::InvalidNonce(
                "nonce mismatch or expired".to_string(),
            ));
        }
        if nonce.action != action {
            return Err(StowageError::InvalidNonce(format!(
                "nonce not valid for action `{action}`"
            )));
        }
        Ok(nonce)
    }

    /// Verify a `lookup<delimiter>secret` token.
    pub async fn get_split_verified(
        &self,
        token: &str,
        action: &str,
        delimiter: &str,
    ) -> Result<Nonce, StowageError> {
        let (lookup, secret) = split_token(token, delimiter)?;
        self.get_verified(secret, lookup, action).await
    }

    pub async fn get(&self, lookup: &str) -> Result<Option<Nonce>, StowageError> {
        self.store.get(lookup).await
    }

    pub async fn persist(&self, nonce: &mut Nonce) -> Result<(), StowageError> {
        self.store.persist(nonce).await
    }

    pub async fn remove(&self, nonce: &Nonce) -> Result<(), StowageError> {
        self.store.remove(nonce).await
    }

    pub async fn remove_all_for_entity(
        &self,
        entity_id: i64,
        action: &str,
    ) -> Result<usize, StowageError> {
        self.store.remove_all_for_entity(entity_id, action).await
    }
}

fn split_token<'t>(token: &'t str, delimiter: &str) -> Result<(&'t str, &'t str), StowageError> {
    if delimiter.is_empty() {
        return Err(StowageError::InvalidNonce("empty token delimiter".to_string()));
    }
    match token.split_once(delimiter) {
        Some((lookup, secret)) if !lookup.is_empty() && !secret.is_empty() => Ok((lookup, secret)),
        _ => Err(StowageError::InvalidNonce("malformed token".to_string())),
    }
}

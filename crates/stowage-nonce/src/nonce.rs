// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nonce values and secret hashing.
//!
//! A nonce pairs a public `lookup` with a secret. Only an Argon2id PHC string
//! of the secret is stored; the plain secret is handed to the caller once, at
//! creation.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use stowage_core::StowageError;

/// A single-use token bound to an entity and an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// Row id, set once persisted.
    #[serde(default)]
    pub nonce_id: Option<i64>,
    pub entity_id: i64,
    pub action: String,
    pub lookup: String,
    /// Argon2id PHC string of the secret.
    pub hashed: String,
    /// Unix timestamp (seconds) after which the nonce is no longer valid.
    pub expires: i64,
    /// The plain secret. Only present on a freshly created nonce.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Nonce {
    /// True when `secret` matches the stored hash and the nonce has not expired at `now`.
    pub fn verify(&self, secret: &str, now: i64) -> bool {
        verify_secret(secret, &self.hashed) && self.expires >= now
    }

    /// `lookup<delimiter>secret`, when the secret is still known.
    pub fn split_token(&self, delimiter: &str) -> Option<String> {
        self.token
            .as_ref()
            .map(|secret| format!("{}{delimiter}{secret}", self.lookup))
    }
}

/// Argon2id hashing of nonce secrets.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    params: Params,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

impl SecretHasher {
    /// Custom cost parameters. `memory_kib` and `iterations` follow Argon2 semantics.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, StowageError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| StowageError::Config(format!("invalid Argon2id parameters: {e}")))?;
        Ok(Self { params })
    }

    /// Hash `secret` into a PHC string with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, StowageError> {
        let salt_bytes = random_bytes(16)?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| StowageError::Internal(format!("failed to encode salt: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| StowageError::Internal(format!("Argon2id hashing failed: {e}")))?;
        Ok(hash.to_string())
    }
}

/// Check `secret` against a PHC string. Malformed hashes never verify.
pub fn verify_secret(secret: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// `len` random bytes, hex-encoded.
pub fn random_hex(len: usize) -> Result<String, StowageError> {
    Ok(hex::encode(random_bytes(len)?))
}

fn random_bytes(len: usize) -> Result<Vec<u8>, StowageError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| StowageError::Internal("failed to generate random bytes".to_string()))?;
    Ok(bytes)
}

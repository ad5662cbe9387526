// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-bound CSRF tokens.

use std::collections::HashMap;

use stowage_config::validation::is_valid_csrf_key;
use stowage_config::CsrfConfig;
use stowage_core::StowageError;

use crate::nonce::random_hex;

/// Header clients may send the token in.
pub const CSRF_HEADER: &str = "X-XSRF-TOKEN";

const TOKEN_BYTES: usize = 20;

/// Methods that must present a matching token.
const GUARDED_METHODS: &[&str] = &["POST", "PUT", "DELETE"];

/// Checks request tokens against the one stored in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfGuard {
    key: String,
}

impl CsrfGuard {
    /// `key` names both the session entry and the form field.
    pub fn new(key: impl Into<String>) -> Result<Self, StowageError> {
        let key = key.into();
        if !is_valid_csrf_key(&key) {
            return Err(StowageError::Config(format!(
                "invalid CSRF token key \"{key}\""
            )));
        }
        Ok(Self { key })
    }

    pub fn from_config(config: &CsrfConfig) -> Result<Self, StowageError> {
        Self::new(config.key.clone())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 40 hex characters.
    pub fn generate_token() -> Result<String, StowageError> {
        random_hex(TOKEN_BYTES)
    }

    /// The session's token, generating and storing one if absent.
    pub fn ensure_token(&self, session: &mut HashMap<String, String>) -> Result<String, StowageError> {
        if let Some(token) = session.get(&self.key) {
            return Ok(token.clone());
        }
        let token = Self::generate_token()?;
        session.insert(self.key.clone(), token.clone());
        Ok(token)
    }

    /// Check a request. Only state-changing methods are guarded; a token in
    /// the body takes precedence over the header.
    pub fn check(
        &self,
        method: &str,
        header_token: Option<&str>,
        body_token: Option<&str>,
        session_token: &str,
    ) -> Result<(), StowageError> {
        if !GUARDED_METHODS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
        {
            return Ok(());
        }
        match body_token.or(header_token) {
            Some(token) if !session_token.is_empty() && tokens_match(token, session_token) => {
                Ok(())
            }
            _ => Err(StowageError::InvalidNonce("Token Expired".to_string())),
        }
    }
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(presented.as_bytes(), expected.as_bytes())
        .is_ok()
}

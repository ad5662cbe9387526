// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::ConfigError;
use crate::model::StowageConfig;

static CSRF_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("CSRF key pattern compiles"));

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Whether `key` is usable as a CSRF session/form key.
pub fn is_valid_csrf_key(key: &str) -> bool {
    CSRF_KEY.is_match(key)
}

/// Validate semantic constraints serde cannot express.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &StowageConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.database.path.trim().is_empty() {
        fail("database.path must not be empty".to_string());
    }

    if config.retry.max_attempts < 1 {
        fail("retry.max_attempts must be at least 1".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.nonce.nonce_length < 1 {
        fail("nonce.nonce_length must be at least 1".to_string());
    }

    if config.nonce.lookup_length < 1 {
        fail("nonce.lookup_length must be at least 1".to_string());
    }

    if config.nonce.delimiter.is_empty() {
        fail("nonce.delimiter must not be empty".to_string());
    }

    if !is_valid_csrf_key(&config.csrf.key) {
        fail(format!(
            "csrf.key `{}` may only contain letters, digits, `-` and `_`",
            config.csrf.key
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&StowageConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_failure() {
        let mut config = StowageConfig::default();
        config.database.path = "  ".into();
        config.retry.max_attempts = 0;
        config.csrf.key = "csrf token!".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = StowageConfig::default();
        config.logging.level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("logging.level"));
    }

    #[test]
    fn csrf_key_charset() {
        assert!(is_valid_csrf_key("csrfToken"));
        assert!(is_valid_csrf_key("x-csrf_2"));
        assert!(!is_valid_csrf_key(""));
        assert!(!is_valid_csrf_key("csrf.token"));
    }
}

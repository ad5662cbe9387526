// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Stowage configuration system.

use stowage_config::diagnostic::ConfigError;
use stowage_config::model::StowageConfig;
use stowage_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[database]
path = "/tmp/stowage-test.db"
busy_timeout_ms = 50
wal_mode = false

[retry]
max_attempts = 4
backoff_ms = 20

[logging]
level = "debug"
log_sql = true

[nonce]
timeout_secs = 600
nonce_length = 32
lookup_length = 8
delimiter = "::"

[csrf]
key = "xsrf"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.database.path, "/tmp/stowage-test.db");
    assert_eq!(config.database.busy_timeout_ms, 50);
    assert!(!config.database.wal_mode);
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.backoff().as_millis(), 20);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.log_sql);
    assert_eq!(config.nonce.timeout_secs, 600);
    assert_eq!(config.nonce.nonce_length, 32);
    assert_eq!(config.nonce.lookup_length, 8);
    assert_eq!(config.nonce.delimiter, "::");
    assert_eq!(config.csrf.key, "xsrf");
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    let defaults = StowageConfig::default();
    assert_eq!(config.database.path, defaults.database.path);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.backoff_ms, 10);
    assert_eq!(config.database.busy_timeout_ms, 0);
    assert_eq!(config.nonce.delimiter, ":::");
    assert_eq!(config.csrf.key, "csrfToken");
}

#[test]
fn unknown_key_reports_suggestion() {
    let toml = "[retry]\nmax_atempts = 2\n";
    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "max_atempts");
            assert_eq!(suggestion.as_deref(), Some("max_attempts"));
            assert!(span.is_some(), "inline source should provide a span");
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_reports_invalid_type() {
    let toml = "[retry]\nmax_attempts = \"three\"\n";
    let errors = load_and_validate_str(toml).expect_err("string is not an integer");
    assert!(
        matches!(&errors[0], ConfigError::InvalidType { key, .. } if key.contains("max_attempts")),
        "got {errors:?}"
    );
}

#[test]
fn validation_runs_after_load() {
    let toml = "[retry]\nmax_attempts = 0\n";
    let errors = load_and_validate_str(toml).expect_err("zero attempts is invalid");
    assert!(matches!(&errors[0], ConfigError::Validation { .. }));
}

#[test]
fn config_error_converts_to_stowage_error() {
    let err: stowage_core::StowageError = ConfigError::Other("boom".into()).into();
    assert!(err.to_string().contains("boom"));
}

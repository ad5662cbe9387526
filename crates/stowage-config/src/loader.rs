// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./stowage.toml` > `~/.config/stowage/stowage.toml` >
//! `/etc/stowage/stowage.toml`, with `STOWAGE_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::StowageConfig;

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/stowage/stowage.toml`
/// 3. `~/.config/stowage/stowage.toml`
/// 4. `./stowage.toml`
/// 5. `STOWAGE_*` environment variables
pub fn load_config() -> Result<StowageConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<StowageConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StowageConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<StowageConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StowageConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(StowageConfig::default()))
        .merge(Toml::file("/etc/stowage/stowage.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("stowage/stowage.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("stowage.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `STOWAGE_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after the section name is turned into a dot, so
/// `STOWAGE_DATABASE_BUSY_TIMEOUT_MS` lands on `database.busy_timeout_ms`.
fn env_provider() -> Env {
    Env::prefixed("STOWAGE_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = ["database", "retry", "logging", "nonce", "csrf"]
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(*section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key_str);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STOWAGE_DATABASE_BUSY_TIMEOUT_MS", "250");
            jail.set_env("STOWAGE_RETRY_MAX_ATTEMPTS", "5");
            jail.set_env("STOWAGE_LOGGING_LOG_SQL", "true");

            let config = load_config()?;
            assert_eq!(config.database.busy_timeout_ms, 250);
            assert_eq!(config.retry.max_attempts, 5);
            assert!(config.logging.log_sql);
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "stowage.toml",
                r#"
                [retry]
                backoff_ms = 25
                "#,
            )?;

            let config = load_config()?;
            assert_eq!(config.retry.backoff_ms, 25);
            assert_eq!(config.retry.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn explicit_path_is_loaded() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[database]\npath = \"custom.db\"\n")?;
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.database.path, "custom.db");
            Ok(())
        });
    }
}

// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stowage - storage and nonce support services.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stowage_core::{ApiError, ParamValue};

/// Stowage - storage and nonce support services.
#[derive(Parser, Debug)]
#[command(name = "stowage", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the default hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a write with deadlock retries.
    Write {
        sql: String,
        /// Statement parameter as `name=value`. Repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Connection name (defaults to `isolated`).
        #[arg(long)]
        connection: Option<String>,
    },
    /// Run a query and print the rows as JSON.
    Query {
        sql: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Connection name (defaults to `default`).
        #[arg(long)]
        connection: Option<String>,
    },
    /// Issue and verify nonces.
    Nonce {
        #[command(subcommand)]
        command: NonceCommands,
    },
    /// Print the database engine version.
    Version,
}

#[derive(Subcommand, Debug)]
enum NonceCommands {
    /// Create and persist a nonce, printing its split token.
    Issue {
        #[arg(long)]
        entity: i64,
        #[arg(long)]
        action: String,
        /// Lifetime in seconds (defaults to `nonce.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Verify a split token for an action.
    Verify {
        token: String,
        #[arg(long)]
        action: String,
    },
}

/// Parse `name=value`. Integers, reals, `true`/`false`, and `null` are typed;
/// anything else is text.
fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in `{raw}`"));
    }
    let value = if value == "null" {
        ParamValue::Null
    } else if let Ok(b) = value.parse::<bool>() {
        ParamValue::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        ParamValue::Integer(i)
    } else if let Ok(r) = value.parse::<f64>() {
        ParamValue::Real(r)
    } else {
        ParamValue::Text(value.to_string())
    };
    Ok((name.to_string(), value))
}

fn init_tracing(log_level: &str, log_sql: bool) {
    use tracing_subscriber::EnvFilter;

    let mut directives = format!("stowage={log_level},warn");
    if log_sql {
        directives.push_str(",stowage::sql=debug");
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => stowage_config::load_and_validate_path(path),
        None => stowage_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            stowage_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.log_sql);

    match commands::run(cli.command, &config).await {
        Ok(output) => println!("{output}"),
        Err(err) => {
            let api = ApiError::from(err);
            eprintln!("{}", api.to_payload());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn params_are_typed() {
        assert_eq!(parse_param("id=7").unwrap(), ("id".into(), ParamValue::Integer(7)));
        assert_eq!(parse_param("r=0.5").unwrap(), ("r".into(), ParamValue::Real(0.5)));
        assert_eq!(parse_param("on=true").unwrap(), ("on".into(), ParamValue::Bool(true)));
        assert_eq!(parse_param("x=null").unwrap(), ("x".into(), ParamValue::Null));
        assert_eq!(
            parse_param("name=lobby=1").unwrap(),
            ("name".into(), ParamValue::Text("lobby=1".into()))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn cli_parses_write_with_params() {
        let cli = Cli::try_parse_from([
            "stowage",
            "--config",
            "x.toml",
            "write",
            "UPDATE t SET a = :a",
            "--param",
            "a=1",
            "--connection",
            "default",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Commands::Write {
                sql,
                params,
                connection,
            } => {
                assert_eq!(sql, "UPDATE t SET a = :a");
                assert_eq!(params, vec![("a".to_string(), ParamValue::Integer(1))]);
                assert_eq!(connection.as_deref(), Some("default"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_nonce_verify() {
        let cli =
            Cli::try_parse_from(["stowage", "nonce", "verify", "abc:::def", "--action", "login"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Nonce {
                command: NonceCommands::Verify { .. }
            }
        ));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = stowage_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.retry.max_attempts, 3);
    }
}

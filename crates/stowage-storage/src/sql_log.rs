// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Statement logging helpers.

use sha2::{Digest, Sha256};
use stowage_core::Params;
use tracing::debug;

/// Render a statement as a pasteable script: one `SET @name='value';` line per
/// parameter, then the statement with `:` placeholders turned into `@` variables.
pub fn render_sql(sql: &str, params: &Params) -> String {
    let mut out = String::new();
    for (name, value) in params {
        let name = name.trim_start_matches([':', '@', '$', '?']);
        out.push_str(&format!("SET @{name}='{value}';\n"));
    }
    out.push_str(&sql.replace(':', "@"));
    out
}

/// Short, stable identifier for a statement and its parameters.
///
/// The first 15 characters of the SQL followed by a SHA-256 of SQL and
/// parameters, so retries of the same write can be correlated in logs
/// without dumping the values.
pub fn query_hash(sql: &str, params: &Params) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher.update(serde_json::to_vec(params).unwrap_or_default());
    let head: String = sql.chars().take(15).collect();
    format!("{head}... [{}]", hex::encode(hasher.finalize()))
}

/// Log a statement at debug level when SQL logging is enabled.
pub fn log_sql(enabled: bool, sql: &str, params: &Params) {
    if enabled {
        debug!(target: "stowage::sql", "{}", render_sql(sql, params));
    }
}

#[cfg(test)]
mod tests {
    use stowage_core::params;

    use super::*;

    #[test]
    fn render_sql_sets_variables() {
        let params = params! { "id" => 4, ":name" => "lobby" };
        let rendered = render_sql("UPDATE display SET name = :name WHERE id = :id", &params);
        assert_eq!(
            rendered,
            "SET @id='4';\nSET @name='lobby';\nUPDATE display SET name = @name WHERE id = @id"
        );
    }

    #[test]
    fn query_hash_is_stable_and_param_sensitive() {
        let sql = "UPDATE schedule SET is_priority = :p";
        let a = query_hash(sql, &params! { "p" => 1 });
        let b = query_hash(sql, &params! { "p" => 1 });
        let c = query_hash(sql, &params! { "p" => 2 });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("UPDATE schedule... ["));
        assert!(a.ends_with(']'));
    }
}

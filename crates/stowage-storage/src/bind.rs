// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parameter binding between [`Params`] and rusqlite.

use rusqlite::types::{Value, ValueRef};
use rusqlite::ToSql;
use serde_json::Value as Json;
use stowage_core::{ParamValue, Params};

/// Parameters converted to SQLite values with normalized names.
#[derive(Debug, Clone)]
pub struct BoundParams(Vec<(String, Value)>);

impl BoundParams {
    pub fn new(params: &Params) -> Self {
        Self(
            params
                .iter()
                .map(|(name, value)| (placeholder(name), to_value(value)))
                .collect(),
        )
    }

    /// Borrowed `(name, value)` pairs in the shape rusqlite accepts as named params.
    pub fn as_named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

/// Placeholder name as it appears in SQL. A bare index binds the numbered
/// parameter `?N`; any other bare name gets a `:` prefix.
pub fn placeholder(name: &str) -> String {
    if name.starts_with([':', '@', '$', '?']) {
        name.to_string()
    } else if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        format!("?{name}")
    } else {
        format!(":{name}")
    }
}

pub fn to_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Null => Value::Null,
        ParamValue::Bool(b) => Value::Integer(i64::from(*b)),
        ParamValue::Integer(i) => Value::Integer(*i),
        ParamValue::Real(r) => Value::Real(*r),
        ParamValue::Text(s) => Value::Text(s.clone()),
    }
}

/// Column value as JSON. Blobs are hex-encoded.
pub fn to_json(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(r) => Json::from(r),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Json::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_gain_colon_prefix() {
        assert_eq!(placeholder("id"), ":id");
        assert_eq!(placeholder(":id"), ":id");
        assert_eq!(placeholder("@id"), "@id");
        assert_eq!(placeholder("$id"), "$id");
    }

    #[test]
    fn positional_keys_bind_numbered_parameters() {
        assert_eq!(placeholder("?1"), "?1");
        assert_eq!(placeholder("2"), "?2");
        assert_eq!(placeholder("p2"), ":p2");
    }

    #[test]
    fn booleans_bind_as_integers() {
        assert_eq!(to_value(&ParamValue::Bool(true)), Value::Integer(1));
        assert_eq!(to_value(&ParamValue::Bool(false)), Value::Integer(0));
    }

    #[test]
    fn bound_params_keep_every_entry() {
        let params = stowage_core::params! { "a" => 1, ":b" => "two" };
        let bound = BoundParams::new(&params);
        let names: Vec<&str> = bound.as_named().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec![":a", ":b"]);
    }

    #[test]
    fn blobs_render_as_hex() {
        assert_eq!(to_json(ValueRef::Blob(&[0xde, 0xad])), Json::from("dead"));
        assert_eq!(to_json(ValueRef::Null), Json::Null);
    }
}

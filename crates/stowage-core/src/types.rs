// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the storage and nonce crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Name of the connection used when a caller does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Name of the connection used for isolated and deadlock-protected writes.
pub const ISOLATED_CONNECTION: &str = "isolated";

/// A scalar statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Null => Ok(()),
            ParamValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Real(r) => write!(f, "{r}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Integer(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Real(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Named statement parameters. Keys may be given with or without the `:` prefix.
pub type Params = BTreeMap<String, ParamValue>;

/// Build a [`Params`] map from `name => value` pairs.
///
/// ```
/// use stowage_core::params;
///
/// let p = params! { "id" => 7, "name" => "lobby" };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::types::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::types::Params::new();
        $(map.insert(($key).to_string(), $crate::types::ParamValue::from($value));)+
        map
    }};
}

/// A single write to run against a named connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub statement: String,
    pub params: Params,
    pub connection: String,
}

impl WriteRequest {
    pub fn new(statement: impl Into<String>, params: Params) -> Self {
        Self {
            statement: statement.into(),
            params,
            connection: ISOLATED_CONNECTION.to_string(),
        }
    }

    pub fn on(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }
}

/// The kind of operation a statistics counter tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Exists,
    Insert,
    Update,
    Select,
    Commit,
    Utility,
}

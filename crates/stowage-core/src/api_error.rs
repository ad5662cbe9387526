// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application-facing error hierarchy with HTTP status mapping.
//!
//! Each variant knows its HTTP status and can render the JSON body that a
//! web layer returns to the client:
//!
//! ```
//! use stowage_core::ApiError;
//!
//! let err = ApiError::not_found().with_property("displayId");
//! assert_eq!(err.http_status(), 404);
//! assert_eq!(err.to_payload()["property"], "displayId");
//! ```

use serde_json::{json, Value};
use thiserror::Error;

use crate::error::StowageError;

/// Errors surfaced to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Catch-all failure. `code` doubles as the HTTP status when it is a valid one.
    #[error("{message}")]
    General { message: String, code: u16 },

    #[error("{message}")]
    AccessDenied { message: String },

    #[error("{message}")]
    AuthenticationRequired { message: String },

    #[error("{message}")]
    DuplicateEntity {
        message: String,
        property: Option<String>,
        help: Option<String>,
    },

    #[error("{message}")]
    InstanceSuspended {
        message: String,
        property: Option<String>,
        help: Option<String>,
    },

    #[error("{message}")]
    InvalidArgument {
        message: String,
        property: Option<String>,
        help: Option<String>,
    },

    #[error("{message}")]
    NotFound {
        message: String,
        property: Option<String>,
        help: Option<String>,
    },

    #[error("{message}")]
    InvalidNonce { message: String },
}

impl ApiError {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
            code: 500,
        }
    }

    pub fn access_denied() -> Self {
        Self::AccessDenied {
            message: "Access Denied".to_string(),
        }
    }

    pub fn authentication_required() -> Self {
        Self::AuthenticationRequired {
            message: "Authentication Required".to_string(),
        }
    }

    pub fn duplicate_entity(message: impl Into<String>) -> Self {
        Self::DuplicateEntity {
            message: message.into(),
            property: None,
            help: None,
        }
    }

    pub fn instance_suspended() -> Self {
        Self::InstanceSuspended {
            message: "Instance Suspended".to_string(),
            property: None,
            help: None,
        }
    }

    /// Build an invalid-argument error.
    ///
    /// An empty message becomes "Invalid Argument", followed by the property
    /// name when one is given.
    pub fn invalid_argument(message: impl Into<String>, property: Option<&str>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "Invalid Argument".to_string();
            if let Some(p) = property.filter(|p| !p.is_empty()) {
                message.push(' ');
                message.push_str(p);
            }
        }
        Self::InvalidArgument {
            message,
            property: property.map(str::to_string),
            help: None,
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound {
            message: "Not Found".to_string(),
            property: None,
            help: None,
        }
    }

    pub fn invalid_nonce() -> Self {
        Self::InvalidNonce {
            message: "Token Expired".to_string(),
        }
    }

    /// Attach the offending property name. No-op for variants without one.
    pub fn with_property(mut self, value: impl Into<String>) -> Self {
        if let Some((property, _)) = self.detail_mut() {
            *property = Some(value.into());
        }
        self
    }

    /// Attach a help hint. No-op for variants without one.
    pub fn with_help(mut self, value: impl Into<String>) -> Self {
        if let Some((_, help)) = self.detail_mut() {
            *help = Some(value.into());
        }
        self
    }

    fn detail_mut(&mut self) -> Option<(&mut Option<String>, &mut Option<String>)> {
        match self {
            Self::DuplicateEntity { property, help, .. }
            | Self::InstanceSuspended { property, help, .. }
            | Self::InvalidArgument { property, help, .. }
            | Self::NotFound { property, help, .. } => Some((property, help)),
            _ => None,
        }
    }

    /// HTTP status code for the response.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::General { code, .. } if (400..600).contains(code) => *code,
            Self::General { .. } | Self::InvalidNonce { .. } => 500,
            Self::AccessDenied { .. } | Self::AuthenticationRequired { .. } => 401,
            Self::DuplicateEntity { .. } => 409,
            Self::InstanceSuspended { .. } => 403,
            Self::InvalidArgument { .. } => 422,
            Self::NotFound { .. } => 404,
        }
    }

    /// Application error code placed in the `error` field of the payload.
    ///
    /// Variants that carry property details report their status, the rest 0.
    pub fn error_code(&self) -> u16 {
        match self {
            Self::General { code, .. } => *code,
            Self::DuplicateEntity { .. }
            | Self::InstanceSuspended { .. }
            | Self::InvalidArgument { .. }
            | Self::NotFound { .. } => self.http_status(),
            Self::AccessDenied { .. }
            | Self::AuthenticationRequired { .. }
            | Self::InvalidNonce { .. } => 0,
        }
    }

    /// JSON body for the response.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "error": self.error_code(),
            "message": self.to_string(),
        });
        let detail = match self {
            Self::DuplicateEntity { property, help, .. }
            | Self::InstanceSuspended { property, help, .. }
            | Self::InvalidArgument { property, help, .. }
            | Self::NotFound { property, help, .. } => Some((property, help)),
            _ => None,
        };
        if let (Some((property, help)), Some(map)) = (detail, payload.as_object_mut()) {
            map.insert("property".into(), json!(property));
            map.insert("help".into(), json!(help));
        }
        payload
    }
}

impl From<StowageError> for ApiError {
    fn from(err: StowageError) -> Self {
        match err {
            StowageError::DeadlockExceeded { max_attempts } => ApiError::general(format!(
                "Failed to write to database after {max_attempts} attempts. Please try again later."
            )),
            StowageError::InvalidNonce(message) => ApiError::InvalidNonce { message },
            other => ApiError::general(other.to_string()),
        }
    }
}

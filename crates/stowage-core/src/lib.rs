// SPDX-FileCopyrightText: 2026 Stowage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Stowage support services.
//!
//! This crate provides the error taxonomy used by every other crate in the
//! workspace, the API-facing error hierarchy with HTTP status mapping, and the
//! small value types (statement parameters, write requests, operation kinds)
//! that cross crate boundaries.

pub mod api_error;
pub mod error;
pub mod types;

pub use api_error::ApiError;
pub use error::StowageError;
pub use types::{
    OperationKind, ParamValue, Params, WriteRequest, DEFAULT_CONNECTION, ISOLATED_CONNECTION,
};

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn deadlock_exceeded_always_maps_to_server_error(attempts in 1u32..100) {
            let api: ApiError = StowageError::DeadlockExceeded { max_attempts: attempts }.into();
            prop_assert_eq!(api.http_status(), 500);
            let expected = format!("after {attempts} attempts");
            prop_assert!(api.to_string().contains(&expected));
        }

        #[test]
        fn integer_params_display_verbatim(v in any::<i64>()) {
            prop_assert_eq!(ParamValue::from(v).to_string(), v.to_string());
        }
    }
}

// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for CycleKit.
//!
//! Registration-time problems (a malformed trigger policy, a metadata create
//! call with a bad offset) surface synchronously through these variants. Data
//! path problems are usually counted and logged instead, see the engine's
//! diagnostics module.

use thiserror::Error;

/// Main error type for CycleKit operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CycleKitError {
    /// Malformed or contradictory request.
    ///
    /// Examples:
    /// - A trigger policy whose port counts don't match the module
    /// - A port given both a trigger affinity and a non-trigger classification
    /// - A module that uses a signal trigger policy asking for data triggers
    #[error("Bad parameter: {0}")]
    BadParam(String),

    /// Operation not valid for the module's capability set or current mode.
    ///
    /// Examples:
    /// - Changing the trigger policy of a bypassed module
    /// - Registering a trigger policy on the basic topology variant
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Pool or registry allocation failure.
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// Catch-all for constraint violations.
    #[error("Failed: {0}")]
    Failed(String),

    /// A referenced module, port or sub-graph doesn't exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration could not be parsed or validated.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using `CycleKitError`.
pub type Result<T> = std::result::Result<T, CycleKitError>;

impl CycleKitError {
    /// Short, stable name of the error kind, used as a metrics attribute.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadParam(_) => "bad_param",
            Self::Unsupported(_) => "unsupported",
            Self::NoMemory(_) => "no_memory",
            Self::Failed(_) => "failed",
            Self::NotFound(_) => "not_found",
            Self::Configuration(_) => "configuration",
        }
    }
}

// Allow conversion from CycleKitError to String
impl From<CycleKitError> for String {
    fn from(err: CycleKitError) -> Self {
        err.to_string()
    }
}

// Plain strings default to the generic failure kind
impl From<String> for CycleKitError {
    fn from(s: String) -> Self {
        Self::Failed(s)
    }
}

impl From<&str> for CycleKitError {
    fn from(s: &str) -> Self {
        Self::Failed(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CycleKitError::BadParam("group count mismatch".to_string());
        assert_eq!(err.to_string(), "Bad parameter: group count mismatch");

        let err = CycleKitError::Unsupported("module is bypassed".to_string());
        assert_eq!(err.to_string(), "Unsupported: module is bypassed");
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = CycleKitError::Failed("offset underflow".to_string());
        let s: String = err.into();
        assert_eq!(s, "Failed: offset underflow");
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: CycleKitError = "Something went wrong".into();
        assert_eq!(err.to_string(), "Failed: Something went wrong");
        assert_eq!(err.kind(), "failed");
    }
}

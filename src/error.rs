//! Error types for DictCore
//!
//! Only store access and user input can fail. DOM-level problems (detached
//! nodes, missing parents) are never errors: the engine skips the node.

use thiserror::Error;

use crate::dictionary::store::Namespace;

/// Failure reported by the external key-value store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Write would exceed the namespace quota
    #[error("quota exceeded in {namespace} storage: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        namespace: Namespace,
        needed: usize,
        quota: usize,
    },

    /// Store could not be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A value had an unexpected shape
    #[error("invalid value stored under {key:?}")]
    InvalidValue { key: String },
}

/// Main error type for DictCore operations
#[derive(Error, Debug)]
pub enum DictError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Dictionary text was not a JSON object of strings
    #[error("invalid dictionary: {0}")]
    InvalidDictionary(String),

    /// Allowlist text was not a JSON array of strings
    #[error("invalid allowlist: {0}")]
    InvalidAllowlist(String),

    #[error("terms must not be empty")]
    EmptyTerm,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for DictCore operations
pub type Result<T> = std::result::Result<T, DictError>;

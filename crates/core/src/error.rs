//! Error types for stowage-core
//!
//! Every backend SDK error is mapped into this closed taxonomy at the
//! provider boundary; raw SDK errors never reach callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for stowage-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-codes for credential validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required credential fields are absent or empty
    MissingFields,
    /// The backend rejected the key material
    AuthRejected,
    /// The configured bucket or container does not exist
    BucketNotFound,
    /// The backend could not be reached
    NetworkUnreachable,
    /// Credentials are valid but lack the needed permissions
    InsufficientPermissions,
    /// Anything the closed set above does not cover
    Unknown,
}

/// Sub-codes for single-object provider operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    NotFound,
    Forbidden,
    Network,
    Throttled,
    Unsupported,
    Other,
}

impl OperationErrorKind {
    /// Whether a caller should retry the operation with backoff
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            OperationErrorKind::Network | OperationErrorKind::Throttled
        )
    }
}

/// Error types for stowage-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Provider not initialized, or a structurally broken configuration.
    /// Fatal to the requested operation, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Stored credential blob unreadable (corrupted payload or wrong key).
    /// Surfaced to the tenant as "re-enter credentials".
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Live credential check failed
    #[error("Validation failed: {message}")]
    Validation {
        code: ValidationCode,
        message: String,
        suggestions: Vec<String>,
    },

    /// A single object operation failed against a live, validated provider
    #[error("Provider operation failed: {message}")]
    ProviderOperation {
        kind: OperationErrorKind,
        message: String,
    },

    /// One or more batch mappings failed or were unsupported
    #[error("Batch partially failed: {failed} of {total} mappings did not complete")]
    PartialBatch { failed: usize, total: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Build a `ProviderOperation` error with the given sub-code
    pub fn operation(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Error::ProviderOperation {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an operation the backend cannot perform natively
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::operation(OperationErrorKind::Unsupported, message)
    }

    /// True for operations the backend reported as not supported,
    /// as opposed to supported-but-failed
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::ProviderOperation {
                kind: OperationErrorKind::Unsupported,
                ..
            }
        )
    }

    /// Whether the caller may retry the failed operation with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ProviderOperation { kind, .. } => kind.is_transient(),
            Error::Validation { code, .. } => *code == ValidationCode::NetworkUnreachable,
            _ => false,
        }
    }
}

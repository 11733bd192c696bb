//! Error types for keychain-core

use thiserror::Error;

/// Result type alias for keychain operations
pub type Result<T> = std::result::Result<T, KeychainError>;

/// Keychain error types
#[derive(Error, Debug)]
pub enum KeychainError {
    #[error("The specified item could not be found in the keychain")]
    ItemNotFound,

    #[error("The specified item already exists in the keychain")]
    DuplicateItem,

    #[error("Expected a single keychain item but {count} matched")]
    AmbiguousMatch { count: usize },

    #[error("The keychain denied access to the item's secret data")]
    SecretUnavailable,

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Keychain unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl KeychainError {
    /// Shorthand for an `InvalidAttribute` error
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidAttribute(message.into())
    }

    /// Shorthand for a `StoreUnavailable` error
    pub(crate) fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    /// Whether this error reports a missing item
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound)
    }
}

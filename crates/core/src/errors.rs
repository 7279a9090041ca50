//! Error types

use thiserror::Error;

/// Price source errors, all transient: the next tick tries again
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Timeout after {0}ms waiting for price source")]
    Timeout(u64),

    #[error("Provider returned wrong status code {0}")]
    Status(u16),

    #[error("Invalid payload: {0}")]
    Decode(String),
}

/// Historical store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported store URI: {0}")]
    UnsupportedUri(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

/// Result type alias
pub type SourceResult<T> = Result<T, SourceError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Core error types

use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Layered configuration could not be built or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Key material could not be read from disk
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

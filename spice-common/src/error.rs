//! Common error types for spice services

use thiserror::Error;

/// Common result type for spice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across spice services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

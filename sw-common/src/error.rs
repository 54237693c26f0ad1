//! Common error types for Saving Willy services

use thiserror::Error;

/// Common result type for Saving Willy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared library
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

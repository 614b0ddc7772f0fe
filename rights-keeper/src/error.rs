//! Error types for the upkeep keeper

use thiserror::Error;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Keeper errors
#[derive(Error, Debug)]
pub enum Error {
    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] rights_core::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

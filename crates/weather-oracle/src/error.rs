//! Error types for the off-chain relay.

use thiserror::Error;

use crate::chain::ChainError;
use crate::config::ConfigError;

/// Errors that can stop the oracle process.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Configuration file or environment is unusable
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Chain call failed outside the per-request path
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Component initialization failed
    #[error("Init error: {0}")]
    Init(String),

    /// Runtime error during relay or gateway execution
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Generic I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OracleError>;

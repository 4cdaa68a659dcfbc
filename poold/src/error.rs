//! Error types for the pool node

use rpc_core::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    /// A mandatory constructor or initialize argument was not supplied.
    #[error("Invalid argument: {0} is required")]
    InvalidArgument(&'static str),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A factory was asked for a discriminator it has no constructor for.
    #[error("Unknown {kind} '{tag}'")]
    UnknownKind { kind: &'static str, tag: String },

    #[error("Entropy source failure: {0}")]
    Entropy(#[from] rand::Error),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Daemon error: {0}")]
    Daemon(#[from] RpcError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;

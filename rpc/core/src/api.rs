//! Daemon client contract

use async_trait::async_trait;
use crate::model::*;

/// The pool's only channel to the backing blockchain node.
///
/// Implementations must be safe for concurrent use: every manager and every
/// front-end service shares one instance.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Binds the client to a daemon endpoint. May perform a handshake.
    async fn initialize(&self, config: &DaemonConfig) -> Result<(), RpcError>;

    async fn get_block_template(&self) -> Result<BlockTemplate, RpcError>;
    async fn submit_block(&self, block_hex: &str) -> Result<(), RpcError>;
    async fn validate_address(&self, address: &str) -> Result<bool, RpcError>;
    async fn get_mining_info(&self) -> Result<MiningInfo, RpcError>;

    /// Releases the endpoint. Calls made afterwards fail with [`RpcError::Released`].
    async fn shutdown(&self);
}

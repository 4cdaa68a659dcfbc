//! Collaborator contracts
//!
//! The coordinator only ever holds these traits. Concrete managers, storage
//! backends and front-ends are plugged in through [`crate::factory`].

use async_trait::async_trait;
use crypto_hashes::PowHasher;
use rpc_core::{JsonRpcRequest, JsonRpcResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ProtocolConfig;
use crate::error::Result;
pub use crate::model::*;

/// Bookkeeping for connected miners across all front-ends.
#[async_trait]
pub trait MinerManager: Send + Sync {
    /// Adds a connection. Poll-based protocols pass no notifier.
    fn register(
        &self,
        kind: ProtocolKind,
        peer: SocketAddr,
        notifier: Option<mpsc::UnboundedSender<Arc<PoolJob>>>,
    ) -> Arc<Miner>;
    fn unregister(&self, id: MinerId);
    fn get(&self, id: MinerId) -> Option<Arc<Miner>>;
    fn count(&self) -> usize;

    /// Checks credentials and marks the miner authorized on success.
    async fn authorize(&self, miner: &Miner, username: &str, password: &str) -> bool;

    /// Pushes a job to every miner that takes notifications. Returns how many received it.
    fn notify_all(&self, job: Arc<PoolJob>) -> usize;

    /// Job most recently passed to `notify_all`, for miners that subscribe later.
    fn latest_job(&self) -> Option<Arc<PoolJob>>;
}

/// Owns the current work and its history.
///
/// Must tolerate concurrent reads from connection tasks while `broadcast`
/// installs a new job.
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Seeds the manager with the process instance id. Called exactly once.
    fn initialize(&self, instance_id: u32) -> Result<()>;

    /// Fetches fresh work and pushes it to every connected miner.
    /// A no-op when no miners are connected.
    async fn broadcast(&self) -> Result<()>;

    fn current(&self) -> Option<Arc<PoolJob>>;
    fn job(&self, id: &str) -> Option<Arc<PoolJob>>;

    /// Hands out a fresh extranonce1, namespaced by the instance id.
    fn next_extranonce1(&self) -> String;

    fn algorithm(&self) -> Arc<dyn PowHasher>;
}

#[async_trait]
pub trait ShareManager: Send + Sync {
    async fn submit(&self, submission: ShareSubmission) -> ShareResult;
}

pub trait Storage: Send + Sync {
    fn backend(&self) -> &'static str;
    fn record_share(&self, share: &ShareRecord) -> Result<()>;
    fn record_block(&self, block: &BlockRecord) -> Result<()>;
    fn share_count(&self) -> u64;
    fn block_count(&self) -> u64;
}

/// Network listener for one protocol kind. Owns the connections it accepts.
#[async_trait]
pub trait Server: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Applies the listener settings and binds the paired service.
    fn initialize(&self, config: &ProtocolConfig, service: Arc<dyn Service>) -> Result<()>;

    /// Begins accepting connections in the background and returns.
    async fn start(&self) -> Result<()>;

    /// Stops accepting, lets open connections finish their current request,
    /// and aborts whatever is left after `drain`.
    async fn stop(&self, drain: Duration) -> Result<()>;

    /// Bound address once started.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// What a service sees of the caller: the miner, the manager that owns it,
/// and the listener settings it connected through.
#[derive(Clone)]
pub struct MinerContext {
    pub miner: Arc<Miner>,
    pub miners: Arc<dyn MinerManager>,
    pub extranonce2_size: usize,
}

/// Answers protocol-level calls using the managers it was built with.
#[async_trait]
pub trait Service: Send + Sync {
    fn kind(&self) -> ProtocolKind;
    async fn handle(&self, ctx: &MinerContext, request: JsonRpcRequest) -> JsonRpcResponse;
}

//! In-process doubles shared by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_core::{BlockTemplate, DaemonClient, DaemonConfig, MiningInfo, RpcError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::fixtures;

/// Daemon that serves a settable template and accepts addresses starting with `valid`.
pub struct StubDaemon {
    pub template: Mutex<BlockTemplate>,
    pub submitted: Mutex<Vec<String>>,
    pub validations: AtomicUsize,
    pub fail_templates: Mutex<bool>,
}

impl StubDaemon {
    pub fn new() -> Self {
        Self {
            template: Mutex::new(fixtures::template(100, 0x01)),
            submitted: Mutex::new(Vec::new()),
            validations: AtomicUsize::new(0),
            fail_templates: Mutex::new(false),
        }
    }

    pub fn set_template(&self, template: BlockTemplate) {
        *self.template.lock() = template;
    }
}

#[async_trait]
impl DaemonClient for StubDaemon {
    async fn initialize(&self, _config: &DaemonConfig) -> Result<(), RpcError> {
        Ok(())
    }

    async fn get_block_template(&self) -> Result<BlockTemplate, RpcError> {
        if *self.fail_templates.lock() {
            return Err(RpcError::Network("connection refused".to_string()));
        }
        Ok(self.template.lock().clone())
    }

    async fn submit_block(&self, block_hex: &str) -> Result<(), RpcError> {
        self.submitted.lock().push(block_hex.to_string());
        Ok(())
    }

    async fn validate_address(&self, address: &str) -> Result<bool, RpcError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        Ok(address.starts_with("valid"))
    }

    async fn get_mining_info(&self) -> Result<MiningInfo, RpcError> {
        Ok(MiningInfo {
            blocks: 100,
            difficulty: 1.0,
            network_hash_ps: 1_000.0,
            chain: "regtest".to_string(),
        })
    }

    async fn shutdown(&self) {}
}

pub fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

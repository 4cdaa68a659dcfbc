use async_trait::async_trait;
use parking_lot::RwLock;
use rpc_core::DaemonClient;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::*;

/// Upper bound on remembered payout addresses
const MAX_CACHED_ADDRESSES: usize = 4096;

/// Tracks connected miners and which payout addresses the daemon accepted.
pub struct PoolMinerManager {
    daemon: Arc<dyn DaemonClient>,
    next_id: AtomicU64,
    miners: RwLock<HashMap<MinerId, Arc<Miner>>>,
    /// Payout addresses the daemon accepted
    addresses: RwLock<HashSet<String>>,
    latest_job: RwLock<Option<Arc<PoolJob>>>,
}

impl PoolMinerManager {
    pub fn new(daemon: Arc<dyn DaemonClient>) -> Self {
        Self {
            daemon,
            next_id: AtomicU64::new(1),
            miners: RwLock::new(HashMap::new()),
            addresses: RwLock::new(HashSet::new()),
            latest_job: RwLock::new(None),
        }
    }

    async fn address_is_valid(&self, address: &str) -> bool {
        if self.addresses.read().contains(address) {
            return true;
        }

        match self.daemon.validate_address(address).await {
            Ok(true) => {
                let mut addresses = self.addresses.write();
                if addresses.len() >= MAX_CACHED_ADDRESSES {
                    addresses.clear();
                }
                addresses.insert(address.to_string());
                true
            }
            Ok(false) => false,
            Err(e) => {
                // Not cached: the next attempt asks the daemon again.
                warn!("Could not validate address {}: {}", address, e);
                false
            }
        }
    }
}

/// Payout address part of a `address.worker` username.
fn payout_address(username: &str) -> &str {
    username.split('.').next().unwrap_or_default().trim()
}

#[async_trait]
impl MinerManager for PoolMinerManager {
    fn register(
        &self,
        kind: ProtocolKind,
        peer: SocketAddr,
        notifier: Option<mpsc::UnboundedSender<Arc<PoolJob>>>,
    ) -> Arc<Miner> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let miner = Arc::new(Miner::new(id, kind, peer, notifier));
        self.miners.write().insert(id, miner.clone());
        debug!("Registered {} miner {} from {}", kind, id, peer);
        miner
    }

    fn unregister(&self, id: MinerId) {
        if self.miners.write().remove(&id).is_some() {
            debug!("Unregistered miner {}", id);
        }
    }

    fn get(&self, id: MinerId) -> Option<Arc<Miner>> {
        self.miners.read().get(&id).cloned()
    }

    fn count(&self) -> usize {
        self.miners.read().len()
    }

    async fn authorize(&self, miner: &Miner, username: &str, _password: &str) -> bool {
        let address = payout_address(username);
        if address.is_empty() {
            return false;
        }

        let valid = self.address_is_valid(address).await;
        if valid {
            miner.update_session(|session| {
                session.username = Some(username.to_string());
                session.authorized = true;
            });
            info!("Authorized miner {} as {}", miner.id(), username);
        } else {
            debug!("Rejected miner {} credentials {}", miner.id(), username);
        }
        valid
    }

    fn notify_all(&self, job: Arc<PoolJob>) -> usize {
        *self.latest_job.write() = Some(job.clone());

        self.miners
            .read()
            .values()
            .filter(|miner| miner.notify(job.clone()))
            .count()
    }

    fn latest_job(&self) -> Option<Arc<PoolJob>> {
        self.latest_job.read().clone()
    }
}

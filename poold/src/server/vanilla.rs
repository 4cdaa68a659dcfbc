use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::{Mutex, RwLock};
use rpc_core::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Binding, Running};
use crate::api::*;
use crate::config::ProtocolConfig;
use crate::error::{PoolError, Result};

type Peers = Arc<Mutex<HashMap<IpAddr, Peer>>>;

/// JSON-RPC over HTTP `POST /`. Miners are identified by peer address.
pub struct VanillaServer {
    miners: Arc<dyn MinerManager>,
    peers: Peers,
    binding: RwLock<Option<Binding>>,
    running: Mutex<Option<Running>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

struct Peer {
    miner: Arc<Miner>,
    last_seen: Instant,
}

#[derive(Clone)]
struct AppState {
    binding: Binding,
    miners: Arc<dyn MinerManager>,
    peers: Peers,
}

impl AppState {
    /// Miner for a peer address, registering it on first contact.
    fn miner(&self, address: SocketAddr) -> Option<Arc<Miner>> {
        let now = Instant::now();
        let mut peers = self.peers.lock();
        if let Some(peer) = peers.get_mut(&address.ip()) {
            peer.last_seen = now;
            return Some(peer.miner.clone());
        }

        evict_idle(&mut peers, self.miners.as_ref(), self.binding.config.idle_timeout(), now);
        if peers.len() >= self.binding.config.max_connections {
            return None;
        }
        let miner = self.miners.register(ProtocolKind::Vanilla, address, None);
        peers.insert(
            address.ip(),
            Peer {
                miner: miner.clone(),
                last_seen: now,
            },
        );
        Some(miner)
    }
}

/// Unregisters every peer silent for at least `idle`.
fn evict_idle(peers: &mut HashMap<IpAddr, Peer>, miners: &dyn MinerManager, idle: Duration, now: Instant) {
    peers.retain(|ip, peer| {
        if now.duration_since(peer.last_seen) < idle {
            return true;
        }
        debug!("Forgetting idle vanilla miner {} at {}", peer.miner.id(), ip);
        miners.unregister(peer.miner.id());
        false
    });
}

async fn sweep_idle(peers: Peers, miners: Arc<dyn MinerManager>, idle: Duration, mut shutdown: watch::Receiver<bool>) {
    let period = idle.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => evict_idle(&mut peers.lock(), miners.as_ref(), idle, Instant::now()),
        }
    }
}

impl VanillaServer {
    pub fn new(miners: Arc<dyn MinerManager>) -> Self {
        Self {
            miners,
            peers: Arc::new(Mutex::new(HashMap::new())),
            binding: RwLock::new(None),
            running: Mutex::new(None),
            local_addr: RwLock::new(None),
        }
    }

    pub fn router(&self) -> Result<Router> {
        let binding = self
            .binding
            .read()
            .clone()
            .ok_or_else(|| PoolError::Server("vanilla server is not initialized".to_string()))?;
        let state = AppState {
            binding,
            miners: self.miners.clone(),
            peers: self.peers.clone(),
        };
        Ok(Router::new().route("/", post(handle_rpc)).with_state(state))
    }

    fn forget_miners(&self) {
        for (_, peer) in self.peers.lock().drain() {
            self.miners.unregister(peer.miner.id());
        }
    }
}

async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    let Some(miner) = state.miner(peer) else {
        return Json(JsonRpcResponse::failure(
            request.id,
            JsonRpcError::new(-1, "Too many miners"),
        ));
    };
    let ctx = MinerContext {
        miner,
        miners: state.miners.clone(),
        extranonce2_size: state.binding.config.extranonce2_size,
    };
    Json(state.binding.service.handle(&ctx, request).await)
}

#[async_trait]
impl Server for VanillaServer {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Vanilla
    }

    fn initialize(&self, config: &ProtocolConfig, service: Arc<dyn Service>) -> Result<()> {
        if self.running.lock().is_some() {
            return Err(PoolError::Server("vanilla server is already running".to_string()));
        }
        *self.binding.write() = Some(Binding {
            config: config.clone(),
            service,
        });
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let router = self.router()?;
        if self.running.lock().is_some() {
            return Err(PoolError::Server("vanilla server is already running".to_string()));
        }

        let config = self
            .binding
            .read()
            .as_ref()
            .map(|binding| binding.config.clone())
            .ok_or_else(|| PoolError::Server("vanilla server is not initialized".to_string()))?;
        let address = config.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| PoolError::Server(format!("Failed to bind vanilla on {}: {}", address, e)))?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write() = Some(local_addr);
        info!("Vanilla server listening on {}", local_addr);

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let sweeper = sweep_idle(
            self.peers.clone(),
            self.miners.clone(),
            config.idle_timeout(),
            shutdown_rx.clone(),
        );
        let task = tokio::spawn(async move {
            let sweeper = tokio::spawn(sweeper);
            let served = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await;
            sweeper.abort();
            if let Err(e) = served {
                error!("Vanilla server error: {}", e);
            }
        });
        *self.running.lock() = Some(Running { shutdown, task });
        Ok(())
    }

    async fn stop(&self, drain: Duration) -> Result<()> {
        let running = self.running.lock().take();
        let Some(Running { shutdown, mut task }) = running else {
            return Ok(());
        };

        let _ = shutdown.send(true);
        if tokio::time::timeout(drain, &mut task).await.is_err() {
            warn!("Vanilla requests did not drain within {:?}, aborting", drain);
            task.abort();
        }
        self.forget_miners();
        *self.local_addr.write() = None;
        info!("Vanilla server stopped");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_manager::PoolJobManager;
    use crate::miner_manager::PoolMinerManager;
    use crate::service::VanillaService;
    use crate::share_manager::PoolShareManager;
    use crate::storage_manager::NullStorage;
    use crate::test_utils::StubDaemon;
    use crypto_hashes::Sha256d;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn service(miners: Arc<PoolMinerManager>) -> Arc<VanillaService> {
        let daemon = Arc::new(StubDaemon::new());
        let jobs = Arc::new(PoolJobManager::new(daemon.clone(), miners, Arc::new(Sha256d)));
        jobs.initialize(0x42).unwrap();
        let shares = Arc::new(PoolShareManager::new(daemon.clone(), jobs.clone(), Arc::new(NullStorage)));
        Arc::new(VanillaService::new(jobs, shares, daemon))
    }

    fn server() -> (Arc<PoolMinerManager>, VanillaServer) {
        let miners = Arc::new(PoolMinerManager::new(Arc::new(StubDaemon::new())));
        let server = VanillaServer::new(miners.clone());
        server
            .initialize(&ProtocolConfig::new("127.0.0.1", 0), service(miners.clone()))
            .unwrap();
        (miners, server)
    }

    fn state(max_connections: usize, idle_timeout_secs: u64) -> (Arc<PoolMinerManager>, AppState) {
        let miners = Arc::new(PoolMinerManager::new(Arc::new(StubDaemon::new())));
        let mut config = ProtocolConfig::new("127.0.0.1", 0);
        config.max_connections = max_connections;
        config.idle_timeout_secs = idle_timeout_secs;
        let state = AppState {
            binding: Binding {
                config,
                service: service(miners.clone()),
            },
            miners: miners.clone(),
            peers: Arc::new(Mutex::new(HashMap::new())),
        };
        (miners, state)
    }

    fn remote(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last_octet], 40000))
    }

    /// Minimal HTTP/1.1 client: one request per connection.
    async fn post(addr: SocketAddr, body: Value) -> Value {
        let body = body.to_string();
        let request = format!(
            "POST / HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            addr,
            body.len(),
            body
        );
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200"), "{}", head);
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_router_requires_initialize() {
        let daemon = Arc::new(StubDaemon::new());
        let server = VanillaServer::new(Arc::new(PoolMinerManager::new(daemon)));
        assert!(server.router().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_peer_frees_its_slot() {
        let (miners, state) = state(1, 60);

        let first = state.miner(remote(1)).unwrap();
        assert!(state.miner(remote(2)).is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        let second = state.miner(remote(2)).unwrap();
        assert_ne!(first.id(), second.id());
        assert!(miners.get(first.id()).is_none());
        assert_eq!(miners.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_keep_peer_alive() {
        let (miners, state) = state(1, 60);

        let miner = state.miner(remote(1)).unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(40)).await;
            assert_eq!(state.miner(remote(1)).unwrap().id(), miner.id());
        }
        assert!(state.miner(remote(2)).is_none());
        assert_eq!(miners.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_unregisters_idle_peers() {
        let (miners, state) = state(8, 60);
        state.miner(remote(1)).unwrap();
        state.miner(remote(2)).unwrap();
        assert_eq!(miners.count(), 2);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = tokio::spawn(sweep_idle(
            state.peers.clone(),
            state.miners.clone(),
            Duration::from_secs(60),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(miners.count(), 0);
        assert!(state.peers.lock().is_empty());

        shutdown.send(true).unwrap();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_getwork_over_http() {
        let (miners, server) = server();
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let work = post(addr, json!({"id": 7, "method": "getwork", "params": ["valid-addr.rig"]})).await;
        assert_eq!(work["id"], json!(7));
        assert_eq!(work["result"]["extranonce1"], json!("0000004200000000"));
        assert_eq!(miners.count(), 1);

        // Same peer address, same miner
        let info = post(addr, json!({"id": 8, "method": "getmininginfo"})).await;
        assert_eq!(info["result"]["chain"], json!("regtest"));
        assert_eq!(miners.count(), 1);

        server.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(miners.count(), 0);
        assert!(TcpStream::connect(addr).await.is_err());
    }
}

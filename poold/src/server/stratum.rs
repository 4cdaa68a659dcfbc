use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rpc_core::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{Binding, Running};
use crate::api::*;
use crate::config::ProtocolConfig;
use crate::error::{PoolError, Result};

type Connected = Arc<Mutex<HashSet<MinerId>>>;

/// Line-delimited JSON-RPC over TCP.
pub struct StratumServer {
    miners: Arc<dyn MinerManager>,
    /// Miners of live connections
    connected: Connected,
    binding: RwLock<Option<Binding>>,
    running: Mutex<Option<Running>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl StratumServer {
    pub fn new(miners: Arc<dyn MinerManager>) -> Self {
        Self {
            miners,
            connected: Arc::new(Mutex::new(HashSet::new())),
            binding: RwLock::new(None),
            running: Mutex::new(None),
            local_addr: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Server for StratumServer {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Stratum
    }

    fn initialize(&self, config: &ProtocolConfig, service: Arc<dyn Service>) -> Result<()> {
        if self.running.lock().is_some() {
            return Err(PoolError::Server("stratum server is already running".to_string()));
        }
        *self.binding.write() = Some(Binding {
            config: config.clone(),
            service,
        });
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let binding = self
            .binding
            .read()
            .clone()
            .ok_or_else(|| PoolError::Server("stratum server is not initialized".to_string()))?;
        if self.running.lock().is_some() {
            return Err(PoolError::Server("stratum server is already running".to_string()));
        }

        let address = binding.config.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| PoolError::Server(format!("Failed to bind stratum on {}: {}", address, e)))?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write() = Some(local_addr);
        info!("Stratum server listening on {}", local_addr);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            binding,
            self.miners.clone(),
            self.connected.clone(),
            shutdown_rx,
        ));
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
            warn!("Stratum connections did not drain within {:?}, aborting", drain);
            task.abort();
        }
        // Aborted connections never reach their own cleanup.
        for id in self.connected.lock().drain() {
            self.miners.unregister(id);
        }
        *self.local_addr.write() = None;
        info!("Stratum server stopped");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

async fn accept_loop(
    listener: TcpListener,
    binding: Binding,
    miners: Arc<dyn MinerManager>,
    connected: Connected,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if connections.len() >= binding.config.max_connections {
                        warn!("Refusing stratum connection from {}: limit of {} reached", peer, binding.config.max_connections);
                        continue;
                    }
                    debug!("New stratum connection from {}", peer);
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        binding.clone(),
                        miners.clone(),
                        connected.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => error!("Failed to accept stratum connection: {}", e),
            },
        }
    }

    // Stop accepting, then let every connection finish its current request.
    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    binding: Binding,
    miners: Arc<dyn MinerManager>,
    connected: Connected,
    mut shutdown: watch::Receiver<bool>,
) {
    let (notifier, mut jobs) = mpsc::unbounded_channel();
    let miner = miners.register(ProtocolKind::Stratum, peer, Some(notifier));
    connected.lock().insert(miner.id());
    let ctx = MinerContext {
        miner: miner.clone(),
        miners: miners.clone(),
        extranonce2_size: binding.config.extranonce2_size,
    };

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stratum read from {} failed: {}", peer, e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let was_subscribed = miner.session().subscribed;
                let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                    Ok(request) => binding.service.handle(&ctx, request).await,
                    Err(e) => JsonRpcResponse::failure(
                        None,
                        JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
                    ),
                };
                if write_line(&mut writer, &response).await.is_err() {
                    break;
                }

                // Fresh subscribers get the current job straight away.
                if !was_subscribed && miner.session().subscribed {
                    if let Some(job) = miners.latest_job() {
                        if write_line(&mut writer, &notify_message(&job)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(job) = jobs.recv() => {
                if !miner.session().subscribed {
                    continue;
                }
                if write_line(&mut writer, &notify_message(&job)).await.is_err() {
                    break;
                }
            }
        }
    }

    connected.lock().remove(&miner.id());
    miners.unregister(miner.id());
    debug!("Stratum connection from {} closed", peer);
}

/// `mining.notify` for a job: id, previous hash, version, bits, ntime, clean.
fn notify_message(job: &PoolJob) -> JsonRpcRequest {
    JsonRpcRequest::notification(
        "mining.notify",
        json!([
            job.id,
            job.previous_hash.to_string(),
            format!("{:08x}", job.version),
            format!("{:08x}", job.bits),
            format!("{:08x}", job.cur_time),
            job.clean
        ]),
    )
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, message: &T) -> io::Result<()> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await
}

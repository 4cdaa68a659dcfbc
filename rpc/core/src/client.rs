//! WebSocket JSON-RPC client for the blockchain daemon

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

use crate::api::DaemonClient;
use crate::model::*;

/// Daemon client that opens one WebSocket exchange per call.
///
/// Holding no shared stream keeps the client safe for any number of
/// concurrent callers; request ids come from an atomic counter.
pub struct WsDaemonClient {
    config: RwLock<Option<DaemonConfig>>,
    next_id: AtomicU64,
    released: AtomicBool,
}

impl WsDaemonClient {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(None),
            next_id: AtomicU64::new(1),
            released: AtomicBool::new(false),
        }
    }

    /// Currently bound endpoint, if initialized.
    pub fn endpoint(&self) -> Option<String> {
        self.config.read().as_ref().map(|c| c.url.clone())
    }

    async fn call_method(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.released.load(Ordering::Acquire) {
            return Err(RpcError::Released);
        }
        let (url, timeout_secs) = {
            let guard = self.config.read();
            let config = guard.as_ref().ok_or(RpcError::NotInitialized)?;
            (config.url.clone(), config.timeout_secs)
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            Self::exchange(&url, id, method, params),
        )
        .await
        .map_err(|_| RpcError::Timeout(timeout_secs))?
    }

    async fn exchange(url: &str, id: u64, method: &str, params: Value) -> Result<Value, RpcError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| RpcError::Network(format!("WebSocket connection failed: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();

        let request = JsonRpcRequest::new(id, method, params);
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RpcError::Internal(format!("Request serialization failed: {}", e)))?;

        write
            .send(Message::Text(request_json))
            .await
            .map_err(|e| RpcError::Network(format!("Send failed: {}", e)))?;

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let response: JsonRpcResponse = serde_json::from_str(&text)
                        .map_err(|e| RpcError::Internal(format!("Response parsing failed: {}", e)))?;

                    if response.id != Some(json!(id)) {
                        continue; // Not our response
                    }

                    if let Some(error) = response.error {
                        return Err(RpcError::Rpc {
                            code: error.code,
                            message: error.message,
                        });
                    }

                    let _ = write.send(Message::Close(None)).await;
                    return Ok(response.result);
                }
                Ok(Message::Close(_)) => break,
                Err(e) => return Err(RpcError::Network(format!("WebSocket error: {}", e))),
                _ => continue,
            }
        }

        Err(RpcError::Network("Connection closed without response".to_string()))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.call_method(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Internal(format!("Deserialization error in {}: {}", method, e)))
    }
}

impl Default for WsDaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DaemonClient for WsDaemonClient {
    async fn initialize(&self, config: &DaemonConfig) -> Result<(), RpcError> {
        if let Some(problem) = config.problem() {
            return Err(RpcError::InvalidConfig(problem));
        }
        *self.config.write() = Some(config.clone());
        self.released.store(false, Ordering::Release);
        info!("Daemon client bound to {}", config.url);
        Ok(())
    }

    async fn get_block_template(&self) -> Result<BlockTemplate, RpcError> {
        self.call("getblocktemplate", json!([{ "rules": ["segwit"] }])).await
    }

    async fn submit_block(&self, block_hex: &str) -> Result<(), RpcError> {
        // bitcoind style: null on success, a reason string on rejection
        let result: Value = self.call_method("submitblock", json!([block_hex])).await?;
        match result {
            Value::Null => Ok(()),
            Value::String(reason) => Err(RpcError::Rpc { code: -1, message: reason }),
            other => Err(RpcError::Internal(format!("Unexpected submitblock result: {}", other))),
        }
    }

    async fn validate_address(&self, address: &str) -> Result<bool, RpcError> {
        let result = self.call_method("validateaddress", json!([address])).await?;
        Ok(result.get("isvalid").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get_mining_info(&self) -> Result<MiningInfo, RpcError> {
        self.call("getmininginfo", json!([])).await
    }

    async fn shutdown(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("Daemon client released");
        }
    }
}

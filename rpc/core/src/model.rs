//! RPC data models and types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// RPC error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid daemon configuration: {0}")]
    InvalidConfig(String),

    #[error("Daemon request timed out after {0}s")]
    Timeout(u64),

    #[error("Daemon client is not initialized")]
    NotInitialized,

    #[error("Daemon client has been released")]
    Released,
}

/// Daemon connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// WebSocket endpoint, `ws://` or `wss://`
    pub url: String,
    pub timeout_secs: u64,
    /// Address the daemon pays block rewards to
    pub pay_address: String,
}

impl DaemonConfig {
    /// Describes why the section cannot be used, if it cannot.
    pub fn problem(&self) -> Option<String> {
        let url = match url::Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => return Some(format!("daemon url '{}' is not a valid url: {}", self.url, e)),
        };
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Some(format!("daemon url scheme must be ws or wss, got '{}'", url.scheme()));
        }
        if url.host_str().is_none() {
            return Some(format!("daemon url '{}' has no host", self.url));
        }
        if self.timeout_secs == 0 {
            return Some("daemon timeout_secs must be positive".to_string());
        }
        None
    }

    pub fn is_valid(&self) -> bool {
        self.problem().is_none()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:16110".to_string(),
            timeout_secs: 5,
            pay_address: String::new(),
        }
    }
}

/// Block template as returned by `getblocktemplate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub version: u32,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: u64,
    /// Network target, 64 hex characters
    pub target: String,
    #[serde(rename = "curtime")]
    pub cur_time: u64,
    pub bits: String,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTransaction {
    /// Raw transaction, hex encoded
    pub data: String,
    #[serde(default)]
    pub hash: String,
}

/// Mining information as returned by `getmininginfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningInfo {
    pub blocks: u64,
    pub difficulty: f64,
    #[serde(rename = "networkhashps")]
    pub network_hash_ps: f64,
    pub chain: String,
}

/// A JSON-RPC request, as received from miners or sent to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// A server-initiated notification (`id: null`), as used by `mining.notify`.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: None,
            id: Some(Value::Null),
            method: method.into(),
            params,
        }
    }

    /// Positional parameter `index` as a string, if present.
    pub fn param_str(&self, index: usize) -> Option<&str> {
        self.params.get(index).and_then(Value::as_str)
    }
}

/// A JSON-RPC response. `result` and `error` are always serialized, since
/// stratum clients expect an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { id, result, error: None }
    }

    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }
}

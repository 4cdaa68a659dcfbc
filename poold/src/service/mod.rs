//! Protocol services: answer miner requests against the shared managers

mod stratum;
mod vanilla;

pub use stratum::StratumService;
pub use vanilla::VanillaService;

use rpc_core::{JsonRpcError, JsonRpcResponse};
use serde_json::{json, Value};

use crate::api::{RejectReason, ShareResult};

/// Error returned when a request needs an authorized miner.
pub(crate) fn unauthorized(id: Option<Value>) -> JsonRpcResponse {
    let reason = RejectReason::Unauthorized;
    JsonRpcResponse::failure(id, JsonRpcError::new(reason.code(), reason.to_string()))
}

/// Maps a share verdict onto a JSON-RPC reply.
pub(crate) fn share_response(id: Option<Value>, result: ShareResult) -> JsonRpcResponse {
    match result {
        ShareResult::Accepted { .. } => JsonRpcResponse::success(id, json!(true)),
        ShareResult::Rejected(reason) => {
            JsonRpcResponse::failure(id, JsonRpcError::new(reason.code(), reason.to_string()))
        }
    }
}

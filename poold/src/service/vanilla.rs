use async_trait::async_trait;
use rpc_core::{DaemonClient, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{share_response, unauthorized};
use crate::api::*;

/// Poll-based work protocol: miners ask for work, then post solutions.
pub struct VanillaService {
    jobs: Arc<dyn JobManager>,
    shares: Arc<dyn ShareManager>,
    daemon: Arc<dyn DaemonClient>,
}

impl VanillaService {
    pub fn new(jobs: Arc<dyn JobManager>, shares: Arc<dyn ShareManager>, daemon: Arc<dyn DaemonClient>) -> Self {
        Self { jobs, shares, daemon }
    }

    /// Current job, fetching one on demand when nothing was broadcast yet.
    async fn work(&self) -> Option<Arc<PoolJob>> {
        if let Some(job) = self.jobs.current() {
            return Some(job);
        }
        if let Err(e) = self.jobs.broadcast().await {
            warn!("Could not fetch work for vanilla miner: {}", e);
        }
        self.jobs.current()
    }

    async fn get_work(&self, ctx: &MinerContext, request: &JsonRpcRequest) -> JsonRpcResponse {
        if let Some(username) = request.param_str(0) {
            if ctx.miner.session().username.as_deref() != Some(username) {
                ctx.miners.authorize(&ctx.miner, username, "").await;
            }
        }
        if !ctx.miner.is_authorized() {
            return unauthorized(request.id.clone());
        }

        let Some(job) = self.work().await else {
            return JsonRpcResponse::failure(request.id.clone(), JsonRpcError::new(-1, "No work available"));
        };

        let extranonce1 = match ctx.miner.session().extranonce1 {
            Some(extranonce1) => extranonce1,
            None => {
                let extranonce1 = self.jobs.next_extranonce1();
                ctx.miner
                    .update_session(|session| session.extranonce1 = Some(extranonce1.clone()));
                extranonce1
            }
        };

        JsonRpcResponse::success(
            request.id.clone(),
            json!({
                "jobId": job.id,
                "height": job.height,
                "version": format!("{:08x}", job.version),
                "previousHash": job.previous_hash.to_string(),
                "bits": format!("{:08x}", job.bits),
                "ntime": format!("{:08x}", job.cur_time),
                "target": job.target.to_string(),
                "extranonce1": extranonce1,
                "extranonce2Size": ctx.extranonce2_size,
            }),
        )
    }

    async fn submit_work(&self, ctx: &MinerContext, request: &JsonRpcRequest) -> JsonRpcResponse {
        let session = ctx.miner.session();
        let (Some(username), Some(extranonce1)) = (session.username, session.extranonce1) else {
            return unauthorized(request.id.clone());
        };
        if !session.authorized {
            return unauthorized(request.id.clone());
        }

        let (Some(job_id), Some(extranonce2), Some(ntime), Some(nonce)) = (
            request.param_str(0),
            request.param_str(1),
            request.param_str(2),
            request.param_str(3),
        ) else {
            return JsonRpcResponse::failure(
                request.id.clone(),
                JsonRpcError::invalid_params("expected [job_id, extranonce2, ntime, nonce]"),
            );
        };

        let result = self
            .shares
            .submit(ShareSubmission {
                miner: ctx.miner.id(),
                username,
                job_id: job_id.to_string(),
                extranonce1,
                extranonce2: extranonce2.to_string(),
                ntime: ntime.to_string(),
                nonce: nonce.to_string(),
            })
            .await;
        debug!("Vanilla share from {} for job {}: {:?}", ctx.miner.peer(), job_id, result);
        share_response(request.id.clone(), result)
    }

    async fn mining_info(&self, id: Option<Value>) -> JsonRpcResponse {
        let info = self
            .daemon
            .get_mining_info()
            .await
            .map_err(|e| e.to_string())
            .and_then(|info| serde_json::to_value(info).map_err(|e| e.to_string()));

        match info {
            Ok(info) => JsonRpcResponse::success(id, info),
            Err(e) => JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e)),
        }
    }
}

#[async_trait]
impl Service for VanillaService {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Vanilla
    }

    async fn handle(&self, ctx: &MinerContext, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "getwork" => self.get_work(ctx, &request).await,
            "submitwork" => self.submit_work(ctx, &request).await,
            "getmininginfo" => self.mining_info(request.id.clone()).await,
            method => JsonRpcResponse::failure(request.id.clone(), JsonRpcError::method_not_found(method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_manager::PoolJobManager;
    use crate::miner_manager::PoolMinerManager;
    use crate::share_manager::PoolShareManager;
    use crate::storage_manager::MemoryStorage;
    use crate::test_utils::{peer, StubDaemon};
    use crypto_hashes::Sha256d;

    fn harness() -> (VanillaService, MinerContext) {
        let daemon = Arc::new(StubDaemon::new());
        let miners = Arc::new(PoolMinerManager::new(daemon.clone()));
        let jobs = Arc::new(PoolJobManager::new(daemon.clone(), miners.clone(), Arc::new(Sha256d)));
        jobs.initialize(0x11).unwrap();
        let shares = Arc::new(PoolShareManager::new(
            daemon.clone(),
            jobs.clone(),
            Arc::new(MemoryStorage::new()),
        ));
        let miner = miners.register(ProtocolKind::Vanilla, peer(9), None);
        let ctx = MinerContext {
            miner,
            miners,
            extranonce2_size: 4,
        };
        (VanillaService::new(jobs, shares, daemon), ctx)
    }

    #[tokio::test]
    async fn test_getwork_requires_credentials() {
        let (service, ctx) = harness();
        let response = service
            .handle(&ctx, JsonRpcRequest::new(1, "getwork", json!([])))
            .await;
        assert_eq!(response.error.unwrap().code, RejectReason::Unauthorized.code());
    }

    #[tokio::test]
    async fn test_getwork_then_submitwork() {
        let (service, ctx) = harness();
        let work = service
            .handle(&ctx, JsonRpcRequest::new(1, "getwork", json!(["valid-addr.rig"])))
            .await;
        assert!(work.is_success(), "{:?}", work.error);
        assert_eq!(work.result["extranonce1"], json!("0000001100000000"));
        let job_id = work.result["jobId"].as_str().unwrap().to_string();

        let submit = JsonRpcRequest::new(2, "submitwork", json!([job_id, "0000aaaa", "6553f100", "00000000"]));
        let response = service.handle(&ctx, submit.clone()).await;
        assert_eq!(response.result, json!(true));

        let response = service.handle(&ctx, submit).await;
        assert_eq!(response.error.unwrap().code, RejectReason::Duplicate.code());
    }

    #[tokio::test]
    async fn test_getmininginfo_is_proxied() {
        let (service, ctx) = harness();
        let response = service
            .handle(&ctx, JsonRpcRequest::new(1, "getmininginfo", Value::Null))
            .await;
        assert_eq!(response.result["chain"], json!("regtest"));
        assert_eq!(response.result["blocks"], json!(100));
    }
}

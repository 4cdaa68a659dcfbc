use async_trait::async_trait;
use rpc_core::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{share_response, unauthorized};
use crate::api::*;

/// Stratum V1 method handling.
pub struct StratumService {
    jobs: Arc<dyn JobManager>,
    shares: Arc<dyn ShareManager>,
}

impl StratumService {
    pub fn new(jobs: Arc<dyn JobManager>, shares: Arc<dyn ShareManager>) -> Self {
        Self { jobs, shares }
    }

    fn subscribe(&self, ctx: &MinerContext, id: Option<Value>) -> JsonRpcResponse {
        let extranonce1 = match ctx.miner.session().extranonce1 {
            Some(extranonce1) => extranonce1,
            None => self.jobs.next_extranonce1(),
        };
        ctx.miner.update_session(|session| {
            session.subscribed = true;
            session.extranonce1 = Some(extranonce1.clone());
        });

        let subscription = format!("{:016x}", ctx.miner.id());
        JsonRpcResponse::success(
            id,
            json!([
                [["mining.notify", subscription]],
                extranonce1,
                ctx.extranonce2_size
            ]),
        )
    }

    async fn authorize(&self, ctx: &MinerContext, request: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(username) = request.param_str(0) else {
            return JsonRpcResponse::failure(
                request.id.clone(),
                JsonRpcError::invalid_params("expected [username, password]"),
            );
        };
        let password = request.param_str(1).unwrap_or_default();

        let authorized = ctx.miners.authorize(&ctx.miner, username, password).await;
        JsonRpcResponse::success(request.id.clone(), json!(authorized))
    }

    async fn submit(&self, ctx: &MinerContext, request: &JsonRpcRequest) -> JsonRpcResponse {
        let session = ctx.miner.session();
        let extranonce1 = match session.extranonce1 {
            Some(extranonce1) if session.subscribed => extranonce1,
            _ => {
                return JsonRpcResponse::failure(request.id.clone(), JsonRpcError::new(25, "Not subscribed"))
            }
        };
        let username = match session.username {
            Some(username) if session.authorized => username,
            _ => return unauthorized(request.id.clone()),
        };

        let (Some(job_id), Some(extranonce2), Some(ntime), Some(nonce)) = (
            request.param_str(1),
            request.param_str(2),
            request.param_str(3),
            request.param_str(4),
        ) else {
            return JsonRpcResponse::failure(
                request.id.clone(),
                JsonRpcError::invalid_params("expected [worker, job_id, extranonce2, ntime, nonce]"),
            );
        };

        if extranonce2.len() != ctx.extranonce2_size * 2 {
            let reason = RejectReason::Malformed(format!(
                "extranonce2 must be {} bytes",
                ctx.extranonce2_size
            ));
            return share_response(request.id.clone(), ShareResult::Rejected(reason));
        }

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
        debug!("Share from miner {} for job {}: {:?}", ctx.miner.id(), job_id, result);
        share_response(request.id.clone(), result)
    }
}

#[async_trait]
impl Service for StratumService {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Stratum
    }

    async fn handle(&self, ctx: &MinerContext, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "mining.subscribe" => self.subscribe(ctx, request.id.clone()),
            "mining.authorize" => self.authorize(ctx, &request).await,
            "mining.submit" => self.submit(ctx, &request).await,
            "mining.extranonce.subscribe" => JsonRpcResponse::success(request.id.clone(), json!(true)),
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

    struct Harness {
        jobs: Arc<PoolJobManager>,
        service: StratumService,
        ctx: MinerContext,
    }

    fn harness() -> Harness {
        let daemon = Arc::new(StubDaemon::new());
        let miners = Arc::new(PoolMinerManager::new(daemon.clone()));
        let jobs = Arc::new(PoolJobManager::new(daemon.clone(), miners.clone(), Arc::new(Sha256d)));
        jobs.initialize(0x0a0b_0c0d).unwrap();
        let shares = Arc::new(PoolShareManager::new(
            daemon.clone(),
            jobs.clone(),
            Arc::new(MemoryStorage::new()),
        ));
        let service = StratumService::new(jobs.clone(), shares);
        let miner = miners.register(ProtocolKind::Stratum, peer(1), None);
        let ctx = MinerContext {
            miner,
            miners,
            extranonce2_size: 4,
        };
        Harness { jobs, service, ctx }
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(1, method, params)
    }

    #[tokio::test]
    async fn test_subscribe_assigns_extranonce() {
        let h = harness();
        let response = h
            .service
            .handle(&h.ctx, request("mining.subscribe", json!(["cpuminer/2.5"])))
            .await;

        assert!(response.is_success());
        assert_eq!(response.result[1], json!("0a0b0c0d00000000"));
        assert_eq!(response.result[2], json!(4));
        assert!(h.ctx.miner.session().subscribed);

        // Resubscribing keeps the extranonce
        let again = h.service.handle(&h.ctx, request("mining.subscribe", json!([]))).await;
        assert_eq!(again.result[1], response.result[1]);
    }

    #[tokio::test]
    async fn test_authorize() {
        let h = harness();
        let denied = h
            .service
            .handle(&h.ctx, request("mining.authorize", json!(["bogus.rig", "x"])))
            .await;
        assert_eq!(denied.result, json!(false));

        let granted = h
            .service
            .handle(&h.ctx, request("mining.authorize", json!(["valid-addr.rig", "x"])))
            .await;
        assert_eq!(granted.result, json!(true));

        let missing = h.service.handle(&h.ctx, request("mining.authorize", json!([]))).await;
        assert_eq!(missing.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_submit_flow() {
        let h = harness();
        h.jobs.broadcast().await.unwrap();
        let job = h.jobs.current().unwrap();
        let submit = request(
            "mining.submit",
            json!(["valid-addr.rig", job.id, "00000001", "6553f100", "00000000"]),
        );

        let response = h.service.handle(&h.ctx, submit.clone()).await;
        assert_eq!(response.error.unwrap().code, 25);

        h.service.handle(&h.ctx, request("mining.subscribe", json!([]))).await;
        let response = h.service.handle(&h.ctx, submit.clone()).await;
        assert_eq!(response.error.unwrap().code, RejectReason::Unauthorized.code());

        h.service
            .handle(&h.ctx, request("mining.authorize", json!(["valid-addr.rig", "x"])))
            .await;
        let response = h.service.handle(&h.ctx, submit.clone()).await;
        assert_eq!(response.result, json!(true));

        let response = h.service.handle(&h.ctx, submit).await;
        assert_eq!(response.error.unwrap().code, RejectReason::Duplicate.code());
    }

    #[tokio::test]
    async fn test_submit_checks_extranonce2_size() {
        let h = harness();
        h.jobs.broadcast().await.unwrap();
        h.service.handle(&h.ctx, request("mining.subscribe", json!([]))).await;
        h.service
            .handle(&h.ctx, request("mining.authorize", json!(["valid-addr.rig", "x"])))
            .await;

        let job = h.jobs.current().unwrap();
        let response = h
            .service
            .handle(
                &h.ctx,
                request("mining.submit", json!(["w", job.id, "01", "6553f100", "00000000"])),
            )
            .await;
        assert_eq!(response.error.unwrap().code, 20);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let h = harness();
        let response = h.service.handle(&h.ctx, request("mining.get_transactions", json!([]))).await;
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }
}

use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_core::DaemonClient;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::*;

/// Validates submitted shares, records them, and forwards block solutions.
pub struct PoolShareManager {
    daemon: Arc<dyn DaemonClient>,
    jobs: Arc<dyn JobManager>,
    storage: Arc<dyn Storage>,
    /// Solutions seen per job id
    seen: Mutex<HashMap<String, HashSet<SolutionKey>>>,
}

/// Decoded solution fields. Hex spelling does not matter.
type SolutionKey = (Vec<u8>, u32, u32);

/// A submission with its fields decoded.
struct DecodedShare {
    extranonce: Vec<u8>,
    ntime: u32,
    nonce: u32,
}

impl PoolShareManager {
    pub fn new(daemon: Arc<dyn DaemonClient>, jobs: Arc<dyn JobManager>, storage: Arc<dyn Storage>) -> Self {
        Self {
            daemon,
            jobs,
            storage,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Marks a solution as seen. False if it already was.
    fn first_sighting(&self, job_id: &str, share: &DecodedShare) -> bool {
        let key = (share.extranonce.clone(), share.ntime, share.nonce);

        let mut seen = self.seen.lock();
        // Jobs that fell out of the history can no longer be submitted against.
        seen.retain(|id, _| id == job_id || self.jobs.job(id).is_some());
        seen.entry(job_id.to_string()).or_default().insert(key)
    }

    async fn submit_block(&self, job: &PoolJob, header: &[u8], submission: &ShareSubmission) -> bool {
        match self.daemon.submit_block(&job.block_hex(header)).await {
            Ok(()) => {
                let hash = self.jobs.algorithm().digest(header);
                info!("Block found at height {} by {}: {}", job.height, submission.username, hash);
                let record = BlockRecord {
                    height: job.height,
                    hash,
                    job_id: job.id.clone(),
                    username: submission.username.clone(),
                    timestamp: unix_time(),
                };
                if let Err(e) = self.storage.record_block(&record) {
                    warn!("Failed to record block {}: {}", record.hash, e);
                }
                true
            }
            Err(e) => {
                warn!("Daemon rejected block at height {}: {}", job.height, e);
                false
            }
        }
    }
}

fn decode_word(field: &str, value: &str) -> Result<u32, RejectReason> {
    if value.len() != 8 {
        return Err(RejectReason::Malformed(format!("{} must be 8 hex characters", field)));
    }
    u32::from_str_radix(value, 16).map_err(|_| RejectReason::Malformed(format!("{} is not hex", field)))
}

fn decode(submission: &ShareSubmission) -> Result<DecodedShare, RejectReason> {
    let mut extranonce = hex::decode(&submission.extranonce1)
        .map_err(|_| RejectReason::Malformed("extranonce1 is not hex".to_string()))?;
    let extranonce2 = hex::decode(&submission.extranonce2)
        .map_err(|_| RejectReason::Malformed("extranonce2 is not hex".to_string()))?;
    if extranonce2.is_empty() {
        return Err(RejectReason::Malformed("extranonce2 is empty".to_string()));
    }
    extranonce.extend(extranonce2);

    Ok(DecodedShare {
        extranonce,
        ntime: decode_word("ntime", &submission.ntime)?,
        nonce: decode_word("nonce", &submission.nonce)?,
    })
}

#[async_trait]
impl ShareManager for PoolShareManager {
    async fn submit(&self, submission: ShareSubmission) -> ShareResult {
        let Some(job) = self.jobs.job(&submission.job_id) else {
            debug!("Share for unknown job {} from miner {}", submission.job_id, submission.miner);
            return ShareResult::Rejected(RejectReason::JobNotFound);
        };

        let decoded = match decode(&submission) {
            Ok(decoded) => decoded,
            Err(reason) => return ShareResult::Rejected(reason),
        };

        if submission.username.is_empty() {
            return ShareResult::Rejected(RejectReason::Unauthorized);
        }

        if !self.first_sighting(&job.id, &decoded) {
            return ShareResult::Rejected(RejectReason::Duplicate);
        }

        let header = job.header(&decoded.extranonce, decoded.ntime, decoded.nonce);
        let hash = self.jobs.algorithm().digest(&header);
        let candidate = hash.meets_target(&job.target);
        let block = candidate && self.submit_block(&job, &header, &submission).await;

        let record = ShareRecord {
            miner: submission.miner,
            username: submission.username.clone(),
            job_id: job.id.clone(),
            height: job.height,
            hash,
            block,
            timestamp: unix_time(),
        };
        if let Err(e) = self.storage.record_share(&record) {
            warn!("Failed to record share from {}: {}", record.username, e);
        }

        ShareResult::Accepted { block }
    }
}

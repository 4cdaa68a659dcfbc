//! Job manager
//!
//! Turns daemon block templates into [`PoolJob`]s and pushes them to miners.
//! Job ids and extranonce1 values are prefixed with the process instance id,
//! so identifiers never collide across pool processes sharing a daemon.

use async_trait::async_trait;
use crypto_hashes::PowHasher;
use parking_lot::RwLock;
use rpc_core::DaemonClient;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::api::*;
use crate::error::{PoolError, Result};

/// Jobs a share may still reference.
pub const JOB_HISTORY: usize = 8;

#[derive(Default)]
struct JobState {
    current: Option<Arc<PoolJob>>,
    history: VecDeque<Arc<PoolJob>>,
}

pub struct PoolJobManager {
    daemon: Arc<dyn DaemonClient>,
    miners: Arc<dyn MinerManager>,
    algorithm: Arc<dyn PowHasher>,
    instance_id: OnceLock<u32>,
    job_counter: AtomicU32,
    extranonce_counter: AtomicU32,
    state: RwLock<JobState>,
}

impl PoolJobManager {
    pub fn new(
        daemon: Arc<dyn DaemonClient>,
        miners: Arc<dyn MinerManager>,
        algorithm: Arc<dyn PowHasher>,
    ) -> Self {
        Self {
            daemon,
            miners,
            algorithm,
            instance_id: OnceLock::new(),
            job_counter: AtomicU32::new(0),
            extranonce_counter: AtomicU32::new(0),
            state: RwLock::new(JobState::default()),
        }
    }

    pub fn instance_id(&self) -> Option<u32> {
        self.instance_id.get().copied()
    }

    /// Number of jobs shares can currently be submitted against
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    fn next_job_id(&self, instance_id: u32) -> String {
        let counter = self.job_counter.fetch_add(1, Ordering::Relaxed);
        format!("{:08x}{:08x}", instance_id, counter)
    }

    fn install(&self, job: Arc<PoolJob>) {
        let mut state = self.state.write();
        if job.clean {
            state.history.clear();
        }
        state.history.push_back(job.clone());
        while state.history.len() > JOB_HISTORY {
            state.history.pop_front();
        }
        state.current = Some(job);
    }
}

#[async_trait]
impl JobManager for PoolJobManager {
    fn initialize(&self, instance_id: u32) -> Result<()> {
        self.instance_id
            .set(instance_id)
            .map_err(|_| PoolError::InvalidState {
                operation: "initialize job manager",
                state: "initialized",
            })?;
        info!("Job manager initialized with instance id {:08x}", instance_id);
        Ok(())
    }

    async fn broadcast(&self) -> Result<()> {
        let instance_id = self.instance_id().ok_or(PoolError::InvalidState {
            operation: "broadcast jobs",
            state: "uninitialized",
        })?;

        if self.miners.count() == 0 {
            debug!("No miners connected, skipping job broadcast");
            return Ok(());
        }

        let template = self.daemon.get_block_template().await?;
        let mut job = PoolJob::from_template(self.next_job_id(instance_id), &template, false)?;
        job.clean = match self.current() {
            Some(current) => current.previous_hash != job.previous_hash,
            None => true,
        };

        let job = Arc::new(job);
        self.install(job.clone());
        let notified = self.miners.notify_all(job.clone());
        debug!(
            "Broadcast job {} at height {} to {} miners (clean: {})",
            job.id, job.height, notified, job.clean
        );
        Ok(())
    }

    fn current(&self) -> Option<Arc<PoolJob>> {
        self.state.read().current.clone()
    }

    fn job(&self, id: &str) -> Option<Arc<PoolJob>> {
        self.state
            .read()
            .history
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    fn next_extranonce1(&self) -> String {
        let counter = self.extranonce_counter.fetch_add(1, Ordering::Relaxed);
        format!("{:08x}{:08x}", self.instance_id().unwrap_or_default(), counter)
    }

    fn algorithm(&self) -> Arc<dyn PowHasher> {
        self.algorithm.clone()
    }
}

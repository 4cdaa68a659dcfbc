//! Recording doubles for coordinator tests

#![allow(dead_code)]

use async_trait::async_trait;
use crypto_hashes::PowHasher;
use parking_lot::Mutex;
use poold::api::*;
use poold::config::{GlobalConfig, PoolConfig, ProtocolConfig};
use poold::error::{PoolError, Result};
use poold::factory::*;
use poold::{CoordinatorBuilder, PoolCoordinator};
use rpc_core::{
    BlockTemplate, DaemonClient, DaemonConfig, MiningInfo, RpcError, TemplateTransaction,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, ordered log of collaborator calls.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == event).count()
    }

    /// Position of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> usize {
        let events = self.events();
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{} was never recorded in {:?}", event, events))
    }

    pub fn assert_order(&self, events: &[&str]) {
        for pair in events.windows(2) {
            assert!(
                self.position(pair[0]) < self.position(pair[1]),
                "{} should precede {} in {:?}",
                pair[0],
                pair[1],
                self.events()
            );
        }
    }
}

pub fn template() -> BlockTemplate {
    BlockTemplate {
        version: 0x2000_0000,
        previous_block_hash: "11".repeat(32),
        transactions: vec![TemplateTransaction {
            data: "0100000001".to_string(),
            hash: String::new(),
        }],
        coinbase_value: 625_000_000,
        target: "00".repeat(32),
        cur_time: 1_700_000_000,
        bits: "1d00ffff".to_string(),
        height: 1,
    }
}

pub struct RecordingDaemon {
    recorder: Recorder,
    fail_initialize: bool,
}

impl RecordingDaemon {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            fail_initialize: false,
        }
    }

    pub fn failing(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            fail_initialize: true,
        }
    }
}

#[async_trait]
impl DaemonClient for RecordingDaemon {
    async fn initialize(&self, _config: &DaemonConfig) -> std::result::Result<(), RpcError> {
        self.recorder.record("daemon.initialize");
        if self.fail_initialize {
            return Err(RpcError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn get_block_template(&self) -> std::result::Result<BlockTemplate, RpcError> {
        Ok(template())
    }

    async fn submit_block(&self, _block_hex: &str) -> std::result::Result<(), RpcError> {
        Ok(())
    }

    async fn validate_address(&self, _address: &str) -> std::result::Result<bool, RpcError> {
        Ok(true)
    }

    async fn get_mining_info(&self) -> std::result::Result<MiningInfo, RpcError> {
        Ok(MiningInfo::default())
    }

    async fn shutdown(&self) {
        self.recorder.record("daemon.shutdown");
    }
}

/// Wraps the default job manager, recording seeding and counting broadcasts.
pub struct RecordingJobManager {
    inner: Arc<dyn JobManager>,
    recorder: Recorder,
    work: Duration,
    pub broadcasts: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingJobManager {
    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobManager for RecordingJobManager {
    fn initialize(&self, instance_id: u32) -> Result<()> {
        self.recorder.record("job_manager.initialize");
        self.recorder.record(format!("instance_id:{:08x}", instance_id));
        self.inner.initialize(instance_id)
    }

    async fn broadcast(&self) -> Result<()> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        let result = self.inner.broadcast().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn current(&self) -> Option<Arc<PoolJob>> {
        self.inner.current()
    }

    fn job(&self, id: &str) -> Option<Arc<PoolJob>> {
        self.inner.job(id)
    }

    fn next_extranonce1(&self) -> String {
        self.inner.next_extranonce1()
    }

    fn algorithm(&self) -> Arc<dyn PowHasher> {
        self.inner.algorithm()
    }
}

/// Manager factory that delegates to the defaults and records each creation.
pub struct RecordingManagers {
    recorder: Recorder,
    broadcast_work: Duration,
    pub jobs: Mutex<Option<Arc<RecordingJobManager>>>,
}

impl RecordingManagers {
    pub fn new(recorder: &Recorder) -> Self {
        Self::with_broadcast_work(recorder, Duration::ZERO)
    }

    pub fn with_broadcast_work(recorder: &Recorder, work: Duration) -> Self {
        Self {
            recorder: recorder.clone(),
            broadcast_work: work,
            jobs: Mutex::new(None),
        }
    }

    pub fn job_manager(&self) -> Arc<RecordingJobManager> {
        self.jobs.lock().clone().expect("job manager was never created")
    }
}

impl MinerManagerFactory for RecordingManagers {
    fn create(&self, daemon: Arc<dyn DaemonClient>) -> Result<Arc<dyn MinerManager>> {
        self.recorder.record("miner_manager.create");
        MinerManagerFactory::create(&DefaultManagerFactory, daemon)
    }
}

impl JobManagerFactory for RecordingManagers {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        miners: Arc<dyn MinerManager>,
        algorithm: Arc<dyn PowHasher>,
    ) -> Result<Arc<dyn JobManager>> {
        self.recorder.record("job_manager.create");
        let inner = JobManagerFactory::create(&DefaultManagerFactory, daemon, miners, algorithm)?;
        let jobs = Arc::new(RecordingJobManager {
            inner,
            recorder: self.recorder.clone(),
            work: self.broadcast_work,
            broadcasts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        *self.jobs.lock() = Some(jobs.clone());
        Ok(jobs)
    }
}

impl ShareManagerFactory for RecordingManagers {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        jobs: Arc<dyn JobManager>,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<dyn ShareManager>> {
        self.recorder.record("share_manager.create");
        ShareManagerFactory::create(&DefaultManagerFactory, daemon, jobs, storage)
    }
}

/// Server that never touches the network.
pub struct StubServer {
    kind: ProtocolKind,
    recorder: Recorder,
    fail_start: bool,
}

#[async_trait]
impl Server for StubServer {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    fn initialize(&self, _config: &ProtocolConfig, service: Arc<dyn Service>) -> Result<()> {
        assert_eq!(service.kind(), self.kind);
        self.recorder.record(format!("server.initialize:{}", self.kind));
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.recorder.record(format!("server.start:{}", self.kind));
        if self.fail_start {
            return Err(PoolError::Server(format!("{} port in use", self.kind)));
        }
        Ok(())
    }

    async fn stop(&self, _drain: Duration) -> Result<()> {
        self.recorder.record(format!("server.stop:{}", self.kind));
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

pub struct StubServers {
    recorder: Recorder,
    fail_start: Option<ProtocolKind>,
}

impl StubServers {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            fail_start: None,
        }
    }

    pub fn failing(recorder: &Recorder, kind: ProtocolKind) -> Self {
        Self {
            recorder: recorder.clone(),
            fail_start: Some(kind),
        }
    }
}

impl ServerFactory for StubServers {
    fn supports(&self, _kind: ProtocolKind) -> bool {
        true
    }

    fn get(&self, kind: ProtocolKind, _miners: Arc<dyn MinerManager>) -> Result<Arc<dyn Server>> {
        self.recorder.record(format!("server.create:{}", kind));
        Ok(Arc::new(StubServer {
            kind,
            recorder: self.recorder.clone(),
            fail_start: self.fail_start == Some(kind),
        }))
    }
}

/// Everything a test needs to build a coordinator and inspect it afterwards.
pub struct Fixture {
    pub recorder: Recorder,
    pub managers: Arc<RecordingManagers>,
    pub global: GlobalConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let recorder = Recorder::default();
        let managers = Arc::new(RecordingManagers::new(&recorder));
        Self {
            recorder,
            managers,
            global: GlobalConfig::default(),
        }
    }

    pub fn with_broadcast_work(work: Duration) -> Self {
        let recorder = Recorder::default();
        let managers = Arc::new(RecordingManagers::with_broadcast_work(&recorder, work));
        Self {
            recorder,
            managers,
            global: GlobalConfig::default(),
        }
    }

    /// Builder with every dependency set to a recording or default double.
    pub fn builder(&self) -> CoordinatorBuilder {
        PoolCoordinator::builder()
            .daemon(Arc::new(RecordingDaemon::new(&self.recorder)))
            .hash_algorithms(Arc::new(hash_algorithms()))
            .miner_managers(self.managers.clone())
            .job_managers(self.managers.clone())
            .share_managers(self.managers.clone())
            .storages(Arc::new(storages()))
            .servers(Arc::new(StubServers::new(&self.recorder)))
            .services(Arc::new(services()))
            .global_config(Arc::new(StaticGlobalConfig::new(self.global.clone())))
    }

    pub fn coordinator(&self) -> PoolCoordinator {
        self.builder().build().expect("complete builder")
    }
}

pub fn pool_config(stratum: bool, vanilla: bool) -> PoolConfig {
    PoolConfig {
        stratum: stratum.then(|| ProtocolConfig::new("127.0.0.1", 0)),
        vanilla: vanilla.then(|| ProtocolConfig::new("127.0.0.1", 0)),
        ..PoolConfig::default()
    }
}

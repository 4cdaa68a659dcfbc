//! Pool coordinator
//!
//! Owns the daemon client, the manager triad, storage and the protocol
//! front-ends, and drives them through
//! `Constructed -> Initialized -> Running -> Stopped`.
//!
//! Initialization order is fixed: daemon, storage, miner manager, job
//! manager (seeded with the instance id), share manager, then one
//! (server, service) pair per enabled protocol, and finally the broadcast
//! timer. Every collaborator comes out of a factory; nothing here names a
//! concrete implementation.

use futures_util::future::join_all;
use rand::rngs::OsRng;
use rand::RngCore;
use rpc_core::DaemonClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::api::*;
use crate::broadcast::BroadcastTimer;
use crate::config::{GlobalConfig, PoolConfig};
use crate::error::{PoolError, Result};
use crate::factory::*;
use crate::instance_id;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Initialized,
    Running,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server and the service answering its requests.
#[derive(Clone)]
pub struct FrontEnd {
    pub kind: ProtocolKind,
    pub server: Arc<dyn Server>,
    pub service: Arc<dyn Service>,
}

/// One slot per protocol kind.
#[derive(Clone, Default)]
pub struct FrontEnds {
    pub stratum: Option<FrontEnd>,
    pub vanilla: Option<FrontEnd>,
}

impl FrontEnds {
    pub fn get(&self, kind: ProtocolKind) -> Option<&FrontEnd> {
        match kind {
            ProtocolKind::Stratum => self.stratum.as_ref(),
            ProtocolKind::Vanilla => self.vanilla.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: ProtocolKind) -> &mut Option<FrontEnd> {
        match kind {
            ProtocolKind::Stratum => &mut self.stratum,
            ProtocolKind::Vanilla => &mut self.vanilla,
        }
    }

    /// Occupied slots, stratum first.
    pub fn iter(&self) -> impl Iterator<Item = &FrontEnd> {
        self.stratum.iter().chain(self.vanilla.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Factories the coordinator builds its collaborators from.
#[derive(Clone)]
struct Factories {
    hash_algorithms: Arc<dyn HashAlgorithmFactory>,
    miner_managers: Arc<dyn MinerManagerFactory>,
    job_managers: Arc<dyn JobManagerFactory>,
    share_managers: Arc<dyn ShareManagerFactory>,
    storages: Arc<dyn StorageFactory>,
    servers: Arc<dyn ServerFactory>,
    services: Arc<dyn ServiceFactory>,
    global_config: Arc<dyn GlobalConfigFactory>,
}

/// Collects the coordinator's dependencies. Every one is mandatory except
/// the entropy source, which defaults to the operating system's.
#[derive(Default)]
pub struct CoordinatorBuilder {
    daemon: Option<Arc<dyn DaemonClient>>,
    hash_algorithms: Option<Arc<dyn HashAlgorithmFactory>>,
    miner_managers: Option<Arc<dyn MinerManagerFactory>>,
    job_managers: Option<Arc<dyn JobManagerFactory>>,
    share_managers: Option<Arc<dyn ShareManagerFactory>>,
    storages: Option<Arc<dyn StorageFactory>>,
    servers: Option<Arc<dyn ServerFactory>>,
    services: Option<Arc<dyn ServiceFactory>>,
    global_config: Option<Arc<dyn GlobalConfigFactory>>,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl CoordinatorBuilder {
    pub fn daemon(mut self, daemon: Arc<dyn DaemonClient>) -> Self {
        self.daemon = Some(daemon);
        self
    }

    pub fn hash_algorithms(mut self, factory: Arc<dyn HashAlgorithmFactory>) -> Self {
        self.hash_algorithms = Some(factory);
        self
    }

    pub fn miner_managers(mut self, factory: Arc<dyn MinerManagerFactory>) -> Self {
        self.miner_managers = Some(factory);
        self
    }

    pub fn job_managers(mut self, factory: Arc<dyn JobManagerFactory>) -> Self {
        self.job_managers = Some(factory);
        self
    }

    pub fn share_managers(mut self, factory: Arc<dyn ShareManagerFactory>) -> Self {
        self.share_managers = Some(factory);
        self
    }

    pub fn storages(mut self, factory: Arc<dyn StorageFactory>) -> Self {
        self.storages = Some(factory);
        self
    }

    pub fn servers(mut self, factory: Arc<dyn ServerFactory>) -> Self {
        self.servers = Some(factory);
        self
    }

    pub fn services(mut self, factory: Arc<dyn ServiceFactory>) -> Self {
        self.services = Some(factory);
        self
    }

    pub fn global_config(mut self, factory: Arc<dyn GlobalConfigFactory>) -> Self {
        self.global_config = Some(factory);
        self
    }

    /// Entropy for the instance id
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Validates the dependency set and draws the instance id. Nothing is
    /// built and no factory is consulted.
    pub fn build(self) -> Result<PoolCoordinator> {
        let daemon = self.daemon.ok_or(PoolError::InvalidArgument("daemon client"))?;
        let factories = Factories {
            hash_algorithms: self
                .hash_algorithms
                .ok_or(PoolError::InvalidArgument("hash algorithm factory"))?,
            miner_managers: self
                .miner_managers
                .ok_or(PoolError::InvalidArgument("miner manager factory"))?,
            job_managers: self
                .job_managers
                .ok_or(PoolError::InvalidArgument("job manager factory"))?,
            share_managers: self
                .share_managers
                .ok_or(PoolError::InvalidArgument("share manager factory"))?,
            storages: self.storages.ok_or(PoolError::InvalidArgument("storage factory"))?,
            servers: self.servers.ok_or(PoolError::InvalidArgument("server factory"))?,
            services: self.services.ok_or(PoolError::InvalidArgument("service factory"))?,
            global_config: self
                .global_config
                .ok_or(PoolError::InvalidArgument("global config factory"))?,
        };

        let mut rng: Box<dyn RngCore + Send> = match self.rng {
            Some(rng) => rng,
            None => Box::new(OsRng),
        };
        let instance_id = instance_id::generate(rng.as_mut())?;
        info!("Pool instance id {:08x}", instance_id);

        Ok(PoolCoordinator {
            instance_id,
            daemon,
            factories,
            state: LifecycleState::Constructed,
            config: None,
            global: None,
            miners: None,
            jobs: None,
            shares: None,
            storage: None,
            front_ends: FrontEnds::default(),
            timer: None,
        })
    }
}

pub struct PoolCoordinator {
    instance_id: u32,
    daemon: Arc<dyn DaemonClient>,
    factories: Factories,
    state: LifecycleState,
    config: Option<PoolConfig>,
    global: Option<GlobalConfig>,
    miners: Option<Arc<dyn MinerManager>>,
    jobs: Option<Arc<dyn JobManager>>,
    shares: Option<Arc<dyn ShareManager>>,
    storage: Option<Arc<dyn Storage>>,
    front_ends: FrontEnds,
    timer: Option<BroadcastTimer>,
}

/// Everything `initialize` builds, installed only once all of it succeeded.
struct Built {
    miners: Arc<dyn MinerManager>,
    jobs: Arc<dyn JobManager>,
    shares: Arc<dyn ShareManager>,
    storage: Arc<dyn Storage>,
    front_ends: FrontEnds,
}

impl PoolCoordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> Option<&PoolConfig> {
        self.config.as_ref()
    }

    pub fn front_ends(&self) -> &FrontEnds {
        &self.front_ends
    }

    pub fn miner_manager(&self) -> Option<Arc<dyn MinerManager>> {
        self.miners.clone()
    }

    pub fn job_manager(&self) -> Option<Arc<dyn JobManager>> {
        self.jobs.clone()
    }

    pub fn share_manager(&self) -> Option<Arc<dyn ShareManager>> {
        self.shares.clone()
    }

    pub fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.storage.clone()
    }

    /// Whether the broadcast timer is scheduled
    pub fn broadcasting(&self) -> bool {
        self.timer.as_ref().map_or(false, BroadcastTimer::is_running)
    }

    fn expect_state(&self, expected: LifecycleState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(PoolError::InvalidState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn drain_timeout(&self) -> Duration {
        let secs = self
            .global
            .as_ref()
            .map_or_else(|| GlobalConfig::default().drain_timeout_secs, |g| g.drain_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Rejects selectors no factory can satisfy before anything is touched.
    fn preflight(&self, config: &PoolConfig, global: &GlobalConfig) -> Result<()> {
        if global.broadcast_interval_secs == 0 {
            return Err(PoolError::ConfigurationInvalid(
                "broadcast_interval_secs must be positive".to_string(),
            ));
        }
        if !self.factories.hash_algorithms.supports(&config.coin.algorithm) {
            return Err(PoolError::UnknownKind {
                kind: "hash algorithm",
                tag: config.coin.algorithm.clone(),
            });
        }
        if !self.factories.storages.supports(&global.storage) {
            return Err(PoolError::UnknownKind {
                kind: "storage backend",
                tag: global.storage.clone(),
            });
        }
        for kind in ProtocolKind::ALL {
            if config.section(kind).is_none() {
                continue;
            }
            if !self.factories.servers.supports(kind) {
                return Err(PoolError::UnknownKind {
                    kind: "server",
                    tag: kind.tag().to_string(),
                });
            }
            if !self.factories.services.supports(kind) {
                return Err(PoolError::UnknownKind {
                    kind: "service",
                    tag: kind.tag().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Binds the daemon client. An invalid or absent daemon section leaves
    /// the pool running degraded rather than failing.
    async fn initialize_daemon(&self, config: &PoolConfig) -> Result<()> {
        ui::print_component_status("Daemon Client", ui::ComponentStatus::Starting);
        let problem = config.daemon_problem();
        if let Some(problem) = &problem {
            error!("Daemon configuration is invalid: {}", problem);
        }

        let daemon_config = config.daemon.clone().unwrap_or_default();
        match self.daemon.initialize(&daemon_config).await {
            Ok(()) => {
                info!("Daemon client bound to {}", daemon_config.url);
                ui::print_component_status("Daemon Client", ui::ComponentStatus::Running);
                Ok(())
            }
            Err(e) if problem.is_none() => {
                ui::print_component_status("Daemon Client", ui::ComponentStatus::Error);
                Err(e.into())
            }
            Err(e) => {
                warn!("Daemon client is degraded: {}", e);
                ui::print_component_status("Daemon Client", ui::ComponentStatus::Error);
                Ok(())
            }
        }
    }

    fn build_managers(&self, config: &PoolConfig, global: &GlobalConfig) -> Result<Built> {
        ui::print_component_status("Storage", ui::ComponentStatus::Starting);
        let storage = self.factories.storages.get(&global.storage)?;
        info!("Storage backend: {}", storage.backend());
        ui::print_component_status("Storage", ui::ComponentStatus::Running);

        ui::print_component_status("Miner Manager", ui::ComponentStatus::Starting);
        let miners = self.factories.miner_managers.create(self.daemon.clone())?;
        ui::print_component_status("Miner Manager", ui::ComponentStatus::Running);

        ui::print_component_status("Job Manager", ui::ComponentStatus::Starting);
        let algorithm = self.factories.hash_algorithms.get(&config.coin.algorithm)?;
        info!("Hash algorithm: {}", algorithm.name());
        let jobs = self
            .factories
            .job_managers
            .create(self.daemon.clone(), miners.clone(), algorithm)?;
        jobs.initialize(self.instance_id)?;
        ui::print_component_status("Job Manager", ui::ComponentStatus::Running);

        ui::print_component_status("Share Manager", ui::ComponentStatus::Starting);
        let shares = self
            .factories
            .share_managers
            .create(self.daemon.clone(), jobs.clone(), storage.clone())?;
        ui::print_component_status("Share Manager", ui::ComponentStatus::Running);

        Ok(Built {
            miners,
            jobs,
            shares,
            storage,
            front_ends: FrontEnds::default(),
        })
    }

    fn build_front_ends(&self, config: &PoolConfig, built: &mut Built) -> Result<()> {
        for kind in ProtocolKind::ALL {
            let Some(section) = config.section(kind) else {
                info!("{} front-end disabled", kind);
                continue;
            };

            let name = format!("{} Server", kind);
            ui::print_component_status(&name, ui::ComponentStatus::Starting);
            let server = self.factories.servers.get(kind, built.miners.clone())?;
            let service = self.factories.services.get(
                kind,
                ServiceDeps {
                    jobs: built.jobs.clone(),
                    shares: built.shares.clone(),
                    daemon: self.daemon.clone(),
                },
            )?;
            server.initialize(section, service.clone())?;
            info!("{} front-end configured for {}", kind, section.listen_address());
            ui::print_component_status(&name, ui::ComponentStatus::Running);

            *built.front_ends.slot_mut(kind) = Some(FrontEnd { kind, server, service });
        }
        Ok(())
    }

    /// Builds every collaborator in dependency order and schedules job
    /// broadcast. A failure leaves the coordinator `Constructed`.
    pub async fn initialize(&mut self, config: impl Into<Option<PoolConfig>>) -> Result<()> {
        let config = config.into().ok_or(PoolError::InvalidArgument("pool config"))?;
        self.expect_state(LifecycleState::Constructed, "initialize")?;

        let global = self.factories.global_config.global()?;
        self.preflight(&config, &global)?;

        ui::print_section("Initializing Components");
        self.initialize_daemon(&config).await?;
        let mut built = self.build_managers(&config, &global)?;
        self.build_front_ends(&config, &mut built)?;

        let period = Duration::from_secs(global.broadcast_interval_secs);
        self.timer = Some(BroadcastTimer::spawn(built.jobs.clone(), period));

        self.miners = Some(built.miners);
        self.jobs = Some(built.jobs);
        self.shares = Some(built.shares);
        self.storage = Some(built.storage);
        self.front_ends = built.front_ends;
        self.config = Some(config);
        self.global = Some(global);
        self.state = LifecycleState::Initialized;

        ui::print_status("✓", "All components initialized successfully", ui::StatusType::Success);
        Ok(())
    }

    /// Starts every front-end server concurrently.
    ///
    /// An invalid pool configuration is logged and nothing is started. Server
    /// failures are logged individually; the first one is returned once every
    /// server was attempted.
    pub async fn start(&mut self) -> Result<()> {
        self.expect_state(LifecycleState::Initialized, "start")?;

        let problems = self.config.as_ref().map(PoolConfig::problems).unwrap_or_default();
        if !problems.is_empty() {
            error!("Pool configuration is invalid, not starting: {}", problems.join("; "));
            ui::print_status("✗", "Pool configuration is invalid", ui::StatusType::Error);
            return Ok(());
        }

        ui::print_section("Starting Services");
        let starts = self.front_ends.iter().map(|front_end| async move {
            (front_end.kind, front_end.server.start().await)
        });

        let mut first_error = None;
        for (kind, result) in join_all(starts).await {
            let name = format!("{} Server", kind);
            match result {
                Ok(()) => {
                    info!("{} server started", kind);
                    ui::print_component_status(&name, ui::ComponentStatus::Running);
                }
                Err(e) => {
                    error!("{} server failed to start: {}", kind, e);
                    ui::print_component_status(&name, ui::ComponentStatus::Error);
                    first_error.get_or_insert(PoolError::Server(format!("{} server failed to start: {}", kind, e)));
                }
            }
        }

        self.state = LifecycleState::Running;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancels the broadcast timer, drains and stops every server, then
    /// releases the daemon client. Calling it again does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Constructed => {
                self.state = LifecycleState::Stopped;
                return Ok(());
            }
            LifecycleState::Initialized | LifecycleState::Running => {}
        }

        info!("Stopping pool");
        let drain = self.drain_timeout();
        if let Some(timer) = self.timer.take() {
            timer.stop(drain).await;
        }

        let stops = self.front_ends.iter().map(|front_end| async move {
            (front_end.kind, front_end.server.stop(drain).await)
        });
        let mut first_error = None;
        for (kind, result) in join_all(stops).await {
            let name = format!("{} Server", kind);
            match result {
                Ok(()) => ui::print_component_status(&name, ui::ComponentStatus::Stopped),
                Err(e) => {
                    error!("{} server failed to stop cleanly: {}", kind, e);
                    ui::print_component_status(&name, ui::ComponentStatus::Error);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.daemon.shutdown().await;
        self.state = LifecycleState::Stopped;
        info!("All components stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

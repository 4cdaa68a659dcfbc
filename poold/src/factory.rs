//! Collaborator factories
//!
//! Each factory is a pure lookup: a discriminator goes in, a fresh,
//! not-yet-initialized collaborator comes out, or `UnknownKind`. The
//! discriminator-indexed ones are backed by a [`Registry`] whose table is
//! filled once at startup and only read afterwards.

use crypto_hashes::{Blake3Pow, Keccak256, PowHasher, Sha256d};
use rpc_core::DaemonClient;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::*;
use crate::config::GlobalConfig;
use crate::error::{PoolError, Result};
use crate::job_manager::PoolJobManager;
use crate::miner_manager::PoolMinerManager;
use crate::server::{StratumServer, VanillaServer};
use crate::service::{StratumService, VanillaService};
use crate::share_manager::PoolShareManager;
use crate::storage_manager::{MemoryStorage, NullStorage};

/// Closed table of tag to constructor.
pub struct Registry<A, T: ?Sized> {
    kind: &'static str,
    constructors: HashMap<String, Box<dyn Fn(A) -> Arc<T> + Send + Sync>>,
}

impl<A, T: ?Sized> Registry<A, T> {
    /// `kind` names what the registry builds, for error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor. Tags are case-insensitive; a later
    /// registration of the same tag replaces the earlier one.
    pub fn with<F>(mut self, tag: &str, constructor: F) -> Self
    where
        F: Fn(A) -> Arc<T> + Send + Sync + 'static,
    {
        self.constructors.insert(normalize(tag), Box::new(constructor));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(&normalize(tag))
    }

    pub fn create(&self, tag: &str, args: A) -> Result<Arc<T>> {
        let constructor = self
            .constructors
            .get(&normalize(tag))
            .ok_or_else(|| PoolError::UnknownKind {
                kind: self.kind,
                tag: tag.to_string(),
            })?;
        Ok(constructor(args))
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Handles a service is built with.
#[derive(Clone)]
pub struct ServiceDeps {
    pub jobs: Arc<dyn JobManager>,
    pub shares: Arc<dyn ShareManager>,
    pub daemon: Arc<dyn DaemonClient>,
}

pub trait HashAlgorithmFactory: Send + Sync {
    fn supports(&self, algorithm: &str) -> bool;
    fn get(&self, algorithm: &str) -> Result<Arc<dyn PowHasher>>;
}

pub trait StorageFactory: Send + Sync {
    fn supports(&self, backend: &str) -> bool;
    fn get(&self, backend: &str) -> Result<Arc<dyn Storage>>;
}

pub trait ServerFactory: Send + Sync {
    fn supports(&self, kind: ProtocolKind) -> bool;
    fn get(&self, kind: ProtocolKind, miners: Arc<dyn MinerManager>) -> Result<Arc<dyn Server>>;
}

pub trait ServiceFactory: Send + Sync {
    fn supports(&self, kind: ProtocolKind) -> bool;
    fn get(&self, kind: ProtocolKind, deps: ServiceDeps) -> Result<Arc<dyn Service>>;
}

pub trait MinerManagerFactory: Send + Sync {
    fn create(&self, daemon: Arc<dyn DaemonClient>) -> Result<Arc<dyn MinerManager>>;
}

pub trait JobManagerFactory: Send + Sync {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        miners: Arc<dyn MinerManager>,
        algorithm: Arc<dyn PowHasher>,
    ) -> Result<Arc<dyn JobManager>>;
}

pub trait ShareManagerFactory: Send + Sync {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        jobs: Arc<dyn JobManager>,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<dyn ShareManager>>;
}

pub trait GlobalConfigFactory: Send + Sync {
    fn global(&self) -> Result<GlobalConfig>;
}

impl HashAlgorithmFactory for Registry<(), dyn PowHasher> {
    fn supports(&self, algorithm: &str) -> bool {
        self.contains(algorithm)
    }

    fn get(&self, algorithm: &str) -> Result<Arc<dyn PowHasher>> {
        self.create(algorithm, ())
    }
}

impl StorageFactory for Registry<(), dyn Storage> {
    fn supports(&self, backend: &str) -> bool {
        self.contains(backend)
    }

    fn get(&self, backend: &str) -> Result<Arc<dyn Storage>> {
        self.create(backend, ())
    }
}

impl ServerFactory for Registry<Arc<dyn MinerManager>, dyn Server> {
    fn supports(&self, kind: ProtocolKind) -> bool {
        self.contains(kind.tag())
    }

    fn get(&self, kind: ProtocolKind, miners: Arc<dyn MinerManager>) -> Result<Arc<dyn Server>> {
        self.create(kind.tag(), miners)
    }
}

impl ServiceFactory for Registry<ServiceDeps, dyn Service> {
    fn supports(&self, kind: ProtocolKind) -> bool {
        self.contains(kind.tag())
    }

    fn get(&self, kind: ProtocolKind, deps: ServiceDeps) -> Result<Arc<dyn Service>> {
        self.create(kind.tag(), deps)
    }
}

/// Built-in proof-of-work algorithms.
pub fn hash_algorithms() -> Registry<(), dyn PowHasher> {
    Registry::<(), dyn PowHasher>::new("hash algorithm")
        .with("sha256d", |_| Arc::new(Sha256d) as Arc<dyn PowHasher>)
        .with("blake3", |_| Arc::new(Blake3Pow) as Arc<dyn PowHasher>)
        .with("keccak", |_| Arc::new(Keccak256) as Arc<dyn PowHasher>)
}

/// Built-in storage backends.
pub fn storages() -> Registry<(), dyn Storage> {
    Registry::<(), dyn Storage>::new("storage backend")
        .with("memory", |_| Arc::new(MemoryStorage::new()) as Arc<dyn Storage>)
        .with("null", |_| Arc::new(NullStorage) as Arc<dyn Storage>)
}

/// Built-in front-end servers.
pub fn servers() -> Registry<Arc<dyn MinerManager>, dyn Server> {
    Registry::<Arc<dyn MinerManager>, dyn Server>::new("server")
        .with(ProtocolKind::Stratum.tag(), |miners| {
            Arc::new(StratumServer::new(miners)) as Arc<dyn Server>
        })
        .with(ProtocolKind::Vanilla.tag(), |miners| {
            Arc::new(VanillaServer::new(miners)) as Arc<dyn Server>
        })
}

/// Built-in front-end services.
pub fn services() -> Registry<ServiceDeps, dyn Service> {
    Registry::<ServiceDeps, dyn Service>::new("service")
        .with(ProtocolKind::Stratum.tag(), |deps: ServiceDeps| {
            Arc::new(StratumService::new(deps.jobs, deps.shares)) as Arc<dyn Service>
        })
        .with(ProtocolKind::Vanilla.tag(), |deps: ServiceDeps| {
            Arc::new(VanillaService::new(deps.jobs, deps.shares, deps.daemon)) as Arc<dyn Service>
        })
}

/// Builds the default miner, job and share managers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultManagerFactory;

impl MinerManagerFactory for DefaultManagerFactory {
    fn create(&self, daemon: Arc<dyn DaemonClient>) -> Result<Arc<dyn MinerManager>> {
        Ok(Arc::new(PoolMinerManager::new(daemon)))
    }
}

impl JobManagerFactory for DefaultManagerFactory {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        miners: Arc<dyn MinerManager>,
        algorithm: Arc<dyn PowHasher>,
    ) -> Result<Arc<dyn JobManager>> {
        Ok(Arc::new(PoolJobManager::new(daemon, miners, algorithm)))
    }
}

impl ShareManagerFactory for DefaultManagerFactory {
    fn create(
        &self,
        daemon: Arc<dyn DaemonClient>,
        jobs: Arc<dyn JobManager>,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<dyn ShareManager>> {
        Ok(Arc::new(PoolShareManager::new(daemon, jobs, storage)))
    }
}

/// Serves a global config loaded once at startup.
#[derive(Debug, Clone)]
pub struct StaticGlobalConfig(GlobalConfig);

impl StaticGlobalConfig {
    pub fn new(config: GlobalConfig) -> Self {
        Self(config)
    }
}

impl GlobalConfigFactory for StaticGlobalConfig {
    fn global(&self) -> Result<GlobalConfig> {
        Ok(self.0.clone())
    }
}

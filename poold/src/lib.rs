//! poold - mining pool node
//!
//! Wires a blockchain daemon connection, the miner/job/share managers,
//! storage and the Stratum and Vanilla front-ends together under one
//! [`PoolCoordinator`].

pub mod api;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod factory;
pub mod instance_id;
pub mod job_manager;
pub mod miner_manager;
pub mod model;
pub mod server;
pub mod service;
pub mod share_manager;
pub mod storage_manager;
pub mod ui;

#[cfg(test)]
mod test_utils;

pub use cli::Args;
pub use config::{Config, GlobalConfig, PoolConfig, ProtocolConfig};
pub use coordinator::{CoordinatorBuilder, FrontEnd, FrontEnds, LifecycleState, PoolCoordinator};
pub use error::{PoolError, Result};

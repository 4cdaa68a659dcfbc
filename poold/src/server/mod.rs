//! Network front-ends. Each server owns its listener and connection tasks
//! and hands every request to the service it was initialized with.

mod stratum;
mod vanilla;

pub use stratum::StratumServer;
pub use vanilla::VanillaServer;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::Service;
use crate::config::ProtocolConfig;

/// Settings and service a server was initialized with.
#[derive(Clone)]
struct Binding {
    config: ProtocolConfig,
    service: Arc<dyn Service>,
}

/// Handles to a started server.
struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

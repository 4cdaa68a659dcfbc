//! RPC plumbing shared by the pool node: the daemon client contract, the
//! JSON-RPC 2.0 model spoken by both the daemon and pool front-ends, and a
//! WebSocket client for the daemon.

pub mod api;
pub mod client;
pub mod model;

pub use api::DaemonClient;
pub use client::WsDaemonClient;
pub use model::*;

//! Data shared between the managers and the front-ends

use crate::error::{PoolError, Result};
use crypto_hashes::{double_sha256, Hash};
use parking_lot::RwLock;
use rpc_core::{BlockTemplate, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Front-end protocol kinds. The set is closed: a pool runs at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Stratum,
    Vanilla,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::Stratum, ProtocolKind::Vanilla];

    /// Registry tag
    pub fn tag(&self) -> &'static str {
        match self {
            ProtocolKind::Stratum => "stratum",
            ProtocolKind::Vanilla => "vanilla",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub type MinerId = u64;

/// Mutable per-connection state, written by the protocol service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinerSession {
    pub username: Option<String>,
    pub authorized: bool,
    pub subscribed: bool,
    pub extranonce1: Option<String>,
}

/// A connected miner, owned by the miner manager and shared with its server.
#[derive(Debug)]
pub struct Miner {
    id: MinerId,
    kind: ProtocolKind,
    peer: SocketAddr,
    session: RwLock<MinerSession>,
    notifier: Option<mpsc::UnboundedSender<Arc<PoolJob>>>,
}

impl Miner {
    pub fn new(
        id: MinerId,
        kind: ProtocolKind,
        peer: SocketAddr,
        notifier: Option<mpsc::UnboundedSender<Arc<PoolJob>>>,
    ) -> Self {
        Self {
            id,
            kind,
            peer,
            session: RwLock::new(MinerSession::default()),
            notifier,
        }
    }

    pub fn id(&self) -> MinerId {
        self.id
    }

    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Snapshot of the session
    pub fn session(&self) -> MinerSession {
        self.session.read().clone()
    }

    pub fn update_session<F: FnOnce(&mut MinerSession)>(&self, f: F) {
        f(&mut self.session.write());
    }

    pub fn is_authorized(&self) -> bool {
        self.session.read().authorized
    }

    /// Whether work can be pushed to this miner at all.
    pub fn accepts_notifications(&self) -> bool {
        self.notifier.is_some()
    }

    /// Pushes a job to the miner's connection. False if the connection is gone
    /// or the protocol is poll-based.
    pub fn notify(&self, job: Arc<PoolJob>) -> bool {
        match &self.notifier {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }
}

/// A unit of work derived from a daemon block template.
#[derive(Debug, Clone)]
pub struct PoolJob {
    pub id: String,
    pub height: u64,
    pub version: u32,
    pub previous_hash: Hash,
    pub bits: u32,
    pub target: Hash,
    pub cur_time: u64,
    pub coinbase_value: u64,
    pub transactions: Vec<String>,
    /// Miners must drop older work
    pub clean: bool,
    pub created_at: Instant,
}

impl PoolJob {
    pub fn from_template(id: String, template: &BlockTemplate, clean: bool) -> Result<Self> {
        let malformed = |field: &str, detail: String| {
            PoolError::Daemon(RpcError::Internal(format!(
                "Malformed block template {}: {}",
                field, detail
            )))
        };

        let previous_hash = Hash::from_hex(&template.previous_block_hash)
            .map_err(|e| malformed("previousblockhash", e.to_string()))?;
        let target = Hash::from_hex(&template.target).map_err(|e| malformed("target", e.to_string()))?;
        let bits = u32::from_str_radix(&template.bits, 16).map_err(|e| malformed("bits", e.to_string()))?;

        Ok(Self {
            id,
            height: template.height,
            version: template.version,
            previous_hash,
            bits,
            target,
            cur_time: template.cur_time,
            coinbase_value: template.coinbase_value,
            transactions: template.transactions.iter().map(|tx| tx.data.clone()).collect(),
            clean,
            created_at: Instant::now(),
        })
    }

    /// 80-byte header for a miner's solution.
    ///
    /// Layout: version | previous hash | commitment | ntime | bits | nonce, with
    /// integers little-endian. The commitment is the double-SHA256 of the
    /// miner's extranonce bytes followed by the raw transactions.
    pub fn header(&self, extranonce: &[u8], ntime: u32, nonce: u32) -> Vec<u8> {
        let mut commitment_input = extranonce.to_vec();
        for tx in &self.transactions {
            commitment_input.extend(hex::decode(tx).unwrap_or_default());
        }
        let commitment = double_sha256(&commitment_input);

        let mut header = Vec::with_capacity(80);
        header.extend_from_slice(&self.version.to_le_bytes());
        header.extend_from_slice(self.previous_hash.as_bytes());
        header.extend_from_slice(&commitment);
        header.extend_from_slice(&ntime.to_le_bytes());
        header.extend_from_slice(&self.bits.to_le_bytes());
        header.extend_from_slice(&nonce.to_le_bytes());
        header
    }

    /// Block payload for `submitblock`: header followed by the transactions.
    pub fn block_hex(&self, header: &[u8]) -> String {
        let mut block = hex::encode(header);
        for tx in &self.transactions {
            block.push_str(tx);
        }
        block
    }
}

/// A share as submitted by a miner, fields still hex encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareSubmission {
    pub miner: MinerId,
    pub username: String,
    pub job_id: String,
    pub extranonce1: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    JobNotFound,
    Duplicate,
    Unauthorized,
    Malformed(String),
}

impl RejectReason {
    /// Stratum error code
    pub fn code(&self) -> i32 {
        match self {
            RejectReason::Malformed(_) => 20,
            RejectReason::JobNotFound => 21,
            RejectReason::Duplicate => 22,
            RejectReason::Unauthorized => 24,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::JobNotFound => write!(f, "Job not found"),
            RejectReason::Duplicate => write!(f, "Duplicate share"),
            RejectReason::Unauthorized => write!(f, "Unauthorized worker"),
            RejectReason::Malformed(detail) => write!(f, "Malformed share: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareResult {
    Accepted { block: bool },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareRecord {
    pub miner: MinerId,
    pub username: String,
    pub job_id: String,
    pub height: u64,
    pub hash: Hash,
    pub block: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub height: u64,
    pub hash: Hash,
    pub job_id: String,
    pub username: String,
    pub timestamp: u64,
}

/// Seconds since UNIX_EPOCH
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

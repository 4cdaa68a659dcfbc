//! Storage backends for share and block records

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::{BlockRecord, ShareRecord, Storage};
use crate::error::Result;

/// Shares kept in memory before the oldest are evicted.
pub const DEFAULT_SHARE_CAPACITY: usize = 100_000;

/// Keeps recent shares in a bounded ring and every found block.
pub struct MemoryStorage {
    capacity: usize,
    shares: RwLock<VecDeque<ShareRecord>>,
    blocks: RwLock<Vec<BlockRecord>>,
    total_shares: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SHARE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            shares: RwLock::new(VecDeque::new()),
            blocks: RwLock::new(Vec::new()),
            total_shares: AtomicU64::new(0),
        }
    }

    /// Most recent shares, newest last
    pub fn recent_shares(&self, limit: usize) -> Vec<ShareRecord> {
        let shares = self.shares.read();
        shares.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn blocks(&self) -> Vec<BlockRecord> {
        self.blocks.read().clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn record_share(&self, share: &ShareRecord) -> Result<()> {
        let mut shares = self.shares.write();
        if shares.len() == self.capacity {
            shares.pop_front();
        }
        shares.push_back(share.clone());
        self.total_shares.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_block(&self, block: &BlockRecord) -> Result<()> {
        self.blocks.write().push(block.clone());
        Ok(())
    }

    fn share_count(&self) -> u64 {
        self.total_shares.load(Ordering::Relaxed)
    }

    fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl Storage for NullStorage {
    fn backend(&self) -> &'static str {
        "null"
    }

    fn record_share(&self, _share: &ShareRecord) -> Result<()> {
        Ok(())
    }

    fn record_block(&self, _block: &BlockRecord) -> Result<()> {
        Ok(())
    }

    fn share_count(&self) -> u64 {
        0
    }

    fn block_count(&self) -> u64 {
        0
    }
}

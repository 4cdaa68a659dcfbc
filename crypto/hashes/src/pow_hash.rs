//! Proof-of-work digest algorithms.
//!
//! A pool is configured with one algorithm by name; the job and share managers
//! only ever see it through [`PowHasher`].

use crate::hasher::double_sha256;
use crate::Hash;
use tiny_keccak::{Hasher, Keccak};

/// A block-header digest function selected by the coin configuration.
pub trait PowHasher: Send + Sync {
    /// Registry name, e.g. `sha256d`.
    fn name(&self) -> &'static str;

    /// Digest of a serialized block header.
    fn digest(&self, header: &[u8]) -> Hash;
}

/// Bitcoin style double SHA-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256d;

impl PowHasher for Sha256d {
    fn name(&self) -> &'static str {
        "sha256d"
    }

    fn digest(&self, header: &[u8]) -> Hash {
        Hash::from(double_sha256(header))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Pow;

impl PowHasher for Blake3Pow {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, header: &[u8]) -> Hash {
        Hash::from(*blake3::hash(header).as_bytes())
    }
}

/// Legacy Keccak-256 (pre-NIST padding).
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256;

impl PowHasher for Keccak256 {
    fn name(&self) -> &'static str {
        "keccak"
    }

    fn digest(&self, header: &[u8]) -> Hash {
        let mut keccak = Keccak::v256();
        let mut out = [0u8; 32];
        keccak.update(header);
        keccak.finalize(&mut out);
        Hash::from(out)
    }
}

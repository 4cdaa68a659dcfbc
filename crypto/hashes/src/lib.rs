//! Hash primitives and the proof-of-work algorithms a pool can be configured with.

pub mod hasher;
pub mod pow_hash;

// Re-export commonly used types
pub use hasher::{double_sha256, sha256, HashError};
pub use pow_hash::{Blake3Pow, Keccak256, PowHasher, Sha256d};

use std::fmt;

use serde::{Deserialize, Serialize};

pub const HASH_SIZE: usize = 32;

/// A 32-byte digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a hash from a 32-byte array
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Creates a zeroed hash
    pub const fn zeroed() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Tries to create a Hash from a slice of bytes
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, HashError> {
        let array: [u8; HASH_SIZE] = slice
            .try_into()
            .map_err(|_| HashError::InvalidLength(slice.len()))?;
        Ok(Self(array))
    }

    /// Parses a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s)?;
        Self::try_from_slice(&bytes)
    }

    /// Whether this digest, read as a big-endian 256-bit integer, is at or below `target`.
    pub fn meets_target(&self, target: &Hash) -> bool {
        self.0 <= target.0
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(h: Hash) -> Self {
        h.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::Hash;

    #[test]
    fn test_hex_roundtrip() {
        let text = "00000000ffff0000000000000000000000000000000000000000000000000000";
        let hash = Hash::from_hex(text).unwrap();
        assert_eq!(hash.to_string(), text);
    }

    #[test]
    fn test_from_hex_rejects_short_input() {
        assert!(Hash::from_hex("abcd").is_err());
        assert!(Hash::from_hex("zz").is_err());
    }

    #[test]
    fn test_meets_target() {
        let target = Hash::from_hex("00000000ffff0000000000000000000000000000000000000000000000000000").unwrap();
        let mut low = [0u8; 32];
        low[5] = 0x01;
        let mut high = [0u8; 32];
        high[0] = 0x01;

        assert!(Hash::from(low).meets_target(&target));
        assert!(!Hash::from(high).meets_target(&target));
        assert!(target.meets_target(&target));
    }
}

//! Per-process instance identifier.
//!
//! The id namespaces job ids and extranonces so two pool processes, or two
//! runs of the same one, never hand out colliding identifiers.

use rand::RngCore;

/// Draws a non-zero id from `rng`.
///
/// Four bytes are read and interpreted little-endian; an all-zero draw is
/// discarded and retried. A failing source is returned as-is, never replaced
/// by a weaker one.
pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Result<u32, rand::Error> {
    let mut bytes = [0u8; 4];
    loop {
        rng.try_fill_bytes(&mut bytes)?;
        if bytes != [0u8; 4] {
            return Ok(u32::from_le_bytes(bytes));
        }
    }
}

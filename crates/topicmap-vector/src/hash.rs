use std::hash::Hasher;
use twox_hash::XxHash64;

/// Clears the sign bit so every hashed id is a valid non-negative `i64`.
pub const ID_MASK: u64 = (1 << 63) - 1;

/// xxHash64 (seed 0) of the UTF-8 bytes, masked to 63 bits.
///
/// The space has 2^63 values, so by the birthday bound a corpus of `n` identifiers
/// collides with probability about `n^2 / 2^64` (roughly 5e-8 for a million ids).
/// Collisions are not assumed away: [`crate::IdMap::assign`] rejects them.
pub fn hash_id(id: &str) -> i64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(id.as_bytes());
    (hasher.finish() & ID_MASK) as i64
}

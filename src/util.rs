//! Common utility functions.
//!
//! Provides branch prediction hints and hash functions used across modules.

/// Marker function for cold code paths.
///
/// Used with branch prediction hints to inform the compiler about infrequently executed paths.
#[inline(always)]
#[cold]
pub fn cold() {}

/// Branch prediction hint for conditions expected to be false.
#[inline(always)]
pub fn unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}

/// Branch prediction hint for conditions expected to be true.
#[inline(always)]
pub fn likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

/// FNV-1a 64-bit hash constants.
pub mod fnv64 {
    /// Offset basis for FNV-1a 64-bit hash.
    pub const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    /// Prime multiplier for FNV-1a 64-bit hash.
    pub const PRIME: u64 = 0x100000001b3;
}

/// Computes FNV-1a 64-bit hash for one value.
///
/// Non-cryptographic hash suitable for signature keys and hash tables.
#[inline(always)]
pub fn fnv1a_hash_u64(mut hash: u64, value: u64) -> u64 {
    hash ^= value;
    hash.wrapping_mul(fnv64::PRIME)
}

/// Computes FNV-1a 64-bit hash for a sequence of integer codes.
#[inline(always)]
pub fn fnv1a_hash_codes(mut hash: u64, codes: &[i64]) -> u64 {
    for &code in codes {
        hash = fnv1a_hash_u64(hash, code as u64);
    }
    hash
}

//! Hash functions backing the sketch's triple-hash decomposition.
//!
//! The sketch needs two independent 64-bit halves of a 128-bit hash per
//! element. Rather than pull in a dedicated 128-bit hasher, this follows the
//! same idiom the bloom-filter module of this codebase's lineage uses for
//! independent hash functions: run a fast 64-bit hash twice with distinct
//! seeds.

use twox_hash::XxHash64;
use std::hash::Hasher;

/// Hashes `data` with `XxHash64` under the given seed.
#[inline]
pub fn xxhash(data: &[u8], seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(data);
    hasher.finish()
}

/// Produces the two independent 64-bit halves (`h1`, `h2`) of the element's
/// canonical byte encoding that the triple hash (`crate::sketch`) splits
/// into a leading-zero register value and a bucket index / tail pair.
#[inline]
pub fn split_hash(data: &[u8]) -> (u64, u64) {
    (xxhash(data, 0), xxhash(data, 1))
}

/// 1-based position of the leading 1 bit of `x`, i.e. `bit_length(x)`.
///
/// `bit_length(0) == 0`; otherwise `bit_length(x) == floor(log2(x)) + 1`.
#[inline]
pub fn bit_length(x: u64) -> u32 {
    64 - x.leading_zeros()
}

//! HyperMinHash: a HyperLogLog cardinality estimator augmented with a
//! b-bit k-partition MinHash, so one sketch supports both accurate
//! cardinality estimation across many orders of magnitude and
//! intersection/Jaccard estimation against another sketch of the same
//! shape (Yu, Weber, Berkhin 2013-style construction; see
//! `examples/original_source/hyperminhash.py` of this crate's lineage).
//!
//! # Algorithm Overview
//!
//! Each element is hashed into two independent 64-bit halves `(h1, h2)`.
//! `h1` drives a HyperLogLog-style leading-zero counter; `h2` selects a
//! bucket and contributes `r` tail bits that refine that bucket into a
//! b-bit MinHash register. A single register therefore stores the pair
//! `(LZ, TAIL)`, ordered lexicographically: a strictly larger `LZ` always
//! wins, and ties are broken by keeping the smaller `TAIL` (the MinHash
//! rule). `count` estimates cardinality from the `LZ` array via HLL
//! (falling back to linear counting for small cardinalities) until the
//! estimate grows large enough that the MinHash `(LZ, TAIL)` pair carries
//! more signal; `jaccard` compares two sketches' registers directly,
//! correcting for collisions that would occur even between disjoint sets.
//!
//! # Time Complexity
//!
//! - `update`: O(1)
//! - `count`: O(m) where `m = 2^bucketbits`
//! - `merge`, `jaccard`, `intersection`: O(m)
//!
//! # Space Complexity
//!
//! O(m * (bucketsize + 1) / 8 + m * ceil(subbucketsize / 8)) bytes.
//!
//! # Examples
//!
//! ```
//! use hyperminhash::{CollisionMode, Sketch};
//!
//! let mut a = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
//! let mut b = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
//!
//! for i in 0..10_000 {
//!     a.update(&i);
//! }
//! for i in 5_000..15_000 {
//!     b.update(&i);
//! }
//!
//! // ~15000 elements in the union, ~1/3 Jaccard similarity.
//! assert!((a.merge(&b).unwrap().count() - 15_000.0).abs() / 15_000.0 < 0.2);
//! assert!((a.jaccard(&b).unwrap() - (5_000.0 / 15_000.0)).abs() < 0.2);
//! ```

use std::fmt;

use crate::codec;
use crate::collision::{self, CollisionMode};
use crate::common::hash;
use crate::common::{validation, Result, SketchError};

/// A HyperMinHash sketch: `m = 2^bucketbits` registers, each holding a
/// leading-zero counter `LZ` (width `bucketsize + 1` bits) and a MinHash
/// tail `TAIL` (width `subbucketsize` bits).
///
/// Two sketches may only be merged, compared, or intersected if their
/// `(bucketbits, bucketsize, subbucketsize, collision_correction)` tuples
/// agree exactly; mismatches return [`SketchError::MismatchError`].
#[derive(Clone, Debug, PartialEq)]
pub struct Sketch {
    p: u32,
    q: u32,
    r: u32,
    mode: CollisionMode,
    /// Leading-zero register per bucket; `0` means empty. Width `q + 1`
    /// bits suffices (`q <= 6`, so a byte is always enough).
    lz: Vec<u8>,
    /// MinHash tail per bucket; `0` when empty. Width `r` bits (`r <= 64`).
    tail: Vec<u64>,
}

impl Sketch {
    /// Constructs an empty sketch.
    ///
    /// - `bucketbits` (`p`) in `[0, 30]` selects `m = 2^p` registers.
    /// - `bucketsize` (`q`) in `[0, 6]` is the width of the leading-zero
    ///   counter; the hash's first half only ever yields a value in
    ///   `[1, 2^q]`, so `q` cannot exceed 6 without needing more than the
    ///   64 bits that half provides.
    /// - `subbucketsize` (`r`) in `[0, 64 - p]` is the MinHash tail width
    ///   carved out of the hash's second half, which also supplies the `p`
    ///   bucket-selection bits; the two must fit together in 64 bits.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::ParameterError`] if `q > 6`, `p > 30`, or
    /// `p + r > 64`.
    pub fn new(bucketbits: u32, bucketsize: u32, subbucketsize: u32, mode: CollisionMode) -> Result<Self> {
        validation::validate_bucketsize(bucketsize)?;
        validation::validate_bucketbits_and_subbucketsize(bucketbits, subbucketsize)?;

        let m = 1usize << bucketbits;
        Ok(Sketch {
            p: bucketbits,
            q: bucketsize,
            r: subbucketsize,
            mode,
            lz: vec![0u8; m],
            tail: vec![0u64; m],
        })
    }

    /// `bucketbits`: `log2` of the register count.
    #[inline]
    pub fn bucketbits(&self) -> u32 {
        self.p
    }

    /// `bucketsize`: width of the leading-zero counter, in bits.
    #[inline]
    pub fn bucketsize(&self) -> u32 {
        self.q
    }

    /// `subbucketsize`: width of the MinHash tail, in bits.
    #[inline]
    pub fn subbucketsize(&self) -> u32 {
        self.r
    }

    /// Which collision-correction mode `jaccard`/`intersection` use.
    #[inline]
    pub fn collision_correction(&self) -> CollisionMode {
        self.mode
    }

    /// Number of registers, `m = 2^bucketbits`.
    #[inline]
    pub fn num_registers(&self) -> usize {
        self.lz.len()
    }

    /// Updates the sketch with a single element.
    ///
    /// The element is encoded via its `Display` implementation (the
    /// UTF-8 text of, e.g., its decimal representation for integers) to
    /// match the reference implementation this crate's wire format is
    /// compatible with. Use [`Sketch::update_bytes`] if you need to hash
    /// raw bytes instead; doing so is not cross-language compatible with
    /// sketches built from the decimal-string encoding.
    pub fn update<T: fmt::Display>(&mut self, item: &T) {
        self.update_bytes(item.to_string().as_bytes());
    }

    /// Updates the sketch with a batch of elements.
    pub fn update_all<T: fmt::Display>(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.update(&item);
        }
    }

    /// Updates the sketch with a single pre-encoded byte string.
    ///
    /// This bypasses the default decimal-string canonicalization
    /// ([`Sketch::update`]); sketches built with this method are only
    /// comparable to other sketches built the same way.
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        let (i, v, t) = self.triple_hash(bytes);
        let lz = self.lz[i];
        if v > lz {
            self.lz[i] = v;
            self.tail[i] = t;
        } else if v == lz && t < self.tail[i] {
            self.tail[i] = t;
        }
    }

    /// The triple hash of `spec.md §4.1`: `(bucket index, leading-zero
    /// value, tail bits)`.
    fn triple_hash(&self, bytes: &[u8]) -> (usize, u8, u64) {
        let (h1, h2) = hash::split_hash(bytes);

        let bit_len = hash::bit_length(h1);
        let v = ((65 - bit_len) as u32).min(1u32 << self.q) as u8;

        let i = if self.p == 0 { 0 } else { (h2 >> (64 - self.p)) as usize };
        let t = if self.r == 0 {
            0
        } else if self.r >= 64 {
            h2
        } else {
            h2 & ((1u64 << self.r) - 1)
        };

        (i, v, t)
    }

    /// Estimates the number of distinct elements inserted so far
    /// (`spec.md §4.3`).
    ///
    /// Uses the HyperLogLog estimate while it's reliable (`bucketsize > 0`
    /// and the estimate is still well below `2^(bucketbits + 10)`), and
    /// falls back to the b-bit MinHash estimate otherwise. A fresh
    /// `bucketsize > 0` sketch estimates `0` (linear counting over all-empty
    /// registers); a fresh `bucketsize == 0` sketch estimates `f64::INFINITY`
    /// (the MinHash sum degenerates to zero with no HLL fallback).
    pub fn count(&self) -> f64 {
        if self.q > 0 {
            let hll = self.hll_estimate();
            if hll < 2.0_f64.powi((self.p + 10) as i32) {
                return hll;
            }
        }
        self.minhash_estimate()
    }

    fn hll_estimate(&self) -> f64 {
        let m = self.num_registers() as f64;
        let sum: f64 = self.lz.iter().map(|&lz| 2.0_f64.powi(-(lz as i32))).sum();
        let alpha = alpha_m(self.num_registers());
        let e = alpha * m * m / sum;

        let zeros = self.lz.iter().filter(|&&lz| lz == 0).count();
        if e <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else if e <= (1.0 / 30.0) * 2.0_f64.powi(32) {
            e
        } else {
            let two_pow_32 = 2.0_f64.powi(32);
            -two_pow_32 * (1.0 - e / two_pow_32).ln()
        }
    }

    fn minhash_estimate(&self) -> f64 {
        let m = self.num_registers() as f64;
        let two_pow_r = 2.0_f64.powi(self.r as i32);
        let sum: f64 = (0..self.lz.len())
            .map(|i| {
                if self.q == 0 {
                    self.tail[i] as f64 / two_pow_r
                } else {
                    2.0_f64.powi(-(self.lz[i] as i32)) * (1.0 + self.tail[i] as f64 / two_pow_r)
                }
            })
            .sum();
        if sum == 0.0 {
            f64::INFINITY
        } else {
            m * m / sum
        }
    }

    /// Number of registers that are not `(0, 0)`.
    pub fn filled_buckets(&self) -> usize {
        (0..self.lz.len())
            .filter(|&i| self.lz[i] != 0 || self.tail[i] != 0)
            .count()
    }

    /// Returns `true` iff `self` and `other` were built with identical
    /// parameters and hold identical registers.
    pub fn equals(&self, other: &Self) -> bool {
        self == other
    }

    /// Ensures two sketches share shape before a merge/compare operation.
    fn ensure_compatible(&self, other: &Self) -> Result<()> {
        if self.p != other.p || self.q != other.q || self.r != other.r || self.mode != other.mode {
            return Err(SketchError::MismatchError {
                reason: format!(
                    "parameters differ: (p={}, q={}, r={}, mode={:?}) vs (p={}, q={}, r={}, mode={:?})",
                    self.p, self.q, self.r, self.mode, other.p, other.q, other.r, other.mode
                ),
            });
        }
        Ok(())
    }

    /// Merges `self` and `other` into a new sketch representing their
    /// union, without mutating either input (`spec.md §4.4`).
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::MismatchError`] if the two sketches'
    /// parameters disagree.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        self.ensure_compatible(other)?;

        let mut lz = vec![0u8; self.lz.len()];
        let mut tail = vec![0u64; self.tail.len()];
        for i in 0..lz.len() {
            let (la, ta) = (self.lz[i], self.tail[i]);
            let (lb, tb) = (other.lz[i], other.tail[i]);
            let (l, t) = match la.cmp(&lb) {
                std::cmp::Ordering::Equal => (la, ta.min(tb)),
                std::cmp::Ordering::Less => (lb, tb),
                std::cmp::Ordering::Greater => (la, ta),
            };
            lz[i] = l;
            tail[i] = t;
        }

        Ok(Sketch {
            p: self.p,
            q: self.q,
            r: self.r,
            mode: self.mode,
            lz,
            tail,
        })
    }

    /// Number of registers that agree between `self` and `other` and are
    /// non-empty in `self` (`spec.md §4.4`, "raw match count").
    fn match_num(&self, other: &Self) -> usize {
        (0..self.lz.len())
            .filter(|&i| {
                let self_nonempty = self.lz[i] != 0 || self.tail[i] != 0;
                self_nonempty && self.lz[i] == other.lz[i] && self.tail[i] == other.tail[i]
            })
            .count()
    }

    /// Estimates the Jaccard index `|A ∩ B| / |A ∪ B|` between `self` and
    /// `other` (`spec.md §4.4`).
    ///
    /// Returns `0.0` when the union has no filled buckets (both sketches
    /// empty); does not clamp a negative `raw - collisions` numerator, so
    /// the result can be slightly negative under heavy collision noise.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::MismatchError`] if parameters disagree, or
    /// [`SketchError::CardinalityOutOfRange`] if `collision_correction` is
    /// [`CollisionMode::Approx`] and a cardinality exceeds what it can
    /// approximate.
    pub fn jaccard(&self, other: &Self) -> Result<f64> {
        self.ensure_compatible(other)?;

        let union = self.merge(other)?;
        let raw = self.match_num(other) as f64;
        let collisions = collision::expected_collisions(self.count(), other.count(), self.p, self.q, self.r, self.mode)?;

        let filled = union.filled_buckets();
        if filled == 0 {
            return Ok(0.0);
        }
        Ok((raw - collisions) / filled as f64)
    }

    /// Computes `(|A ∩ B|, jaccard, rounded bucket intersection, |A ∪ B|)`
    /// (`spec.md §4.4`).
    ///
    /// # Errors
    ///
    /// See [`Sketch::jaccard`].
    pub fn intersection(&self, other: &Self) -> Result<(f64, f64, i64, f64)> {
        let union = self.merge(other)?;
        let union_cardinality = union.count();
        let j = self.jaccard(other)?;
        let rounded_bucket_intersection = (j * union.filled_buckets() as f64).round() as i64;
        Ok((j * union_cardinality, j, rounded_bucket_intersection, union_cardinality))
    }

    /// Serializes the sketch to the bit-packed wire format of
    /// `spec.md §4.6`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13 + 2 * codec::total_byte_len(self.q + 1, self.lz.len()));
        out.extend_from_slice(&self.p.to_le_bytes());
        out.extend_from_slice(&self.q.to_le_bytes());
        out.extend_from_slice(&self.r.to_le_bytes());
        out.push(self.mode.tag());

        let lz_u64: Vec<u64> = self.lz.iter().map(|&x| x as u64).collect();
        out.extend(codec::pack(self.q + 1, &lz_u64));
        out.extend(codec::pack(self.r, &self.tail));
        out
    }

    /// Reconstructs a sketch from bytes produced by [`Sketch::serialize`].
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::DecodeError`] if the mode tag is invalid,
    /// the buffer is truncated, or the packed array lengths are
    /// inconsistent with `(p, q, r)`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        validation::validate_byte_size(bytes.len())?;
        validation::validate_min_size(bytes.len(), 13)?;

        let p = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let q = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let r = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let mode = CollisionMode::from_tag(bytes[12])?;

        validation::validate_bucketsize(q)?;
        validation::validate_bucketbits_and_subbucketsize(p, r)?;

        let lz_section = &bytes[13..];
        let (lz_bits, lz_vals) = codec::unpack(lz_section)?;
        if lz_bits != q + 1 {
            return Err(SketchError::DecodeError(format!(
                "LZ array packed with {} bits, expected {}",
                lz_bits,
                q + 1
            )));
        }

        let lz_byte_len = codec::total_byte_len(lz_bits, lz_vals.len());
        validation::validate_min_size(lz_section.len(), lz_byte_len)?;
        let tail_section = &lz_section[lz_byte_len..];
        let (tail_bits, tail_vals) = codec::unpack(tail_section)?;
        if tail_bits != r {
            return Err(SketchError::DecodeError(format!(
                "TAIL array packed with {} bits, expected {}",
                tail_bits, r
            )));
        }

        let expected_len = 1usize << p;
        if lz_vals.len() != expected_len || tail_vals.len() != expected_len {
            return Err(SketchError::DecodeError(format!(
                "register array length mismatch: expected {}, got LZ={} TAIL={}",
                expected_len,
                lz_vals.len(),
                tail_vals.len()
            )));
        }

        Ok(Sketch {
            p,
            q,
            r,
            mode,
            lz: lz_vals.into_iter().map(|x| x as u8).collect(),
            tail: tail_vals,
        })
    }
}

/// The `alpha_m` bias constant for the HyperLogLog raw estimate
/// (`spec.md §4.3`).
fn alpha_m(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_sketch(p: u32, q: u32, r: u32, mode: CollisionMode, range: std::ops::Range<u64>) -> Sketch {
        let mut s = Sketch::new(p, q, r, mode).unwrap();
        for i in range {
            s.update(&i);
        }
        s
    }

    #[test]
    fn new_rejects_invalid_parameters() {
        assert!(Sketch::new(8, 7, 8, CollisionMode::Approx).is_err());
        assert!(Sketch::new(60, 6, 10, CollisionMode::Approx).is_err());
        assert!(Sketch::new(31, 0, 0, CollisionMode::Approx).is_err());
    }

    #[test]
    fn new_sketch_is_all_empty() {
        let s = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
        assert_eq!(s.num_registers(), 256);
        assert_eq!(s.filled_buckets(), 0);
        // Linear counting over all-empty registers: m * ln(m / m) == 0.
        assert_eq!(s.count(), 0.0);
    }

    #[test]
    fn new_pure_minhash_sketch_is_infinite_when_empty() {
        // bucketsize == 0 has no HLL fallback; an all-zero MinHash sum
        // degenerates to +Inf rather than 0.
        let s = Sketch::new(8, 0, 8, CollisionMode::Approx).unwrap();
        assert!(s.count().is_infinite());
    }

    #[test]
    fn update_is_idempotent() {
        let mut s = Sketch::new(8, 6, 8, CollisionMode::False).unwrap();
        for _ in 0..1000 {
            s.update(&"same-item");
        }
        let estimate = s.count();
        assert!(estimate < 2.0, "repeated updates should not inflate count, got {}", estimate);
    }

    #[test]
    fn update_is_commutative_under_permutation() {
        let items: Vec<u64> = (0..500).collect();
        let mut forward = Sketch::new(6, 6, 8, CollisionMode::Approx).unwrap();
        for i in &items {
            forward.update(i);
        }

        let mut reversed = Sketch::new(6, 6, 8, CollisionMode::Approx).unwrap();
        for i in items.iter().rev() {
            reversed.update(i);
        }

        assert_eq!(forward, reversed);
    }

    #[test]
    fn equality_is_reflexive() {
        let s = seq_sketch(8, 6, 8, CollisionMode::Approx, 0..1000);
        assert_eq!(s, s.clone());
        assert!(s.equals(&s));
    }

    #[test]
    fn distinct_multisets_are_almost_never_equal() {
        let a = seq_sketch(8, 6, 8, CollisionMode::Approx, 0..5000);
        let b = seq_sketch(8, 6, 8, CollisionMode::Approx, 1..5001);
        assert_ne!(a, b);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let a = seq_sketch(6, 6, 8, CollisionMode::Approx, 0..200);
        let b = seq_sketch(6, 6, 8, CollisionMode::Approx, 100..300);
        let c = seq_sketch(6, 6, 8, CollisionMode::Approx, 250..400);

        assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
        assert_eq!(
            a.merge(&b.merge(&c).unwrap()).unwrap(),
            a.merge(&b).unwrap().merge(&c).unwrap()
        );
    }

    #[test]
    fn merge_rejects_mismatched_parameters() {
        let a = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
        let b = Sketch::new(10, 6, 8, CollisionMode::Approx).unwrap();
        assert!(matches!(a.merge(&b), Err(SketchError::MismatchError { .. })));
    }

    #[test]
    fn jaccard_rejects_mismatched_parameters() {
        let a = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
        let b = Sketch::new(8, 0, 8, CollisionMode::Approx).unwrap();
        assert!(matches!(a.jaccard(&b), Err(SketchError::MismatchError { .. })));
    }

    #[test]
    fn jaccard_of_two_empty_sketches_is_zero() {
        let a = Sketch::new(8, 6, 8, CollisionMode::False).unwrap();
        let b = Sketch::new(8, 6, 8, CollisionMode::False).unwrap();
        assert_eq!(a.jaccard(&b).unwrap(), 0.0);
    }

    #[test]
    fn jaccard_of_identical_sketches_is_near_one() {
        let a = seq_sketch(8, 6, 8, CollisionMode::False, 0..20_000);
        let j = a.jaccard(&a).unwrap();
        assert!((j - 1.0).abs() < 0.05, "jaccard of identical sets should be ~1, got {}", j);
    }

    #[test]
    fn serialization_round_trips_lz_exactly() {
        let s = seq_sketch(8, 6, 8, CollisionMode::Approx, 0..10_000);
        let bytes = s.serialize();
        let restored = Sketch::deserialize(&bytes).unwrap();
        assert_eq!(restored.lz, s.lz);
        assert_eq!(restored.tail, s.tail);
        assert_eq!(restored, s);
    }

    #[test]
    fn deserialize_rejects_invalid_mode_tag() {
        let s = Sketch::new(4, 6, 8, CollisionMode::Approx).unwrap();
        let mut bytes = s.serialize();
        bytes[12] = b'z';
        assert!(Sketch::deserialize(&bytes).is_err());
    }

    #[test]
    fn deserialize_rejects_truncated_input() {
        let s = seq_sketch(6, 6, 8, CollisionMode::Approx, 0..100);
        let bytes = s.serialize();
        assert!(Sketch::deserialize(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn pure_minhash_regime_handles_q_zero() {
        // bucketsize = 0 forces the MinHash-only count path.
        let mut a = Sketch::new(8, 0, 8, CollisionMode::False).unwrap();
        let mut b = Sketch::new(8, 0, 8, CollisionMode::False).unwrap();
        for i in 0..10_000u64 {
            a.update(&i);
        }
        for i in 8_000..10_000u64 {
            b.update(&i);
        }
        let est_a = a.count();
        let rel_err = 1.0 / (a.num_registers() as f64).sqrt();
        assert!(
            (est_a - 10_000.0).abs() / 10_000.0 < 2.0 * rel_err,
            "MinHash-only count estimate {} too far from 10000",
            est_a
        );
    }
}

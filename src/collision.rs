//! Expected-collision model: how many register matches between two
//! independent sketches are spurious (i.e. would occur even if the two
//! underlying sets shared nothing).
//!
//! Three modes trade off speed against bias, matching `spec.md §4.5`:
//!
//! - [`CollisionMode::False`]: always `0`. Fastest, biased when sketches are
//!   densely filled.
//! - [`CollisionMode::Approx`]: piecewise approximation, fast, the
//!   recommended default.
//! - [`CollisionMode::Precise`]: exact double summation over arbitrary
//!   precision decimals. Cost scales with `2^bucketsize * 2^subbucketsize`;
//!   impractical once `subbucketsize` grows much past ~20.

use bigdecimal::{BigDecimal, One, ToPrimitive, Zero};

use crate::common::{Result, SketchError};

/// Digits of precision `precise` collision arithmetic is carried out at.
/// `spec.md §9` notes 100 digits suffice for cardinalities up to `2^40`.
const PRECISION: u64 = 100;

/// `0.169919487159739093975315012348630288992889`, the asymptotic constant
/// used by the high-cardinality branch of [`CollisionMode::Approx`].
const ASYMPTOTIC_KAPPA: f64 = 0.169919487159739093975315012348630288992889;

/// Which expected-collision estimator a [`crate::Sketch`] uses when
/// computing Jaccard similarity and intersection cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionMode {
    /// Assume zero collisions. Fast, biased when sketches are dense.
    False,
    /// Piecewise closed-form / asymptotic approximation.
    Approx,
    /// Exact summation using arbitrary-precision decimals.
    Precise,
}

impl CollisionMode {
    /// The single-byte tag used by the bit-packed serialization format.
    pub(crate) fn tag(self) -> u8 {
        match self {
            CollisionMode::Approx => b'a',
            CollisionMode::Precise => b'p',
            CollisionMode::False => b'f',
        }
    }

    /// Parses the single-byte mode tag written by [`CollisionMode::tag`].
    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'a' => Ok(CollisionMode::Approx),
            b'p' => Ok(CollisionMode::Precise),
            b'f' => Ok(CollisionMode::False),
            other => Err(SketchError::DecodeError(format!(
                "invalid collision_correction tag: {:?}",
                other as char
            ))),
        }
    }
}

/// Expected number of spurious register matches between two sketches of
/// estimated cardinality `n` and `m`, built with the given `(p, q, r)`.
///
/// `n` and `m` are the cardinality estimates of the two sketches
/// (`Sketch::count`), not exact counts; `precise` rounds them to the
/// nearest non-negative integer before exponentiating, since a sub-integer
/// correction to a cardinality estimate is smaller than the estimator's own
/// error and arbitrary-precision *integer* exponentiation is what keeps the
/// summation numerically exact.
pub fn expected_collisions(n: f64, m: f64, p: u32, q: u32, r: u32, mode: CollisionMode) -> Result<f64> {
    match mode {
        CollisionMode::False => Ok(0.0),
        CollisionMode::Precise => Ok(collisions_precise(n, m, p, q, r)),
        CollisionMode::Approx => collisions_approx(n, m, p, q, r),
    }
}

/// Exact double summation over arbitrary-precision decimals
/// (`spec.md §4.5`, `precise` mode).
pub fn collisions_precise(n: f64, m: f64, p: u32, q: u32, r: u32) -> f64 {
    let n_exp = nonneg_round(n);
    let m_exp = nonneg_round(m);

    let bb2 = pow2(p as u64); // 2^p
    let two_pow_r = pow2(r as u64); // 2^r, as a BigDecimal
    let j_bound: u128 = 1u128 << r; // loop bound; see module docs on cost.

    let mut cp = BigDecimal::zero();
    for i in 1..=(1u64 << q) {
        let denom = pow2(i + r as u64); // 2^(i+r)
        let mut j: u128 = 0;
        while j < j_bound {
            let j_dec = BigDecimal::from(j as u64);
            let (mut b1, mut b2) = if i < (1u64 << q) {
                (
                    (&two_pow_r + &j_dec) / &denom,
                    (&two_pow_r + &j_dec + BigDecimal::one()) / &denom,
                )
            } else {
                let half_denom = pow2(i + r as u64 - 1);
                (&j_dec / &half_denom, (&j_dec + BigDecimal::one()) / &half_denom)
            };
            b1 = (&b1 / &bb2).with_prec(PRECISION);
            b2 = (&b2 / &bb2).with_prec(PRECISION);

            let one_minus_b1 = (BigDecimal::one() - &b1).with_prec(PRECISION);
            let one_minus_b2 = (BigDecimal::one() - &b2).with_prec(PRECISION);

            let pr_x = (big_pow(&one_minus_b1, n_exp) - big_pow(&one_minus_b2, n_exp)).with_prec(PRECISION);
            let pr_y = (big_pow(&one_minus_b1, m_exp) - big_pow(&one_minus_b2, m_exp)).with_prec(PRECISION);

            cp = (cp + (&pr_x * &pr_y)).with_prec(PRECISION);
            j += 1;
        }
    }
    (cp * bb2).to_f64().unwrap_or(0.0)
}

/// The per-HLL-bucket-probability branch of `approx`, used directly when
/// cardinalities are small enough that the asymptotic approximation would
/// be inaccurate (`spec.md §4.5`, `approx`'s `else` branch).
pub fn collisions_approx_small(n: f64, m: f64, p: u32, q: u32, r: u32) -> f64 {
    let mut cp = 0.0_f64;
    let num_hll_buckets = 1u64 << q;
    for i_minus_one in 0..num_hll_buckets {
        let i = i_minus_one + 1;
        let (mut b1, b2) = if i != num_hll_buckets {
            (2.0_f64.powi(-(i as i32)), 2.0_f64.powi(-(i as i32) + 1))
        } else {
            (0.0_f64, 2.0_f64.powi(-(i as i32) + 1))
        };
        b1 /= 2.0_f64.powi(p as i32);
        let b2 = b2 / 2.0_f64.powi(p as i32);
        let pr_x = (1.0 - b1).powf(n) - (1.0 - b2).powf(n);
        let pr_y = (1.0 - b1).powf(m) - (1.0 - b2).powf(m);
        cp += pr_x * pr_y;
    }
    cp * 2.0_f64.powi(p as i32) / 2.0_f64.powi(r as i32)
}

/// Full `approx` dispatcher: asymptotic approximation for large
/// cardinalities, the per-bucket sum for small ones, and a hard error once
/// cardinalities exceed what any approximation here can represent
/// (`spec.md §4.5`, `approx`).
pub fn collisions_approx(n: f64, m: f64, p: u32, q: u32, r: u32) -> Result<f64> {
    let hi = n.max(m);
    let lo = n.min(m);

    let limit_exp = (1u64 << q) as f64 + r as f64 + p as f64 - 10.0;
    let limit = 2.0_f64.powf(limit_exp);
    if hi > limit {
        return Err(SketchError::CardinalityOutOfRange {
            requested: hi,
            limit,
        });
    }

    if hi > 2.0_f64.powi((p + 5) as i32) {
        let ratio = hi / lo;
        let ratio_factor = 4.0 * ratio / (1.0 + ratio).powi(2);
        Ok(ASYMPTOTIC_KAPPA * 2.0_f64.powi(p as i32) * ratio_factor / 2.0_f64.powi(r as i32))
    } else {
        Ok(collisions_approx_small(n, m, p, q, r))
    }
}

/// Rounds a non-negative cardinality estimate to the nearest `u64`,
/// clamping negative noise (which can occur in pathological estimator
/// inputs) to zero.
fn nonneg_round(x: f64) -> u64 {
    if x.is_sign_negative() || x.is_nan() {
        0
    } else if x.is_infinite() {
        u64::MAX
    } else {
        x.round() as u64
    }
}

/// `2^exp` as a `BigDecimal`, computed via repeated squaring so it never
/// overflows a machine integer even for `exp` up to `128`.
fn pow2(exp: u64) -> BigDecimal {
    big_pow(&BigDecimal::from(2u32), exp)
}

/// `base^exponent` for a non-negative integer exponent, computed by
/// exponentiation by squaring with each intermediate rounded to
/// [`PRECISION`] significant digits so the decimal expansion can't explode.
fn big_pow(base: &BigDecimal, mut exponent: u64) -> BigDecimal {
    let mut result = BigDecimal::one();
    let mut b = base.clone();
    loop {
        if exponent & 1 == 1 {
            result = (&result * &b).with_prec(PRECISION);
        }
        exponent >>= 1;
        if exponent == 0 {
            break;
        }
        b = (&b * &b).with_prec(PRECISION);
    }
    result
}

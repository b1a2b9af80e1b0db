//! Parameter validation for sketch construction and deserialization.

use crate::common::{Result, SketchError};

/// Maximum serialized sketch size (256MB), to prevent resource exhaustion
/// when deserializing untrusted input.
pub const MAX_BYTE_SIZE: usize = 256 * 1024 * 1024;

/// Validates `q` (bucketsize): the leading-zero counter must fit in the bits
/// the triple hash actually reserves for it (`q <= 6`, see `spec` `§3.1`).
pub fn validate_bucketsize(q: u32) -> Result<()> {
    if q > 6 {
        return Err(SketchError::ParameterError {
            param: "bucketsize".to_string(),
            value: q.to_string(),
            constraint: "must be in range [0, 6]".to_string(),
        });
    }
    Ok(())
}

/// Validates that `p` (bucketbits) and `r` (subbucketsize) together fit in
/// the 64-bit second hash half they're carved from.
pub fn validate_bucketbits_and_subbucketsize(p: u32, r: u32) -> Result<()> {
    if p > 30 {
        return Err(SketchError::ParameterError {
            param: "bucketbits".to_string(),
            value: p.to_string(),
            constraint: "must be in range [0, 30]".to_string(),
        });
    }
    if p + r > 64 {
        return Err(SketchError::ParameterError {
            param: "subbucketsize".to_string(),
            value: r.to_string(),
            constraint: format!("bucketbits + subbucketsize must not exceed 64 (bucketbits = {})", p),
        });
    }
    Ok(())
}

/// Validates a deserialized byte size doesn't exceed the safety limit.
pub fn validate_byte_size(size: usize) -> Result<()> {
    if size > MAX_BYTE_SIZE {
        return Err(SketchError::DecodeError(format!(
            "serialized sketch size {} exceeds maximum allowed size {}",
            size, MAX_BYTE_SIZE
        )));
    }
    Ok(())
}

/// Validates that at least `required` bytes remain to decode a header or
/// packed section.
pub fn validate_min_size(actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(SketchError::DecodeError(format!(
            "insufficient data: need at least {} bytes, got {}",
            required, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketsize_accepts_zero_through_six() {
        for q in 0..=6 {
            assert!(validate_bucketsize(q).is_ok());
        }
    }

    #[test]
    fn bucketsize_rejects_above_six() {
        assert!(validate_bucketsize(7).is_err());
    }

    #[test]
    fn bucketbits_and_subbucketsize_reject_over_64() {
        assert!(validate_bucketbits_and_subbucketsize(60, 5).is_err());
        assert!(validate_bucketbits_and_subbucketsize(60, 4).is_ok());
    }

    #[test]
    fn bucketbits_rejects_above_thirty() {
        assert!(validate_bucketbits_and_subbucketsize(31, 0).is_err());
    }

    #[test]
    fn min_size_rejects_short_buffers() {
        assert!(validate_min_size(4, 16).is_err());
        assert!(validate_min_size(16, 16).is_ok());
    }
}

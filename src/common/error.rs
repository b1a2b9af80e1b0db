//! Error types for sketch construction, comparison, and (de)serialization.

use std::fmt;

/// Errors that can occur while constructing, updating, comparing, or
/// (de)serializing a [`crate::Sketch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchError {
    /// Invalid parameter provided to the sketch constructor.
    ParameterError {
        /// Parameter name.
        param: String,
        /// Invalid value provided, formatted for display.
        value: String,
        /// Constraint that was violated.
        constraint: String,
    },

    /// `merge` / `equals` / `jaccard` / `intersection` were called with
    /// sketches whose `(p, q, r, collision_correction)` tuples disagree.
    MismatchError {
        /// Reason for the mismatch.
        reason: String,
    },

    /// The `approx` collision estimator was invoked with a cardinality
    /// above the range it can approximate accurately.
    CardinalityOutOfRange {
        /// The cardinality that triggered the failure.
        requested: f64,
        /// The largest cardinality `approx` can handle for these parameters.
        limit: f64,
    },

    /// Malformed serialized input: bad mode tag, truncated buffer, or
    /// inconsistent lengths.
    DecodeError(String),
}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SketchError::ParameterError {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "invalid parameter '{}': value '{}' {}",
                    param, value, constraint
                )
            }
            SketchError::MismatchError { reason } => {
                write!(f, "incompatible sketches: {}", reason)
            }
            SketchError::CardinalityOutOfRange { requested, limit } => {
                write!(
                    f,
                    "cardinality {} exceeds the approximate collision estimator's range ({})",
                    requested, limit
                )
            }
            SketchError::DecodeError(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl std::error::Error for SketchError {}

/// Result type alias for sketch operations.
pub type Result<T> = std::result::Result<T, SketchError>;

//! Unified error handling for the route-profile library.
//!
//! Every fallible operation returns a [`ProfileError`]. Errors are pure
//! functions of their input: the same track or corpus always produces the
//! same error, so nothing in this crate retries. The caller decides whether
//! to keep the previous profile or model.

use thiserror::Error;

/// Unified error type for route-profile operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    /// A column does not have one value per geometry point
    #[error("column '{column}' has {samples} samples but the geometry has {geometry} points")]
    LengthMismatch {
        column: &'static str,
        samples: usize,
        geometry: usize,
    },
    /// NaN or infinite value in an input column
    #[error("column '{column}' has a non-finite value at index {index}")]
    NonFiniteValue { column: &'static str, index: usize },
    /// Cumulative distance goes backwards
    #[error("distance decreases at index {index}: {previous} -> {current}")]
    NonMonotonicDistance {
        index: usize,
        previous: f64,
        current: f64,
    },
    /// The track is shorter than a single resolvable step
    #[error(
        "track is {total_distance:.2}m long, minimum step of {min_step_distance:.2}m cannot be resolved"
    )]
    ResamplingImpossible {
        total_distance: f64,
        min_step_distance: f64,
    },
    /// Configuration error
    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },
    /// Persisted coefficients don't match their category lists
    #[error("model has {found} coefficients, {expected} expected for its categories")]
    InvalidParameters { expected: usize, found: usize },
    /// Model fitting failed
    #[error(transparent)]
    Training(#[from] TrainingError),
    /// Encoding or decoding model parameters failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl ProfileError {
    /// True for malformed input data (raised before any work is done).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ProfileError::LengthMismatch { .. }
                | ProfileError::NonFiniteValue { .. }
                | ProfileError::NonMonotonicDistance { .. }
        )
    }
}

/// Reasons a pace model cannot be fitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    /// No usable observations (none given, or all removed as outliers)
    #[error("no training observations")]
    EmptyCorpus,
    /// NaN or infinite value in an observation
    #[error("observation {index} has a non-finite {field}")]
    NonFiniteObservation { index: usize, field: &'static str },
    /// The regularized normal equations could not be solved
    #[error("normal equations are singular")]
    Singular,
}

/// Result type alias for route-profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProfileError::LengthMismatch {
            column: "altitude",
            samples: 4,
            geometry: 5,
        };
        assert!(err.to_string().contains("altitude"));
        assert!(err.to_string().contains("5 points"));
    }

    #[test]
    fn test_training_error_converts() {
        let err: ProfileError = TrainingError::EmptyCorpus.into();
        assert!(matches!(
            err,
            ProfileError::Training(TrainingError::EmptyCorpus)
        ));
        assert!(!err.is_data_error());
    }
}

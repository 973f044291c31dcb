//! Tests for error module

use route_profile::error::{ProfileError, TrainingError};

#[test]
fn test_error_display() {
    let err = ProfileError::NonMonotonicDistance {
        index: 3,
        previous: 12.5,
        current: 11.0,
    };
    assert!(err.to_string().contains("index 3"));
    assert!(err.to_string().contains("12.5"));

    let err = ProfileError::ResamplingImpossible {
        total_distance: 0.4,
        min_step_distance: 1.0,
    };
    assert!(err.to_string().contains("0.40m"));
}

#[test]
fn test_training_error_converts() {
    let err: ProfileError = TrainingError::Singular.into();
    assert_eq!(err, ProfileError::Training(TrainingError::Singular));
    assert_eq!(err.to_string(), TrainingError::Singular.to_string());
}

#[test]
fn test_data_error_class() {
    assert!(ProfileError::LengthMismatch {
        column: "altitude",
        samples: 1,
        geometry: 2,
    }
    .is_data_error());
    assert!(!ProfileError::InvalidConfig {
        message: "bad".to_string(),
    }
    .is_data_error());
    assert!(!ProfileError::Training(TrainingError::EmptyCorpus).is_data_error());
}

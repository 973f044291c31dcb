//! # Route Profile
//!
//! Elevation profiles, checkpoint discovery and pace prediction for hiking,
//! running and cycling routes.
//!
//! This library provides:
//! - Resampling of raw tracks into clean elevation profiles
//! - Detection of catalog places along a route, one checkpoint per pass
//! - Ridge-regression pace models trained on an athlete's history
//! - Predicted schedules with elapsed time at any point of a route
//!
//! Geometries are `geo::LineString<f64>` in a projected coordinate system
//! with meter units.
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`persistence`** - Enable MessagePack encoding of model parameters
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::LineString;
//! use route_profile::{
//!     apply_schedule, build_profile, find_checkpoints, Place, PredictionModelParameters,
//!     ProfileConfig, RawTrack, ScheduleContext,
//! };
//!
//! let geometry = LineString::from(vec![(0.0, 0.0), (1000.0, 0.0), (2000.0, 0.0)]);
//! let track = RawTrack::from_geometry(geometry, vec![500.0, 550.0, 600.0]).unwrap();
//! let profile = build_profile(&track, &ProfileConfig::default()).unwrap();
//!
//! let places = vec![Place::new("1", "Bridge", "BDG", 1000.0, 20.0)];
//! let checkpoints = find_checkpoints(profile.geometry(), &places, 75.0);
//! assert_eq!(checkpoints.len(), 1);
//!
//! let scheduled = apply_schedule(
//!     profile,
//!     &PredictionModelParameters::activity_default(),
//!     &ScheduleContext::default(),
//! );
//! let eta = checkpoints[0].schedule(&scheduled).unwrap();
//! println!("Bridge after {} s", eta.as_secs());
//! ```

use geo::Point;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ProfileError, Result, TrainingError};

// Planar geometry helpers
pub mod geometry;

// Algorithm toolbox - modular access to individual stages
// Use route_profile::algorithms::{...} for standalone algorithm access
pub mod algorithms;

// Sample tables and the resampling builder
pub mod profile;
pub use profile::{
    build_profile, build_profiles, Column, Profile, ProfileBuilder, ProfileConfig, ProfileState,
    RawTrack, SampleTable,
};
#[cfg(feature = "parallel")]
pub use profile::build_profiles_parallel;

// Spatial index over places
pub mod catalog;
pub use catalog::PlaceCatalog;

// Places along a route
pub mod checkpoints;
pub use checkpoints::{
    find_checkpoints, segments_between, Checkpoint, CheckpointConfig, CheckpointFinder,
};

// Pace regression
pub mod prediction;
pub use prediction::{
    fit, fit_with_config, predict, PredictionModelParameters, TrainingConfig, TrainingFilter,
    TrainingObservation, WorkoutType,
};

// Pace and elapsed time along a profile
pub mod schedule;
pub use schedule::{apply_schedule, query, ScheduleContext, ScheduledProfile};

// Shared model store (singleton with fallback chain)
pub mod registry;
pub use registry::{
    with_registry, ModelKey, ModelRegistry, ModelSource, ResolvedModel, MODEL_REGISTRY,
};

// ============================================================================
// Core Types
// ============================================================================

/// A named location from the place catalog.
///
/// # Example
/// ```
/// use route_profile::Place;
/// let summit = Place::new("42", "Dent de Jaman", "SUM", 2_560_150.0, 1_144_060.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    /// Catalog type code (summit, pass, bus stop...)
    pub place_type: String,
    /// Position in the route coordinate system
    pub location: Point<f64>,
}

impl Place {
    pub fn new(id: &str, name: &str, place_type: &str, x: f64, y: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            place_type: place_type.to_string(),
            location: Point::new(x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    #[test]
    fn test_place_serialization() {
        let place = Place::new("7", "Col de Chaude", "PAS", 1000.0, 250.0);
        let json = serde_json::to_string(&place).unwrap();
        let restored: Place = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, place);
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let geometry = LineString::from(vec![
            (0.0, 0.0),
            (1000.0, 0.0),
            (2000.0, 0.0),
            (3000.0, 0.0),
        ]);
        let track = RawTrack::from_geometry(geometry, vec![0.0, 50.0, 100.0, 100.0]).unwrap();
        let profile = build_profile(&track, &ProfileConfig::default()).unwrap();
        assert!((profile.total_elevation_gain() - 100.0).abs() < 1e-9);

        let places = vec![
            Place::new("1", "Hut", "HUT", 2000.0, 30.0),
            Place::new("2", "Lake", "LAK", 2000.0, 500.0),
        ];
        let checkpoints = find_checkpoints(profile.geometry(), &places, 75.0);
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].place.id, "1");

        let resolved = MODEL_REGISTRY.resolve(Some("nobody"), "unregistered-activity");
        let scheduled = apply_schedule(profile, &resolved.parameters, &ScheduleContext::default());
        let at_hut = checkpoints[0].schedule(&scheduled).unwrap();
        let total = scheduled.total_duration().unwrap();
        assert!(at_hut < total);
    }
}

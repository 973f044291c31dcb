//! # Algorithm Toolbox
//!
//! Direct access to the individual pipeline stages, for callers that want
//! one algorithm without the surrounding workflow.
//!
//! ## Core Algorithms
//!
//! - **Resampling**: minimum-step and maximum-gradient passes over a track
//! - **Checkpoint Search**: close passes of catalog places along a line
//! - **Pace Regression**: ridge regression on polynomial gradient features
//! - **Interpolation**: linear lookup of any column at a line location
//!
//! ## Geometry Utilities
//!
//! - **Cumulative Distance**: planar distance along a projected line
//! - **Point At**: the point at a normalized line location
//!
//! # Example
//!
//! ```rust
//! use route_profile::algorithms::{cumulative_distances, point_at};
//! use geo::LineString;
//!
//! let line = LineString::from(vec![(0.0, 0.0), (300.0, 0.0), (300.0, 400.0)]);
//! assert_eq!(cumulative_distances(&line), vec![0.0, 300.0, 700.0]);
//!
//! let midpoint = point_at(&line, 0.5).unwrap();
//! assert!((midpoint.y() - 50.0).abs() < 1e-9);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Column, Place, SampleTable};

// =============================================================================
// Geometry Utilities
// =============================================================================

pub use crate::geometry::{coord_distance, cumulative_distances, line_length, point_at};

// =============================================================================
// Resampling
// =============================================================================

pub use crate::profile::{build_profile, build_profiles, ProfileConfig};

#[cfg(feature = "parallel")]
pub use crate::profile::build_profiles_parallel;

// =============================================================================
// Checkpoints
// =============================================================================

pub use crate::checkpoints::{find_checkpoints, segments_between, CheckpointConfig};

// =============================================================================
// Pace Regression
// =============================================================================

pub use crate::prediction::{feature_vector, fit, fit_with_config, predict, TrainingConfig};

// =============================================================================
// Interpolation
// =============================================================================

pub use crate::schedule::{apply_schedule, query};

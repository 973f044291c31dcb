//! Elevation profiles: sample tables and the resampling builder.
//!
//! A route's samples move through three stages, each with its own type:
//!
//! - [`RawTrack`]: distance and altitude as imported, one sample per
//!   geometry point.
//! - [`Profile`]: resampled to a minimum step distance and a bounded
//!   gradient, with step distance, gradient and cumulative gain/loss.
//! - [`ScheduledProfile`](crate::schedule::ScheduledProfile): a profile with
//!   predicted pace and elapsed time.
//!
//! Every stage owns its geometry. Dropping a sample always drops the matching
//! geometry point, so table and line keep the same length by construction.
//!
//! ## Example
//! ```rust
//! use geo::LineString;
//! use route_profile::profile::{ProfileBuilder, ProfileConfig, RawTrack, SampleTable};
//!
//! let geometry = LineString::from(vec![(0.0, 0.0), (0.5, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
//! let track = RawTrack::new(geometry, vec![0.0, 0.5, 1.0, 2.0, 3.0], vec![0.0; 5]).unwrap();
//!
//! let profile = ProfileBuilder::new(ProfileConfig::default()).build(&track).unwrap();
//! assert_eq!(profile.len(), 3);
//! assert_eq!(profile.geometry().0.len(), 3);
//! ```

use geo::LineString;
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ProfileError, Result};
use crate::geometry::{cumulative_distances, select_points};
use crate::schedule::ScheduledProfile;

/// Relative slack for step and gradient comparisons, absorbing rounding in
/// distances such as 0.3 - 0.2.
const COMPARISON_EPSILON: f64 = 1e-9;

/// Longest run of short steps, in minimum steps, merged into one step.
/// Densely sampled tracks keep a sample every two minimum steps.
const MERGED_STEP_FACTOR: f64 = 2.0;

// ============================================================================
// Columns
// ============================================================================

/// Per-sample columns a table stage may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Distance,
    Altitude,
    StepDistance,
    Gradient,
    CumulativeElevationGain,
    CumulativeElevationLoss,
    Pace,
    Schedule,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Distance => "distance",
            Column::Altitude => "altitude",
            Column::StepDistance => "step_distance",
            Column::Gradient => "gradient",
            Column::CumulativeElevationGain => "cumulative_elevation_gain",
            Column::CumulativeElevationLoss => "cumulative_elevation_loss",
            Column::Pace => "pace",
            Column::Schedule => "schedule",
        }
    }
}

/// Read access shared by every table stage.
///
/// `column` returns `None` for columns the stage has not computed yet.
pub trait SampleTable {
    /// Ordered cumulative distance in meters.
    fn distance(&self) -> &[f64];

    /// Length of the track covered by the samples, in meters.
    fn total_distance(&self) -> f64;

    fn column(&self, column: Column) -> Option<&[f64]>;

    fn len(&self) -> usize {
        self.distance().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpolated value of `column` at a normalized line location.
    fn value_at(&self, line_location: f64, column: Column) -> Option<f64> {
        crate::schedule::query(self, line_location, column)
    }

    fn altitude_at(&self, line_location: f64) -> Option<f64> {
        self.value_at(line_location, Column::Altitude)
    }

    fn start_altitude(&self) -> Option<f64> {
        self.altitude_at(0.0)
    }

    fn end_altitude(&self) -> Option<f64> {
        self.altitude_at(1.0)
    }
}

// ============================================================================
// Raw Track
// ============================================================================

/// Imported samples, index-aligned with the route geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrack {
    geometry: LineString<f64>,
    distance: Vec<f64>,
    altitude: Vec<f64>,
}

impl RawTrack {
    /// Create a track from a geometry and its per-point distance and altitude.
    ///
    /// Fails if a column length differs from the point count, a value is not
    /// finite, or distance decreases anywhere.
    pub fn new(geometry: LineString<f64>, distance: Vec<f64>, altitude: Vec<f64>) -> Result<Self> {
        let points = geometry.0.len();
        check_column("distance", &distance, points)?;
        check_column("altitude", &altitude, points)?;

        for (i, pair) in distance.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(ProfileError::NonMonotonicDistance {
                    index: i + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }

        Ok(Self {
            geometry,
            distance,
            altitude,
        })
    }

    /// Create a track whose distance column is measured along the geometry.
    pub fn from_geometry(geometry: LineString<f64>, altitude: Vec<f64>) -> Result<Self> {
        let distance = cumulative_distances(&geometry);
        Self::new(geometry, distance, altitude)
    }

    /// A route without profile data.
    pub fn empty() -> Self {
        Self {
            geometry: LineString::new(vec![]),
            distance: vec![],
            altitude: vec![],
        }
    }

    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    pub fn altitude(&self) -> &[f64] {
        &self.altitude
    }

    pub fn into_parts(self) -> (LineString<f64>, Vec<f64>, Vec<f64>) {
        (self.geometry, self.distance, self.altitude)
    }
}

impl SampleTable for RawTrack {
    fn distance(&self) -> &[f64] {
        &self.distance
    }

    fn total_distance(&self) -> f64 {
        match (self.distance.first(), self.distance.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    fn column(&self, column: Column) -> Option<&[f64]> {
        match column {
            Column::Distance => Some(&self.distance),
            Column::Altitude => Some(&self.altitude),
            _ => None,
        }
    }
}

fn check_column(column: &'static str, values: &[f64], points: usize) -> Result<()> {
    if values.len() != points {
        return Err(ProfileError::LengthMismatch {
            column,
            samples: values.len(),
            geometry: points,
        });
    }
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ProfileError::NonFiniteValue { column, index }),
        None => Ok(()),
    }
}

// ============================================================================
// Resampled Profile
// ============================================================================

/// A resampled elevation profile.
///
/// Every step after the first is at least `min_step_distance` long and every
/// gradient lies within `±max_gradient`.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    geometry: LineString<f64>,
    distance: Vec<f64>,
    altitude: Vec<f64>,
    step_distance: Vec<f64>,
    gradient: Vec<f64>,
    cumulative_elevation_gain: Vec<f64>,
    cumulative_elevation_loss: Vec<f64>,
    total_distance: f64,
    total_elevation_gain: f64,
    total_elevation_loss: f64,
}

impl Profile {
    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    pub fn altitude(&self) -> &[f64] {
        &self.altitude
    }

    /// Distance from the previous retained sample; 0 for the first sample.
    pub fn step_distance(&self) -> &[f64] {
        &self.step_distance
    }

    /// Slope of the step ending at each sample, in percent.
    pub fn gradient(&self) -> &[f64] {
        &self.gradient
    }

    pub fn cumulative_elevation_gain(&self) -> &[f64] {
        &self.cumulative_elevation_gain
    }

    /// Running sum of descents (zero or negative).
    pub fn cumulative_elevation_loss(&self) -> &[f64] {
        &self.cumulative_elevation_loss
    }

    pub fn total_elevation_gain(&self) -> f64 {
        self.total_elevation_gain
    }

    pub fn total_elevation_loss(&self) -> f64 {
        self.total_elevation_loss
    }

    /// Drop the derived columns, e.g. to rebuild with other settings.
    pub fn into_raw(self) -> RawTrack {
        RawTrack {
            geometry: self.geometry,
            distance: self.distance,
            altitude: self.altitude,
        }
    }
}

impl SampleTable for Profile {
    fn distance(&self) -> &[f64] {
        &self.distance
    }

    fn total_distance(&self) -> f64 {
        self.total_distance
    }

    fn column(&self, column: Column) -> Option<&[f64]> {
        match column {
            Column::Distance => Some(&self.distance),
            Column::Altitude => Some(&self.altitude),
            Column::StepDistance => Some(&self.step_distance),
            Column::Gradient => Some(&self.gradient),
            Column::CumulativeElevationGain => Some(&self.cumulative_elevation_gain),
            Column::CumulativeElevationLoss => Some(&self.cumulative_elevation_loss),
            Column::Pace | Column::Schedule => None,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Configuration for profile resampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Smallest resolvable step between two samples, in meters.
    /// Default: 1.0
    pub min_step_distance: f64,

    /// Largest plausible gradient magnitude, in percent.
    /// Default: 100.0 (a 45° slope)
    pub max_gradient: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_step_distance: 1.0,
            max_gradient: 100.0,
        }
    }
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_step_distance.is_finite() && self.min_step_distance > 0.0) {
            return Err(ProfileError::InvalidConfig {
                message: format!(
                    "min_step_distance must be positive, got {}",
                    self.min_step_distance
                ),
            });
        }
        if !(self.max_gradient.is_finite() && self.max_gradient > 0.0) {
            return Err(ProfileError::InvalidConfig {
                message: format!("max_gradient must be positive, got {}", self.max_gradient),
            });
        }
        Ok(())
    }
}

/// Turns raw tracks into resampled profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileBuilder {
    config: ProfileConfig,
}

impl ProfileBuilder {
    pub fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Resample a track and derive its gradient and elevation columns.
    ///
    /// Running the builder on its own output with the same configuration
    /// returns the same profile.
    pub fn build(&self, track: &RawTrack) -> Result<Profile> {
        self.config.validate()?;

        let total_distance = track.total_distance();
        if track.len() < 2 || total_distance < self.config.min_step_distance {
            return Err(ProfileError::ResamplingImpossible {
                total_distance,
                min_step_distance: self.config.min_step_distance,
            });
        }

        let by_step = retain_by_step(&track.distance, self.config.min_step_distance);
        let kept = retain_by_gradient(
            &track.distance,
            &track.altitude,
            &by_step,
            self.config.max_gradient,
        );
        debug!(
            "[Profile] Resampled {} samples: {} after step pass, {} after gradient pass",
            track.len(),
            by_step.len(),
            kept.len()
        );

        Ok(self.assemble(track, &kept))
    }

    fn assemble(&self, track: &RawTrack, kept: &[usize]) -> Profile {
        let geometry = select_points(&track.geometry, kept);
        let distance: Vec<f64> = kept.iter().map(|&i| track.distance[i]).collect();
        let altitude: Vec<f64> = kept.iter().map(|&i| track.altitude[i]).collect();

        let n = kept.len();
        let mut step_distance = Vec::with_capacity(n);
        let mut gradient = Vec::with_capacity(n);
        let mut cumulative_elevation_gain = Vec::with_capacity(n);
        let mut cumulative_elevation_loss = Vec::with_capacity(n);

        let (mut gain, mut loss) = (0.0, 0.0);
        for i in 0..n {
            if i == 0 {
                step_distance.push(0.0);
                gradient.push(0.0);
            } else {
                let step = distance[i] - distance[i - 1];
                let climb = altitude[i] - altitude[i - 1];
                step_distance.push(step);
                gradient.push(
                    (climb / step * 100.0).clamp(-self.config.max_gradient, self.config.max_gradient),
                );
                if climb > 0.0 {
                    gain += climb;
                } else {
                    loss += climb;
                }
            }
            cumulative_elevation_gain.push(gain);
            cumulative_elevation_loss.push(loss);
        }

        Profile {
            geometry,
            total_distance: step_distance.iter().sum(),
            distance,
            altitude,
            step_distance,
            gradient,
            cumulative_elevation_gain,
            cumulative_elevation_loss,
            total_elevation_gain: gain,
            total_elevation_loss: loss,
        }
    }
}

/// Resample a track with the given configuration.
pub fn build_profile(track: &RawTrack, config: &ProfileConfig) -> Result<Profile> {
    ProfileBuilder::new(*config).build(track)
}

/// Resample many routes, one result per track.
pub fn build_profiles(tracks: &[RawTrack], config: &ProfileConfig) -> Vec<Result<Profile>> {
    let builder = ProfileBuilder::new(*config);
    tracks.iter().map(|t| builder.build(t)).collect()
}

/// Parallel version of [`build_profiles`].
#[cfg(feature = "parallel")]
pub fn build_profiles_parallel(
    tracks: &[RawTrack],
    config: &ProfileConfig,
) -> Vec<Result<Profile>> {
    let builder = ProfileBuilder::new(*config);
    tracks.par_iter().map(|t| builder.build(t)).collect()
}

/// Step pass: indices of the samples that survive the minimum step distance.
///
/// A sample closer than `min_step` to its predecessor is folded into its
/// successor, unless the run of folded samples already spans
/// `MERGED_STEP_FACTOR` minimum steps since the last kept sample. The first
/// and last samples always survive; a short final step absorbs the sample
/// before it instead.
fn retain_by_step(distance: &[f64], min_step: f64) -> Vec<usize> {
    let last = distance.len() - 1;
    let spans = |from: usize, to: usize, step: f64| {
        distance[to] - distance[from] >= step * (1.0 - COMPARISON_EPSILON)
    };

    let mut kept = Vec::with_capacity(distance.len());
    kept.push(0);
    for i in 1..last {
        let previous = kept[kept.len() - 1];
        if spans(i - 1, i, min_step) || spans(previous, i, MERGED_STEP_FACTOR * min_step) {
            kept.push(i);
        }
    }

    while kept.len() > 1 && !spans(kept[kept.len() - 1], last, min_step) {
        kept.pop();
    }
    kept.push(last);
    kept
}

/// Gradient pass over the step-pass survivors.
///
/// Scans left to right; a sample whose gradient from the last kept sample
/// exceeds `max_gradient` is merged into its successor. A steep final step
/// absorbs preceding samples until it flattens or only the first remains.
fn retain_by_gradient(
    distance: &[f64],
    altitude: &[f64],
    candidates: &[usize],
    max_gradient: f64,
) -> Vec<usize> {
    let limit = max_gradient * (1.0 + COMPARISON_EPSILON);
    let is_plausible = |from: usize, to: usize| {
        let climb = altitude[to] - altitude[from];
        (climb / (distance[to] - distance[from]) * 100.0).abs() <= limit
    };

    let (first, last) = (candidates[0], candidates[candidates.len() - 1]);
    let mut kept = Vec::with_capacity(candidates.len());
    kept.push(first);
    for &i in &candidates[1..candidates.len() - 1] {
        if is_plausible(kept[kept.len() - 1], i) {
            kept.push(i);
        }
    }

    while kept.len() > 1 && !is_plausible(kept[kept.len() - 1], last) {
        kept.pop();
    }
    kept.push(last);
    kept
}

// ============================================================================
// Profile State
// ============================================================================

/// The processing stage a route's samples have reached.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileState {
    Raw(RawTrack),
    Resampled(Profile),
    Scheduled(ScheduledProfile),
}

impl ProfileState {
    pub fn stage(&self) -> &'static str {
        match self {
            ProfileState::Raw(_) => "raw",
            ProfileState::Resampled(_) => "resampled",
            ProfileState::Scheduled(_) => "scheduled",
        }
    }

    pub fn geometry(&self) -> &LineString<f64> {
        match self {
            ProfileState::Raw(track) => track.geometry(),
            ProfileState::Resampled(profile) => profile.geometry(),
            ProfileState::Scheduled(scheduled) => scheduled.profile().geometry(),
        }
    }

    /// The resampled profile, if this state has one.
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            ProfileState::Raw(_) => None,
            ProfileState::Resampled(profile) => Some(profile),
            ProfileState::Scheduled(scheduled) => Some(scheduled.profile()),
        }
    }

    /// Regenerate the profile from the underlying samples.
    ///
    /// Any schedule is discarded since it depends on the old resampling.
    pub fn resample(self, config: &ProfileConfig) -> Result<ProfileState> {
        let raw = match self {
            ProfileState::Raw(track) => track,
            ProfileState::Resampled(profile) => profile.into_raw(),
            ProfileState::Scheduled(scheduled) => scheduled.into_profile().into_raw(),
        };
        build_profile(&raw, config).map(ProfileState::Resampled)
    }
}

impl SampleTable for ProfileState {
    fn distance(&self) -> &[f64] {
        match self {
            ProfileState::Raw(track) => track.distance(),
            ProfileState::Resampled(profile) => profile.distance(),
            ProfileState::Scheduled(scheduled) => scheduled.distance(),
        }
    }

    fn total_distance(&self) -> f64 {
        match self {
            ProfileState::Raw(track) => track.total_distance(),
            ProfileState::Resampled(profile) => profile.total_distance(),
            ProfileState::Scheduled(scheduled) => scheduled.total_distance(),
        }
    }

    fn column(&self, column: Column) -> Option<&[f64]> {
        match self {
            ProfileState::Raw(track) => track.column(column),
            ProfileState::Resampled(profile) => profile.column(column),
            ProfileState::Scheduled(scheduled) => scheduled.column(column),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line(n: usize) -> LineString<f64> {
        LineString::from((0..n).map(|i| (i as f64, 0.0)).collect::<Vec<_>>())
    }

    #[test]
    fn test_retain_by_step_merges_short_steps() {
        assert_eq!(retain_by_step(&[0.0, 0.5, 1.0, 2.0, 3.0], 1.0), vec![0, 3, 4]);
    }

    #[test]
    fn test_retain_by_step_bounds_merged_runs() {
        let distance: Vec<f64> = (0..11).map(|i| i as f64 * 0.8).collect();
        assert_eq!(retain_by_step(&distance, 1.0), vec![0, 3, 6, 10]);
    }

    #[test]
    fn test_retain_by_step_short_final_step() {
        // The last sample stays; the one before it is folded in
        assert_eq!(retain_by_step(&[0.0, 1.0, 2.0, 2.4], 1.0), vec![0, 1, 3]);
    }

    #[test]
    fn test_retain_by_step_tolerates_rounding() {
        let distance = [0.0, 0.1, 0.2, 0.3];
        assert_eq!(retain_by_step(&distance, 0.1), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_retain_by_gradient_removes_spike() {
        let distance = [0.0, 10.0, 20.0, 30.0, 40.0];
        let altitude = [0.0, 0.0, 50.0, 0.0, 0.0];
        let kept = retain_by_gradient(&distance, &altitude, &[0, 1, 2, 3, 4], 100.0);
        assert_eq!(kept, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_two_point_gradient_is_clamped() {
        let track = RawTrack::new(straight_line(2), vec![0.0, 10.0], vec![0.0, 50.0]).unwrap();
        let profile = build_profile(&track, &ProfileConfig::default()).unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile.gradient()[1], 100.0);
        assert_eq!(profile.total_elevation_gain(), 50.0);
    }

    #[test]
    fn test_invalid_config() {
        let track = RawTrack::new(straight_line(2), vec![0.0, 10.0], vec![0.0, 0.0]).unwrap();
        let config = ProfileConfig {
            min_step_distance: 0.0,
            max_gradient: 100.0,
        };
        assert!(matches!(
            build_profile(&track, &config),
            Err(ProfileError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_state_resample_from_raw() {
        let track = RawTrack::new(
            straight_line(3),
            vec![0.0, 5.0, 10.0],
            vec![100.0, 101.0, 102.0],
        )
        .unwrap();
        let state = ProfileState::Raw(track)
            .resample(&ProfileConfig::default())
            .unwrap();
        assert_eq!(state.stage(), "resampled");
        assert!(state.column(Column::Gradient).is_some());
        assert!(state.column(Column::Schedule).is_none());
    }
}

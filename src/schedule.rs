//! Time schedules: predicted pace and elapsed time along a profile.
//!
//! [`apply_schedule`] runs a pace model over every step of a resampled
//! profile. [`query`] interpolates any column of any table stage at a
//! normalized position along the route.

use std::time::Duration;

use geo::LineString;
use serde::{Deserialize, Serialize};

use crate::prediction::{PredictionModelParameters, WorkoutType};
use crate::profile::{Column, Profile, SampleTable};

/// Athlete context the pace model is evaluated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleContext {
    pub gear: Option<String>,
    pub workout_type: WorkoutType,
}

impl ScheduleContext {
    pub fn new(gear: Option<&str>, workout_type: WorkoutType) -> Self {
        Self {
            gear: gear.map(str::to_string),
            workout_type,
        }
    }
}

/// A resampled profile with predicted pace and elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledProfile {
    profile: Profile,
    pace: Vec<f64>,
    schedule: Vec<f64>,
}

impl ScheduledProfile {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn geometry(&self) -> &LineString<f64> {
        self.profile.geometry()
    }

    /// Predicted pace of the step ending at each sample, in seconds per meter.
    pub fn pace(&self) -> &[f64] {
        &self.pace
    }

    /// Predicted elapsed seconds at each sample.
    pub fn schedule(&self) -> &[f64] {
        &self.schedule
    }

    /// Elapsed time at a line location, truncated to whole seconds.
    pub fn schedule_at(&self, line_location: f64) -> Option<Duration> {
        self.value_at(line_location, Column::Schedule)
            .map(|seconds| Duration::from_secs(seconds.max(0.0) as u64))
    }

    pub fn total_duration(&self) -> Option<Duration> {
        self.schedule_at(1.0)
    }

    pub fn into_profile(self) -> Profile {
        self.profile
    }
}

impl SampleTable for ScheduledProfile {
    fn distance(&self) -> &[f64] {
        self.profile.distance()
    }

    fn total_distance(&self) -> f64 {
        self.profile.total_distance()
    }

    fn column(&self, column: Column) -> Option<&[f64]> {
        match column {
            Column::Pace => Some(&self.pace),
            Column::Schedule => Some(&self.schedule),
            _ => self.profile.column(column),
        }
    }
}

/// Predict pace for every step and accumulate it into a schedule.
///
/// `schedule[i]` is the sum of `pace[j] * step_distance[j]` for `j <= i`;
/// the first sample has no step and starts the clock at 0.
pub fn apply_schedule(
    profile: Profile,
    parameters: &PredictionModelParameters,
    context: &ScheduleContext,
) -> ScheduledProfile {
    let total_distance = profile.total_distance();
    let total_elevation_gain = profile.total_elevation_gain();

    let pace: Vec<f64> = profile
        .gradient()
        .iter()
        .map(|&gradient| {
            parameters.predict(
                gradient,
                total_distance,
                total_elevation_gain,
                context.gear.as_deref(),
                context.workout_type,
            )
        })
        .collect();

    let schedule = pace
        .iter()
        .zip(profile.step_distance())
        .scan(0.0, |elapsed, (pace, step)| {
            *elapsed += pace * step;
            Some(*elapsed)
        })
        .collect();

    ScheduledProfile {
        profile,
        pace,
        schedule,
    }
}

/// Linearly interpolate `column` at a normalized line location.
///
/// The location is converted to a distance (`line_location * total_distance`
/// from the first sample) and the value is interpolated between the two
/// samples around it. Locations beyond either end return the end value.
/// Returns `None` for an empty table or a column the stage doesn't have.
pub fn query<T: SampleTable + ?Sized>(table: &T, line_location: f64, column: Column) -> Option<f64> {
    let distance = table.distance();
    let values = table.column(column)?;
    let first = *distance.first()?;
    if !line_location.is_finite() {
        return None;
    }

    let target = first + line_location * table.total_distance();
    let upper = distance.partition_point(|&d| d <= target);
    if upper == 0 {
        return Some(values[0]);
    }
    if upper == distance.len() {
        return Some(values[values.len() - 1]);
    }

    let lower = upper - 1;
    let ratio = (target - distance[lower]) / (distance[upper] - distance[lower]);
    Some(values[lower] + ratio * (values[upper] - values[lower]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{build_profile, ProfileConfig, RawTrack};

    fn two_point_track() -> RawTrack {
        RawTrack::new(
            LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)]),
            vec![0.0, 1000.0],
            vec![0.0, 100.0],
        )
        .unwrap()
    }

    #[test]
    fn test_query_midpoint() {
        assert_eq!(query(&two_point_track(), 0.5, Column::Altitude), Some(50.0));
    }

    #[test]
    fn test_query_clamps_outside_track() {
        let track = two_point_track();
        assert_eq!(query(&track, -0.5, Column::Altitude), Some(0.0));
        assert_eq!(query(&track, 1.5, Column::Altitude), Some(100.0));
    }

    #[test]
    fn test_query_missing_column() {
        assert_eq!(query(&two_point_track(), 0.5, Column::Schedule), None);
    }

    #[test]
    fn test_flat_schedule() {
        let track = RawTrack::new(
            LineString::from(vec![(0.0, 0.0), (500.0, 0.0), (1000.0, 0.0)]),
            vec![0.0, 500.0, 1000.0],
            vec![10.0, 10.0, 10.0],
        )
        .unwrap();
        let profile = build_profile(&track, &ProfileConfig::default()).unwrap();
        let scheduled = apply_schedule(
            profile,
            &PredictionModelParameters::activity_default(),
            &ScheduleContext::default(),
        );

        // 0.36 s/m on the flat
        assert!((scheduled.schedule()[2] - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_at_truncates_to_seconds() {
        let track = RawTrack::new(
            LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)]),
            vec![0.0, 1000.0],
            vec![10.0, 10.0],
        )
        .unwrap();
        let profile = build_profile(&track, &ProfileConfig::default()).unwrap();
        let defaults = PredictionModelParameters::activity_default();
        let parameters = PredictionModelParameters::from_parts(
            defaults.coefficients().to_vec(),
            0.3597,
            defaults.gear_categories().to_vec(),
            defaults.workout_type_categories().to_vec(),
        )
        .unwrap();
        let scheduled = apply_schedule(profile, &parameters, &ScheduleContext::default());

        // 359.7 s elapsed
        assert_eq!(scheduled.total_duration(), Some(Duration::from_secs(359)));
        assert_eq!(scheduled.schedule_at(0.5), Some(Duration::from_secs(179)));
    }
}

//! Checkpoint discovery along a route geometry.
//!
//! A checkpoint is a catalog place the route passes close to, located by its
//! normalized position along the line. A route that passes the same place
//! several times (out-and-back, loops) yields one checkpoint per pass.
//!
//! ## Algorithm
//!
//! For each candidate place, the distance from the place to the line is
//! followed along the route. Every stretch of line within `max_distance` of
//! the place is one pass, reported at its nearest point. Passes within
//! `endpoint_margin` of either end are dropped: those places are the route's
//! start or end, not checkpoints.

use std::time::Duration;

use geo::LineString;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::PlaceCatalog;
use crate::geometry::{coord_distance, line_length, project_onto_segment};
use crate::profile::{Column, SampleTable};
use crate::schedule::ScheduledProfile;
use crate::Place;

/// A place found along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub place: Place,
    /// Position along the route, 0 = start, 1 = end
    pub line_location: f64,
    /// Perpendicular distance from the place to the route in meters
    pub distance_from_line: f64,
}

impl Checkpoint {
    /// Stable form key identifying this place at this position.
    pub fn field_value(&self) -> String {
        format!("{}_{}", self.place.id, self.line_location)
    }

    /// Route altitude at the checkpoint.
    pub fn altitude_on_route<T: SampleTable + ?Sized>(&self, table: &T) -> Option<f64> {
        table.value_at(self.line_location, Column::Altitude)
    }

    /// Distance travelled from the start of the route.
    pub fn distance_from_start<T: SampleTable + ?Sized>(&self, table: &T) -> Option<f64> {
        let first = *table.distance().first()?;
        table
            .value_at(self.line_location, Column::Distance)
            .map(|d| d - first)
    }

    pub fn cumulative_elevation_gain<T: SampleTable + ?Sized>(&self, table: &T) -> Option<f64> {
        table.value_at(self.line_location, Column::CumulativeElevationGain)
    }

    /// Elevation lost since the start, as a positive number.
    pub fn cumulative_elevation_loss<T: SampleTable + ?Sized>(&self, table: &T) -> Option<f64> {
        table
            .value_at(self.line_location, Column::CumulativeElevationLoss)
            .map(f64::abs)
    }

    /// Predicted elapsed time when reaching the checkpoint.
    pub fn schedule(&self, scheduled: &ScheduledProfile) -> Option<Duration> {
        scheduled.schedule_at(self.line_location)
    }
}

/// Configuration for checkpoint discovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Maximum perpendicular distance from the route in meters.
    /// Default: 75.0
    pub max_distance: f64,

    /// Fraction of the route at each end where places count as the start
    /// or end place rather than a checkpoint.
    /// Default: 0.01
    pub endpoint_margin: f64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_distance: 75.0,
            endpoint_margin: 0.01,
        }
    }
}

/// Finds checkpoints along route geometries.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFinder {
    config: CheckpointConfig,
}

impl CheckpointFinder {
    pub fn new(config: CheckpointConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Checkpoints for the given candidates, ordered by line location then
    /// distance. Candidates and line are left untouched.
    pub fn find<'a>(
        &self,
        line: &LineString<f64>,
        candidates: impl IntoIterator<Item = &'a Place>,
    ) -> Vec<Checkpoint> {
        let total = line_length(line);
        if total <= 0.0 {
            return Vec::new();
        }

        let (low, high) = (self.config.endpoint_margin, 1.0 - self.config.endpoint_margin);
        let mut checkpoints: Vec<Checkpoint> = candidates
            .into_iter()
            .flat_map(|place| {
                close_passes(line, total, place, self.config.max_distance)
                    .into_iter()
                    .filter(|&(location, _)| location > low && location < high)
                    .map(move |(line_location, distance_from_line)| Checkpoint {
                        place: place.clone(),
                        line_location,
                        distance_from_line,
                    })
            })
            .collect();

        checkpoints.sort_by(|a, b| {
            a.line_location
                .total_cmp(&b.line_location)
                .then(a.distance_from_line.total_cmp(&b.distance_from_line))
        });
        checkpoints
    }

    /// Prefilter the catalog spatially, then search the remaining places.
    pub fn find_in_catalog(&self, line: &LineString<f64>, catalog: &PlaceCatalog) -> Vec<Checkpoint> {
        let candidates = catalog.candidates_near_line(line, self.config.max_distance);
        let checkpoints = self.find(line, candidates.iter().copied());
        debug!(
            "[Checkpoints] {} of {} catalog places are candidates, {} checkpoints found",
            candidates.len(),
            catalog.len(),
            checkpoints.len()
        );
        checkpoints
    }
}

/// Find the checkpoints within `max_distance` of the line.
pub fn find_checkpoints(
    line: &LineString<f64>,
    candidates: &[Place],
    max_distance: f64,
) -> Vec<Checkpoint> {
    CheckpointFinder::new(CheckpointConfig {
        max_distance,
        ..CheckpointConfig::default()
    })
    .find(line, candidates)
}

/// Every pass of the line within `max_distance` of the place, as
/// (line location, distance) at the nearest point of the pass.
fn close_passes(
    line: &LineString<f64>,
    total: f64,
    place: &Place,
    max_distance: f64,
) -> Vec<(f64, f64)> {
    let mut passes = Vec::new();
    let mut current: Option<(f64, f64)> = None;
    let mut travelled = 0.0;

    for (i, segment) in line.lines().enumerate() {
        // Leaving range at a vertex ends the current pass
        if i > 0 && coord_distance(segment.start, place.location.0) > max_distance {
            passes.extend(current.take());
        }

        let (nearest, distance) = project_onto_segment(&segment, place.location);
        if distance <= max_distance && current.map_or(true, |(_, best)| distance < best) {
            let along = travelled + coord_distance(segment.start, nearest.0);
            current = Some((along / total, distance));
        }
        travelled += coord_distance(segment.start, segment.end);
    }
    passes.extend(current);
    passes
}

/// Line location pairs between consecutive checkpoints, from route start to
/// route end, skipping empty segments.
pub fn segments_between(checkpoints: &[Checkpoint]) -> Vec<(f64, f64)> {
    let locations: Vec<f64> = std::iter::once(0.0)
        .chain(checkpoints.iter().map(|c| c.line_location))
        .chain(std::iter::once(1.0))
        .collect();
    locations
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_and_back_yields_two_passes() {
        let line = LineString::from(vec![(0.0, 0.0), (1000.0, 0.0), (0.0, 0.0)]);
        let place = Place::new("1", "Bridge", "LMK", 300.0, 10.0);
        let passes = close_passes(&line, 2000.0, &place, 50.0);
        assert_eq!(passes.len(), 2);
        assert!((passes[0].0 - 0.15).abs() < 1e-9);
        assert!((passes[1].0 - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_pass_near_turnaround_is_single() {
        let line = LineString::from(vec![(0.0, 0.0), (1000.0, 0.0), (0.0, 0.0)]);
        let place = Place::new("1", "Summit", "SUM", 1010.0, 0.0);
        let passes = close_passes(&line, 2000.0, &place, 50.0);
        assert_eq!(passes.len(), 1);
        assert!((passes[0].0 - 0.5).abs() < 1e-9);
        assert!((passes[0].1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_between() {
        let place = Place::new("1", "Hut", "HOL", 0.0, 0.0);
        let at = |line_location| Checkpoint {
            place: place.clone(),
            line_location,
            distance_from_line: 0.0,
        };
        let segments = segments_between(&[at(0.25), at(0.25), at(0.5)]);
        assert_eq!(segments, vec![(0.0, 0.25), (0.25, 0.5), (0.5, 1.0)]);
    }
}

//! R-tree indexed place catalog for spatial prefiltering.
//!
//! The checkpoint search measures every candidate against every segment of
//! a route, so large catalogs are first narrowed down to the places inside
//! the route's buffered segment envelopes.

use std::collections::BTreeSet;

use geo::{LineString, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry::point_at;
use crate::Place;

/// A place location with its catalog index for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedPlace {
    idx: usize,
    x: f64,
    y: f64,
}

impl RTreeObject for IndexedPlace {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for IndexedPlace {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Places indexed for proximity queries in the route coordinate system.
#[derive(Debug, Clone)]
pub struct PlaceCatalog {
    places: Vec<Place>,
    index: RTree<IndexedPlace>,
}

impl PlaceCatalog {
    pub fn new(places: Vec<Place>) -> Self {
        let indexed: Vec<IndexedPlace> = places
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedPlace {
                idx,
                x: p.location.x(),
                y: p.location.y(),
            })
            .collect();
        Self {
            places,
            index: RTree::bulk_load(indexed),
        }
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Places that may lie within `max_distance` of the line.
    ///
    /// Approximate: every place within range is returned, along with some
    /// that are only inside a segment's buffered bounding box. Catalog order
    /// is preserved.
    pub fn candidates_near_line(&self, line: &LineString<f64>, max_distance: f64) -> Vec<&Place> {
        let mut found = BTreeSet::new();
        let mut query = |min: [f64; 2], max: [f64; 2]| {
            let envelope = AABB::from_corners(
                [min[0] - max_distance, min[1] - max_distance],
                [max[0] + max_distance, max[1] + max_distance],
            );
            found.extend(
                self.index
                    .locate_in_envelope_intersecting(&envelope)
                    .map(|p| p.idx),
            );
        };

        match line.0.as_slice() {
            [] => {}
            [only] => query([only.x, only.y], [only.x, only.y]),
            _ => {
                for segment in line.lines() {
                    query(
                        [segment.start.x.min(segment.end.x), segment.start.y.min(segment.end.y)],
                        [segment.start.x.max(segment.end.x), segment.start.y.max(segment.end.y)],
                    );
                }
            }
        }

        found.into_iter().map(|idx| &self.places[idx]).collect()
    }

    /// Places within `max_distance` of a point, nearest first.
    pub fn places_within(&self, point: Point<f64>, max_distance: f64) -> Vec<(&Place, f64)> {
        let mut within: Vec<(&Place, f64)> = self
            .index
            .locate_within_distance([point.x(), point.y()], max_distance * max_distance)
            .map(|p| {
                let distance = p.distance_2(&[point.x(), point.y()]).sqrt();
                (&self.places[p.idx], distance)
            })
            .collect();
        within.sort_by(|a, b| a.1.total_cmp(&b.1));
        within
    }

    /// Places near a normalized location along the line.
    pub fn places_near_location(
        &self,
        line: &LineString<f64>,
        line_location: f64,
        max_distance: f64,
    ) -> Vec<(&Place, f64)> {
        match point_at(line, line_location) {
            Some(point) => self.places_within(point, max_distance),
            None => Vec::new(),
        }
    }

    /// Candidate start places for a route, nearest first.
    pub fn start_places(&self, line: &LineString<f64>, max_distance: f64) -> Vec<(&Place, f64)> {
        self.places_near_location(line, 0.0, max_distance)
    }

    /// Candidate end places for a route, nearest first.
    pub fn end_places(&self, line: &LineString<f64>, max_distance: f64) -> Vec<(&Place, f64)> {
        self.places_near_location(line, 1.0, max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlaceCatalog {
        PlaceCatalog::new(vec![
            Place::new("1", "Near", "SUM", 500.0, 20.0),
            Place::new("2", "Far", "PAS", 500.0, 5000.0),
            Place::new("3", "Start", "TRA", 5.0, 0.0),
        ])
    }

    #[test]
    fn test_candidates_near_line() {
        let line = LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)]);
        let catalog = catalog();
        let ids: Vec<&str> = catalog
            .candidates_near_line(&line, 100.0)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_start_places_sorted_by_distance() {
        let line = LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)]);
        let catalog = catalog();
        let start = catalog.start_places(&line, 200.0);
        assert_eq!(start.len(), 1);
        assert_eq!(start[0].0.name, "Start");
        assert!((start[0].1 - 5.0).abs() < 1e-9);
    }
}

//! Planar geometry helpers for route polylines.
//!
//! Route geometries live in a single projected coordinate system with meter
//! units, so all distances here are Euclidean.

use geo::{Closest, ClosestPoint, Coord, Distance, Euclidean, Line, LineString, Point};

/// Euclidean distance between two coordinates in meters.
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean::distance(Point::from(a), Point::from(b))
}

/// Cumulative distance of every point from the start of the line.
///
/// The first value is always 0 and the result has one value per point.
pub fn cumulative_distances(line: &LineString<f64>) -> Vec<f64> {
    let mut distances = Vec::with_capacity(line.0.len());
    let mut total = 0.0;
    for (i, coord) in line.0.iter().enumerate() {
        if i > 0 {
            total += coord_distance(line.0[i - 1], *coord);
        }
        distances.push(total);
    }
    distances
}

/// Total length of the line in meters.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| coord_distance(l.start, l.end)).sum()
}

/// Point at a normalized location along the line (0 = start, 1 = end).
///
/// Locations outside [0, 1] are clamped. Returns `None` for an empty line.
pub fn point_at(line: &LineString<f64>, line_location: f64) -> Option<Point<f64>> {
    let first = *line.0.first()?;
    if !line_location.is_finite() {
        return None;
    }
    let total = line_length(line);
    if total == 0.0 {
        return Some(Point::from(first));
    }

    let target = line_location.clamp(0.0, 1.0) * total;
    let mut travelled = 0.0;
    for segment in line.lines() {
        let length = coord_distance(segment.start, segment.end);
        if length > 0.0 && travelled + length >= target {
            let ratio = (target - travelled) / length;
            return Some(Point::new(
                segment.start.x + ratio * (segment.end.x - segment.start.x),
                segment.start.y + ratio * (segment.end.y - segment.start.y),
            ));
        }
        travelled += length;
    }
    line.0.last().map(|c| Point::from(*c))
}

/// Nearest point on a segment to `point`, with the distance between them.
pub(crate) fn project_onto_segment(segment: &Line<f64>, point: Point<f64>) -> (Point<f64>, f64) {
    let nearest = match segment.closest_point(&point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        // Degenerate segment: both ends coincide
        Closest::Indeterminate => Point::from(segment.start),
    };
    (nearest, Euclidean::distance(nearest, point))
}

/// Keep only the points at the given (ascending) indices.
pub(crate) fn select_points(line: &LineString<f64>, indices: &[usize]) -> LineString<f64> {
    LineString::new(indices.iter().map(|&i| line.0[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_shape() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (300.0, 0.0), (300.0, 400.0)])
    }

    #[test]
    fn test_cumulative_distances() {
        let distances = cumulative_distances(&l_shape());
        assert_eq!(distances, vec![0.0, 300.0, 700.0]);
    }

    #[test]
    fn test_point_at_midpoint() {
        let p = point_at(&l_shape(), 0.5).unwrap();
        assert!((p.x() - 300.0).abs() < 1e-9);
        assert!((p.y() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_at_empty() {
        assert!(point_at(&LineString::new(vec![]), 0.5).is_none());
    }

    #[test]
    fn test_project_onto_segment() {
        let segment = Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 });
        let (nearest, distance) = project_onto_segment(&segment, Point::new(40.0, 30.0));
        assert!((nearest.x() - 40.0).abs() < 1e-9);
        assert!((distance - 30.0).abs() < 1e-9);
    }
}

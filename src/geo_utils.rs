//! Planar geometry utilities.
//!
//! All distances here are Euclidean in a projected (metric) coordinate
//! system. Geographic input must be reprojected by the caller before any
//! of these functions are used; degrees are never meaningful distances.

use geo::{Coord, LineString};

/// Euclidean distance between two projected coordinates, in map units.
pub fn euclidean_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// First and last coordinate of a polyline, or `None` if it is empty.
pub fn endpoints(line: &LineString<f64>) -> Option<(Coord<f64>, Coord<f64>)> {
    let first = line.0.first()?;
    let last = line.0.last()?;
    Some((*first, *last))
}

/// Total length of a polyline in map units.
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.0
        .windows(2)
        .map(|w| euclidean_distance(w[0], w[1]))
        .sum()
}

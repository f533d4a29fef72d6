//! Polyline stitching for split trek geometries.
//!
//! A single logical trek often arrives as several ordered segments whose
//! digitising direction is inconsistent: some segments were drawn start to
//! end, others backwards. [`merge`] concatenates an accumulated polyline
//! with the next segment, flipping whichever side the endpoint distances
//! say was recorded in the wrong direction.

use geo::LineString;

use crate::geo_utils::{endpoints, euclidean_distance};

/// Default join tolerance in projected units (metres).
///
/// Joins with a gap above this distance are still performed but reported
/// as a non-contiguous segment warning.
pub const DEFAULT_JOIN_TOLERANCE: f64 = 5.0;

/// Merge the next segment of a trek onto the accumulated polyline.
///
/// - With no accumulator yet, `next` is returned unchanged.
/// - On the first real merge (`first_merge`), the accumulator's own
///   orientation is still undetermined: the four endpoint pairings between
///   the two polylines are compared and the accumulator is reversed when
///   the closest pairing starts from its first point. The pairings that
///   keep the accumulator as digitised are evaluated first and only a
///   strictly smaller distance displaces them, so exact ties keep the
///   current orientation.
/// - `next` is then reversed if its end is closer to the accumulator's end
///   than its start is. Ties keep `next` as digitised.
/// - The join is a plain concatenation: no point is dropped or synthesised
///   at the seam, even when the two endpoints coincide.
///
/// When the smallest candidate join distance exceeds `tolerance`, a
/// "Not contiguous segment" warning is pushed to `warnings` (and logged),
/// but the merge is still performed.
///
/// # Example
/// ```
/// use geo::LineString;
/// use trek_import::stitching::{merge, DEFAULT_JOIN_TOLERANCE};
///
/// let a = LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]);
/// let b = LineString::from(vec![(2.0, 0.0), (1.0, 0.0)]); // reversed
///
/// let mut warnings = Vec::new();
/// let merged = merge(Some(a), b, true, DEFAULT_JOIN_TOLERANCE, &mut warnings);
/// assert_eq!(
///     merged,
///     LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (2.0, 0.0)])
/// );
/// assert!(warnings.is_empty());
/// ```
pub fn merge(
    current: Option<LineString<f64>>,
    next: LineString<f64>,
    first_merge: bool,
    tolerance: f64,
    warnings: &mut Vec<String>,
) -> LineString<f64> {
    let mut current = match current {
        Some(line) => line,
        None => return next,
    };
    if next.0.is_empty() {
        return current;
    }
    if current.0.is_empty() {
        return next;
    }
    let mut next = next;

    if first_merge {
        let (start_a, end_a) = endpoints(&current).expect("non-empty polyline");
        let (start_b, end_b) = endpoints(&next).expect("non-empty polyline");

        // Pairing distances, paired with whether the accumulator must be
        // reversed to bring that endpoint next to `next`. Keep-orientation
        // pairings come first so ties leave the accumulator untouched.
        let pairings = [
            (euclidean_distance(end_a, start_b), false),
            (euclidean_distance(end_a, end_b), false),
            (euclidean_distance(start_a, start_b), true),
            (euclidean_distance(start_a, end_b), true),
        ];
        let mut best = pairings[0];
        for pairing in &pairings[1..] {
            if pairing.0 < best.0 {
                best = *pairing;
            }
        }
        if best.1 {
            current.0.reverse();
        }
    }

    let (_, end_a) = endpoints(&current).expect("non-empty polyline");
    let (start_b, end_b) = endpoints(&next).expect("non-empty polyline");
    let to_start = euclidean_distance(end_a, start_b);
    let to_end = euclidean_distance(end_a, end_b);
    if to_end < to_start {
        next.0.reverse();
    }

    let gap = to_start.min(to_end);
    if gap > tolerance {
        let message = format!("Not contiguous segment ({} m)", gap as i64);
        log::warn!("[TrekImport] {}", message);
        warnings.push(message);
    }

    current.0.extend(next.0);
    current
}

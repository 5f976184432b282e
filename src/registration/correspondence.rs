//! Nearest-neighbor correspondence search between two clouds.

use nalgebra::Point3;
use rayon::prelude::*;

use crate::search::KdTree3;

/// Match every source point to its nearest target point, keeping pairs
/// closer than `max_distance`.
///
/// Returns `(source index, target index, distance)` triples. Many source
/// points may map to the same target point.
pub fn find_correspondences(
    source_points: &[Point3<f32>],
    target_tree: &KdTree3,
    max_distance: f32,
) -> Vec<(usize, usize, f32)> {
    source_points
        .par_iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let (j, dist) = target_tree.nearest(p)?;
            (dist <= max_distance).then_some((i, j, dist))
        })
        .collect()
}

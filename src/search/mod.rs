//! Nearest-neighbor search over 3D point sets.
//!
//! Wraps a k-d tree built once per cloud and shared by normal estimation,
//! descriptor computation, and correspondence search. All queries return
//! `(point index, euclidean distance)` pairs, nearest first.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

/// Immutable spatial index over a set of 3D points.
///
/// Build cost is O(n log n); nearest/k-NN queries are O(log n + k).
/// Duplicate points are fine: they simply show up as distance-0 neighbors.
pub struct KdTree3 {
    tree: KdTree<f32, 3>,
    len: usize,
}

impl KdTree3 {
    /// Build an index over the given points. Indices into `points` are the
    /// item ids returned by queries.
    pub fn build(points: &[Point3<f32>]) -> Self {
        let mut tree: KdTree<f32, 3> = KdTree::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Self {
            tree,
            len: points.len(),
        }
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the index holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Nearest indexed point to `query`, or `None` if the index is empty.
    pub fn nearest(&self, query: &Point3<f32>) -> Option<(usize, f32)> {
        if self.len == 0 {
            return None;
        }
        let n = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
        Some((n.item as usize, n.distance.sqrt()))
    }

    /// The `k` nearest indexed points, nearest first. Returns fewer than `k`
    /// entries when the index is smaller than `k`.
    pub fn knn(&self, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        if self.len == 0 || k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k.min(self.len))
            .into_iter()
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }

    /// All indexed points within `radius` of `query`, nearest first.
    pub fn radius(&self, query: &Point3<f32>, radius: f32) -> Vec<(usize, f32)> {
        if self.len == 0 {
            return Vec::new();
        }
        self.tree
            .within::<SquaredEuclidean>(&[query.x, query.y, query.z], radius * radius)
            .into_iter()
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }

    /// Hybrid query: the nearest neighbors within `radius`, capped at
    /// `max_nn` entries, whichever limit is hit first.
    pub fn hybrid(&self, query: &Point3<f32>, radius: f32, max_nn: usize) -> Vec<(usize, f32)> {
        let mut neighbors = self.radius(query, radius);
        neighbors.truncate(max_nn);
        neighbors
    }
}

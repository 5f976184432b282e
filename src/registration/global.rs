//! Fast global registration from FPFH correspondences.
//!
//! No initial guess needed: mutual feature matches are pruned by a random
//! tuple test, then a graduated non-convexity schedule over the scaled
//! Geman-McClure loss pulls the alignment from coarse to tight.

use kiddo::SquaredEuclidean;
use nalgebra::{Matrix4, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::{compose, PointCloud3D};
use crate::error::{AlignError, Result};
use crate::features::{FpfhFeature, FPFH_DIM};
use crate::registration::estimation::solve_point_to_point;
use crate::registration::{evaluate_registration, RegistrationResult};

/// Configuration for fast global registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastGlobalConfig {
    /// Distance (meters) under which a pair counts as aligned, both for the
    /// optimization floor and the reported fitness.
    pub max_correspondence_distance: f32,

    /// Optimization iterations.
    pub iterations: usize,

    /// The annealing parameter `mu` is divided by this every
    /// `decrease_mu_every` iterations.
    pub division_factor: f32,

    /// Iterations between `mu` reductions.
    pub decrease_mu_every: usize,

    /// Upper bound on tuples sampled by the tuple test.
    pub max_tuple_count: usize,

    /// Edge-ratio tolerance of the tuple test, in `(0, 1)`. A tuple passes
    /// when every source edge is within this factor of its target edge.
    pub tuple_scale: f32,

    /// RNG seed for the tuple test; same seed, same result.
    pub seed: u64,
}

impl Default for FastGlobalConfig {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 0.5,
            iterations: 64,
            division_factor: 1.4,
            decrease_mu_every: 4,
            max_tuple_count: 1000,
            tuple_scale: 0.95,
            seed: 0,
        }
    }
}

impl FastGlobalConfig {
    fn validate(&self) -> Result<()> {
        if !self.max_correspondence_distance.is_finite()
            || self.max_correspondence_distance <= 0.0
        {
            return Err(AlignError::InvalidParameter(format!(
                "max_correspondence_distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.iterations == 0 {
            return Err(AlignError::InvalidParameter(
                "iterations must be at least 1".into(),
            ));
        }
        if !self.division_factor.is_finite() || self.division_factor <= 1.0 {
            return Err(AlignError::InvalidParameter(format!(
                "division_factor must exceed 1, got {}",
                self.division_factor
            )));
        }
        if self.decrease_mu_every == 0 {
            return Err(AlignError::InvalidParameter(
                "decrease_mu_every must be at least 1".into(),
            ));
        }
        if self.max_tuple_count == 0 {
            return Err(AlignError::InvalidParameter(
                "max_tuple_count must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.tuple_scale) || self.tuple_scale <= 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "tuple_scale must be in (0, 1), got {}",
                self.tuple_scale
            )));
        }
        Ok(())
    }
}

/// Sparse FPFH histograms put many identical values (empty bins) on one
/// axis; kiddo's bucket must hold them all or construction panics.
type FeatureTree = kiddo::float::kdtree::KdTree<f32, u64, FPFH_DIM, 512, u32>;

fn build_feature_tree(features: &[FpfhFeature]) -> FeatureTree {
    let mut tree = FeatureTree::with_capacity(features.len());
    for (i, f) in features.iter().enumerate() {
        tree.add(&f.histogram, i as u64);
    }
    tree
}

/// Mutual nearest-neighbor matches in 33-dimensional descriptor space.
fn match_features(
    source_features: &[FpfhFeature],
    target_features: &[FpfhFeature],
) -> Vec<(usize, usize)> {
    if source_features.is_empty() || target_features.is_empty() {
        return Vec::new();
    }
    let source_tree = build_feature_tree(source_features);
    let target_tree = build_feature_tree(target_features);

    let mut matches = Vec::new();
    for (i, f) in source_features.iter().enumerate() {
        let j = target_tree.nearest_one::<SquaredEuclidean>(&f.histogram).item as usize;
        let back = source_tree
            .nearest_one::<SquaredEuclidean>(&target_features[j].histogram)
            .item as usize;
        if back == i {
            matches.push((i, j));
        }
    }
    matches
}

/// Geometric-consistency filter: random triples of matches pass only when
/// the three source edges and three target edges have matching lengths.
fn tuple_filter(
    matches: &[(usize, usize)],
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    config: &FastGlobalConfig,
) -> Vec<(usize, usize)> {
    if matches.len() < 3 {
        return matches.to_vec();
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut keep = vec![false; matches.len()];
    let mut accepted = 0usize;
    let scale = config.tuple_scale;

    let trials = config.max_tuple_count.saturating_mul(100);
    for _ in 0..trials {
        if accepted >= config.max_tuple_count {
            break;
        }
        let a = rng.gen_range(0..matches.len());
        let b = rng.gen_range(0..matches.len());
        let c = rng.gen_range(0..matches.len());
        if a == b || b == c || a == c {
            continue;
        }

        let edges = [(a, b), (b, c), (c, a)];
        let consistent = edges.iter().all(|&(m, n)| {
            let ds = (source[matches[m].0] - source[matches[n].0]).norm();
            let dt = (target[matches[m].1] - target[matches[n].1]).norm();
            ds > scale * dt && dt > scale * ds
        });
        if consistent {
            keep[a] = true;
            keep[b] = true;
            keep[c] = true;
            accepted += 1;
        }
    }

    let filtered: Vec<(usize, usize)> = matches
        .iter()
        .zip(keep.iter())
        .filter_map(|(&m, &k)| k.then_some(m))
        .collect();
    if filtered.is_empty() {
        log::warn!("fgr: tuple test rejected every match");
    }
    filtered
}

/// Coarsely align `source` onto `target` without an initial guess.
///
/// Correspondences come from mutual FPFH matching plus the tuple test; the
/// transform is then optimized under a scaled Geman-McClure line process
/// whose `mu` anneals from `(16 * d)^2` down to `d^2`, `d` being the
/// correspondence distance. The correspondence set is fixed for the whole
/// optimization. Fewer than 3 matches surviving the tuple test yields the
/// identity low-confidence result rather than an error.
///
/// The annealing schedule always runs its fixed iteration count, so
/// `converged` on the result does not report a delta test; it is true when
/// the final alignment holds at least 3 inliers under the correspondence
/// distance.
pub fn register_fast_global(
    source: &PointCloud3D,
    target: &PointCloud3D,
    source_features: &[FpfhFeature],
    target_features: &[FpfhFeature],
    config: &FastGlobalConfig,
) -> Result<RegistrationResult> {
    config.validate()?;
    if source_features.len() != source.len() {
        return Err(AlignError::LengthMismatch {
            what: "source features",
            expected: source.len(),
            actual: source_features.len(),
        });
    }
    if target_features.len() != target.len() {
        return Err(AlignError::LengthMismatch {
            what: "target features",
            expected: target.len(),
            actual: target_features.len(),
        });
    }

    let matches = match_features(source_features, target_features);
    let pairs = tuple_filter(&matches, &source.points, &target.points, config);
    log::debug!(
        "fgr: {} mutual matches, {} after tuple test",
        matches.len(),
        pairs.len()
    );
    if pairs.len() < 3 {
        return Ok(RegistrationResult::low_confidence());
    }
    let pairs: Vec<(usize, usize, f32)> = pairs.into_iter().map(|(i, j)| (i, j, 0.0)).collect();

    let d = config.max_correspondence_distance;
    let mu_floor = d * d;
    let mut mu = (16.0 * d) * (16.0 * d);

    let mut current: Vec<Point3<f32>> = source.points.clone();
    let mut transformation = Matrix4::<f32>::identity();
    let mut iterations = 0usize;

    for iteration in 0..config.iterations {
        iterations = iteration + 1;
        if iteration > 0 && iteration % config.decrease_mu_every == 0 {
            mu = (mu / config.division_factor).max(mu_floor);
        }

        // scaled Geman-McClure line process
        let weights: Vec<f32> = pairs
            .iter()
            .map(|&(i, j, _)| {
                let r_sq = (target.points[j] - current[i]).norm_squared();
                let w = mu / (mu + r_sq);
                w * w
            })
            .collect();

        let increment = match solve_point_to_point(&current, &target.points, &pairs, &weights) {
            Some(t) => t,
            None => {
                log::warn!("fgr: degenerate estimation at iteration {iteration}, stopping");
                break;
            }
        };
        transformation = compose(&increment, &transformation);
        for p in &mut current {
            *p = increment.transform_point(p);
        }
    }

    let mut result = evaluate_registration(
        source,
        target,
        config.max_correspondence_distance,
        &transformation,
    )?;
    // fixed annealing schedule, no delta test; see the function docs
    result.converged = result.correspondences >= 3;
    result.iterations = iterations;
    Ok(result)
}

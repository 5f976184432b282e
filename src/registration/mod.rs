//! Rigid registration: coarse global alignment and iterative refinement.

mod correspondence;
mod estimation;
mod global;
mod icp;
mod robust;

pub use correspondence::find_correspondences;
pub use estimation::EstimationMethod;
pub use global::{register_fast_global, FastGlobalConfig};
pub use icp::{register_icp, IcpConfig};
pub use robust::RobustLoss;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::core::{transform_point, PointCloud3D};
use crate::error::{AlignError, Result};
use crate::search::KdTree3;

/// Outcome of a registration run.
///
/// `transformation` maps source coordinates into the target frame
/// (`q ≈ T * s` for matched pairs). `fitness` is the fraction of source
/// points with a target neighbor within the correspondence threshold;
/// `inlier_rmse` is the RMS distance over those inliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResult {
    /// Estimated source-to-target rigid transform (homogeneous 4x4)
    pub transformation: Matrix4<f32>,
    /// Inlier fraction of the source cloud, in `[0, 1]`
    pub fitness: f32,
    /// RMS residual distance over inliers (meters)
    pub inlier_rmse: f32,
    /// Number of inlier correspondences behind the metrics
    pub correspondences: usize,
    /// Whether the iteration stopped on the convergence test rather than
    /// the iteration cap or a correspondence failure. Fast global
    /// registration runs a fixed schedule and gives this flag its own
    /// meaning, documented on
    /// [`register_fast_global`](crate::registration::register_fast_global).
    pub converged: bool,
    /// Iterations actually run
    pub iterations: usize,
}

impl RegistrationResult {
    /// Identity result reported when registration could not find enough
    /// correspondences to estimate anything.
    pub fn low_confidence() -> Self {
        Self {
            transformation: Matrix4::identity(),
            fitness: 0.0,
            inlier_rmse: 0.0,
            correspondences: 0,
            converged: false,
            iterations: 0,
        }
    }
}

/// Termination criteria shared by the iterative registration loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    /// Hard iteration cap.
    pub max_iterations: usize,
    /// Stop when `|fitness - previous_fitness|` drops below this.
    pub relative_fitness: f32,
    /// Stop when `|rmse - previous_rmse|` drops below this.
    pub relative_rmse: f32,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
        }
    }
}

impl ConvergenceCriteria {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AlignError::InvalidParameter(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !self.relative_fitness.is_finite() || self.relative_fitness < 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "relative_fitness must be non-negative, got {}",
                self.relative_fitness
            )));
        }
        if !self.relative_rmse.is_finite() || self.relative_rmse < 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "relative_rmse must be non-negative, got {}",
                self.relative_rmse
            )));
        }
        Ok(())
    }
}

/// Measure how well `transformation` aligns `source` onto `target`.
///
/// Fitness and RMSE are computed exactly as the registration loops report
/// them, so an external transform can be scored on the same scale.
pub fn evaluate_registration(
    source: &PointCloud3D,
    target: &PointCloud3D,
    max_correspondence_distance: f32,
    transformation: &Matrix4<f32>,
) -> Result<RegistrationResult> {
    if !max_correspondence_distance.is_finite() || max_correspondence_distance <= 0.0 {
        return Err(AlignError::InvalidParameter(format!(
            "max_correspondence_distance must be positive, got {}",
            max_correspondence_distance
        )));
    }
    if source.is_empty() || target.is_empty() {
        return Ok(RegistrationResult {
            transformation: *transformation,
            ..RegistrationResult::low_confidence()
        });
    }

    let tree = KdTree3::build(&target.points);
    let mut inliers = 0usize;
    let mut sq_sum = 0.0f64;
    for p in &source.points {
        let moved = transform_point(transformation, p);
        if let Some((_, dist)) = tree.nearest(&moved) {
            if dist <= max_correspondence_distance {
                inliers += 1;
                sq_sum += (dist as f64) * (dist as f64);
            }
        }
    }

    let inlier_rmse = if inliers > 0 {
        (sq_sum / inliers as f64).sqrt() as f32
    } else {
        0.0
    };
    Ok(RegistrationResult {
        transformation: *transformation,
        fitness: inliers as f32 / source.len() as f32,
        inlier_rmse,
        correspondences: inliers,
        converged: true,
        iterations: 0,
    })
}

//! Iterative closest point refinement.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::core::{compose, transform_cloud, transform_cloud_in_place, PointCloud3D};
use crate::error::{AlignError, Result};
use crate::registration::correspondence::find_correspondences;
use crate::registration::estimation::{
    solve_generalized, solve_point_to_plane, solve_point_to_point, EstimationMethod,
};
use crate::registration::robust::RobustLoss;
use crate::registration::{ConvergenceCriteria, RegistrationResult};
use crate::search::KdTree3;

/// Configuration for ICP refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Correspondence rejection distance (meters). Pairs farther apart are
    /// dropped each iteration.
    pub max_correspondence_distance: f32,

    /// Per-iteration transform estimation method.
    pub method: EstimationMethod,

    /// Robust loss applied to correspondence residuals.
    pub loss: RobustLoss,

    /// Scale parameter of the robust loss (meters). Ignored by
    /// [`RobustLoss::None`] and [`RobustLoss::L1`].
    pub loss_scale: f32,

    /// Termination criteria.
    pub criteria: ConvergenceCriteria,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 0.1,
            method: EstimationMethod::PointToPoint,
            loss: RobustLoss::None,
            loss_scale: 0.05,
            criteria: ConvergenceCriteria::default(),
        }
    }
}

impl IcpConfig {
    fn validate(&self, source: &PointCloud3D, target: &PointCloud3D) -> Result<()> {
        if !self.max_correspondence_distance.is_finite()
            || self.max_correspondence_distance <= 0.0
        {
            return Err(AlignError::InvalidParameter(format!(
                "max_correspondence_distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.loss != RobustLoss::None
            && (!self.loss_scale.is_finite() || self.loss_scale <= 0.0)
        {
            return Err(AlignError::InvalidParameter(format!(
                "loss_scale must be positive for {:?}, got {}",
                self.loss, self.loss_scale
            )));
        }
        self.criteria.validate()?;

        match self.method {
            EstimationMethod::PointToPoint => {}
            EstimationMethod::PointToPlane => {
                if !target.has_normals() {
                    return Err(AlignError::MissingNormals("point-to-plane ICP target"));
                }
            }
            EstimationMethod::Generalized => {
                if !source.has_covariances() {
                    return Err(AlignError::MissingCovariances("generalized ICP source"));
                }
                if !target.has_covariances() {
                    return Err(AlignError::MissingCovariances("generalized ICP target"));
                }
            }
        }
        Ok(())
    }
}

/// Refine an initial alignment of `source` onto `target`.
///
/// Runs the classic loop: correspondences under the rejection distance,
/// robust IRLS weights, an incremental transform from the configured
/// estimation method, then the convergence test on fitness and inlier RMSE
/// deltas. The source cloud is never mutated; a working copy tracks the
/// current estimate (normals and covariances rotate along with it).
///
/// Losing all correspondences is not an error: the loop stops and reports
/// the best transform so far with `fitness` 0 and `converged` false.
pub fn register_icp(
    source: &PointCloud3D,
    target: &PointCloud3D,
    initial: &Matrix4<f32>,
    config: &IcpConfig,
) -> Result<RegistrationResult> {
    config.validate(source, target)?;
    if source.is_empty() || target.is_empty() {
        return Ok(RegistrationResult::low_confidence());
    }

    let target_tree = KdTree3::build(&target.points);
    let mut current = transform_cloud(source, initial);
    let mut transformation = *initial;

    let mut fitness = 0.0f32;
    let mut inlier_rmse = f32::INFINITY;
    let mut correspondences = 0usize;
    let mut converged = false;
    let mut iterations = 0usize;

    for iteration in 0..config.criteria.max_iterations {
        iterations = iteration + 1;

        let pairs = find_correspondences(
            &current.points,
            &target_tree,
            config.max_correspondence_distance,
        );
        if pairs.is_empty() {
            fitness = 0.0;
            inlier_rmse = 0.0;
            correspondences = 0;
            converged = false;
            break;
        }

        let weights: Vec<f32> = pairs
            .iter()
            .map(|&(_, _, dist)| config.loss.weight(dist * dist, config.loss_scale))
            .collect();

        let increment = match config.method {
            EstimationMethod::PointToPoint => {
                solve_point_to_point(&current.points, &target.points, &pairs, &weights)
            }
            EstimationMethod::PointToPlane => solve_point_to_plane(
                &current.points,
                &target.points,
                target.normals.as_deref().unwrap_or(&[]),
                &pairs,
                &weights,
            ),
            EstimationMethod::Generalized => {
                solve_generalized(&current, target, &pairs, &weights)
            }
        };
        let increment = match increment {
            Some(t) => t,
            None => {
                log::warn!(
                    "icp: degenerate estimation at iteration {iteration}, stopping early"
                );
                break;
            }
        };

        transformation = compose(&increment, &transformation);
        transform_cloud_in_place(&mut current, &increment);

        // metrics on the fresh pose
        let new_pairs = find_correspondences(
            &current.points,
            &target_tree,
            config.max_correspondence_distance,
        );
        let new_fitness = new_pairs.len() as f32 / source.len() as f32;
        let new_rmse = if new_pairs.is_empty() {
            0.0
        } else {
            let sq_sum: f64 = new_pairs
                .iter()
                .map(|&(_, _, d)| (d as f64) * (d as f64))
                .sum();
            (sq_sum / new_pairs.len() as f64).sqrt() as f32
        };

        log::debug!(
            "icp: iteration {iteration} fitness {new_fitness:.6} rmse {new_rmse:.6} pairs {}",
            new_pairs.len()
        );

        let fitness_delta = (new_fitness - fitness).abs();
        let rmse_delta = (new_rmse - inlier_rmse).abs();
        correspondences = new_pairs.len();
        fitness = new_fitness;
        inlier_rmse = new_rmse;

        if fitness_delta < config.criteria.relative_fitness
            && rmse_delta < config.criteria.relative_rmse
        {
            converged = true;
            break;
        }
    }

    if !inlier_rmse.is_finite() {
        inlier_rmse = 0.0;
    }
    Ok(RegistrationResult {
        transformation,
        fitness,
        inlier_rmse,
        correspondences,
        converged,
        iterations,
    })
}

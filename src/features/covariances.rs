//! Regularized local covariances for generalized ICP.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::PointCloud3D;
use crate::error::{AlignError, Result};
use crate::features::normals::neighborhood_covariance;
use crate::search::KdTree3;

/// Configuration for per-point covariance estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceEstimationConfig {
    /// Number of neighbors per point (the point itself counts).
    pub k: usize,

    /// Smallest eigenvalue after regularization, relative to the largest
    /// two being set to 1. Keeps every covariance invertible while still
    /// encoding the plane-to-plane disc shape.
    pub epsilon: f32,
}

impl Default for CovarianceEstimationConfig {
    fn default() -> Self {
        Self {
            k: 20,
            epsilon: 1e-3,
        }
    }
}

impl CovarianceEstimationConfig {
    fn validate(&self) -> Result<()> {
        if self.k < 3 {
            return Err(AlignError::InvalidParameter(format!(
                "covariance estimation k must be at least 3, got {}",
                self.k
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "covariance epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Estimate a regularized covariance for each point and attach it.
///
/// The raw neighborhood covariance is decomposed and rebuilt with
/// eigenvalues `(1, 1, epsilon)`, largest directions first, which is the
/// disc-shaped prior generalized ICP expects. Points whose neighborhood is
/// too small or numerically degenerate fall back to the identity matrix.
pub fn estimate_covariances(
    cloud: &mut PointCloud3D,
    config: &CovarianceEstimationConfig,
) -> Result<()> {
    config.validate()?;

    let tree = KdTree3::build(&cloud.points);
    let points = &cloud.points;

    let covariances: Vec<Matrix3<f32>> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let neighbors = tree.knn(&points[i], config.k);
            if neighbors.len() < 3 {
                return Matrix3::identity();
            }

            let covariance = neighborhood_covariance(points, &neighbors);
            let eigen = covariance.symmetric_eigen();

            // sort eigenpairs ascending by eigenvalue
            let mut order = [0usize, 1, 2];
            order.sort_by(|&a, &b| {
                eigen.eigenvalues[a]
                    .partial_cmp(&eigen.eigenvalues[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            if !eigen.eigenvalues.iter().all(|v| v.is_finite()) {
                return Matrix3::identity();
            }

            let scales = [config.epsilon, 1.0, 1.0];
            let mut rebuilt = Matrix3::zeros();
            for (rank, &k) in order.iter().enumerate() {
                let v: Vector3<f32> = eigen.eigenvectors.column(k).into_owned();
                rebuilt += scales[rank] * v * v.transpose();
            }
            rebuilt
        })
        .collect();

    cloud.covariances = Some(covariances);
    Ok(())
}

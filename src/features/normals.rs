//! Surface normal estimation via local PCA.

use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::PointCloud3D;
use crate::error::{AlignError, Result};
use crate::search::KdTree3;

/// Configuration for normal estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalEstimationConfig {
    /// Neighborhood search radius (meters). Scene-dependent; should span a
    /// handful of point spacings.
    pub radius: f32,

    /// Maximum neighbors per point. The hybrid query stops at whichever of
    /// `radius` / `max_nn` is hit first.
    pub max_nn: usize,

    /// Reference viewpoint for normal orientation.
    ///
    /// PCA leaves the normal sign ambiguous; every normal is flipped, if
    /// necessary, to point toward this viewpoint. A point exactly tangent to
    /// the viewpoint direction keeps the PCA eigenvector sign. Defaults to
    /// the origin (sensor-at-origin convention).
    pub viewpoint: Point3<f32>,
}

impl Default for NormalEstimationConfig {
    fn default() -> Self {
        Self {
            radius: 0.1,
            max_nn: 30,
            viewpoint: Point3::origin(),
        }
    }
}

impl NormalEstimationConfig {
    fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "normal estimation radius must be positive, got {}",
                self.radius
            )));
        }
        if self.max_nn < 3 {
            return Err(AlignError::InvalidParameter(format!(
                "normal estimation max_nn must be at least 3, got {}",
                self.max_nn
            )));
        }
        Ok(())
    }
}

/// Covariance of a neighborhood around its centroid.
pub(crate) fn neighborhood_covariance(
    points: &[Point3<f32>],
    neighbors: &[(usize, f32)],
) -> Matrix3<f32> {
    let mut centroid = Vector3::zeros();
    for &(j, _) in neighbors {
        centroid += points[j].coords;
    }
    centroid /= neighbors.len() as f32;

    let mut covariance = Matrix3::zeros();
    for &(j, _) in neighbors {
        let d = points[j].coords - centroid;
        covariance += d * d.transpose();
    }
    covariance / neighbors.len() as f32
}

/// Estimate a per-point surface normal and attach it to the cloud.
///
/// For each point, up to `max_nn` neighbors within `radius` are gathered
/// (hybrid query, the point itself included) and the normal is taken as the
/// eigenvector of the smallest eigenvalue of the neighborhood covariance.
/// Points with fewer than 3 neighbors get a zero normal; this is the
/// deterministic degenerate fallback, detectable by callers and accepted by
/// [`PointCloud3D::validate`].
pub fn estimate_normals(cloud: &mut PointCloud3D, config: &NormalEstimationConfig) -> Result<()> {
    config.validate()?;

    let tree = KdTree3::build(&cloud.points);
    let points = &cloud.points;

    let normals: Vec<Vector3<f32>> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let neighbors = tree.hybrid(&points[i], config.radius, config.max_nn);
            if neighbors.len() < 3 {
                return Vector3::zeros();
            }

            let covariance = neighborhood_covariance(points, &neighbors);
            let eigen = covariance.symmetric_eigen();

            let mut smallest = 0;
            for k in 1..3 {
                if eigen.eigenvalues[k] < eigen.eigenvalues[smallest] {
                    smallest = k;
                }
            }
            let mut normal: Vector3<f32> = eigen.eigenvectors.column(smallest).into_owned();

            let norm = normal.norm();
            if !norm.is_finite() || norm < 1e-12 {
                return Vector3::zeros();
            }
            normal /= norm;

            if normal.dot(&(config.viewpoint - points[i])) < 0.0 {
                normal = -normal;
            }
            normal
        })
        .collect();

    cloud.normals = Some(normals);
    Ok(())
}

//! Fast Point Feature Histograms (FPFH).
//!
//! Two-pass computation: a Simplified PFH (SPFH) per point from its Darboux
//! angle triplets, then a distance-weighted aggregation over each
//! neighborhood. The descriptor is 33-dimensional, 11 bins per angle.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::core::PointCloud3D;
use crate::error::{AlignError, Result};
use crate::search::KdTree3;

/// Bins per Darboux angle.
const BINS_PER_ANGLE: usize = 11;

/// Total descriptor dimension (3 angles, 11 bins each).
pub const FPFH_DIM: usize = 3 * BINS_PER_ANGLE;

/// A single 33-dimensional FPFH descriptor.
///
/// Each 11-bin block sums to 100 (percent occupancy), except for points
/// with no usable neighborhood, whose histogram is all zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FpfhFeature {
    pub histogram: [f32; FPFH_DIM],
}

impl Default for FpfhFeature {
    fn default() -> Self {
        Self {
            histogram: [0.0; FPFH_DIM],
        }
    }
}

impl FpfhFeature {
    /// Euclidean distance between two descriptors.
    #[inline]
    pub fn distance(&self, other: &FpfhFeature) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..FPFH_DIM {
            let d = self.histogram[i] - other.histogram[i];
            sum += d * d;
        }
        sum.sqrt()
    }
}

/// Configuration for FPFH computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpfhConfig {
    /// Neighborhood search radius (meters). Typically 2 to 5 times the
    /// normal-estimation radius.
    pub radius: f32,

    /// Maximum neighbors per point for the hybrid query.
    pub max_nn: usize,
}

impl Default for FpfhConfig {
    fn default() -> Self {
        Self {
            radius: 0.25,
            max_nn: 50,
        }
    }
}

impl FpfhConfig {
    fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(AlignError::InvalidParameter(format!(
                "FPFH radius must be positive, got {}",
                self.radius
            )));
        }
        if self.max_nn < 2 {
            return Err(AlignError::InvalidParameter(format!(
                "FPFH max_nn must be at least 2, got {}",
                self.max_nn
            )));
        }
        Ok(())
    }
}

/// Darboux-frame angle triplet `(alpha, phi, theta)` for an ordered point
/// pair, or `None` when the points coincide or a normal is degenerate.
fn pair_features(
    p1: &Point3<f32>,
    n1: &Vector3<f32>,
    p2: &Point3<f32>,
    n2: &Vector3<f32>,
) -> Option<(f32, f32, f32)> {
    let mut ps = *p1;
    let mut pt = *p2;
    let mut ns = *n1;
    let mut nt = *n2;

    let mut d = pt - ps;
    let dist = d.norm();
    if dist < 1e-12 || !dist.is_finite() {
        return None;
    }
    d /= dist;

    // orient the frame at whichever point has the smaller angle to the line
    if ns.dot(&d).abs() < nt.dot(&d).abs() {
        std::mem::swap(&mut ps, &mut pt);
        std::mem::swap(&mut ns, &mut nt);
        d = -d;
    }

    let u = ns;
    let v = d.cross(&u);
    let v_norm = v.norm();
    if v_norm < 1e-12 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let alpha = v.dot(&nt);
    let phi = u.dot(&d);
    let theta = w.dot(&nt).atan2(u.dot(&nt));
    Some((alpha, phi, theta))
}

#[inline]
fn bin_index(value: f32, min: f32, max: f32) -> usize {
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0);
    ((t * BINS_PER_ANGLE as f32) as usize).min(BINS_PER_ANGLE - 1)
}

/// Accumulate one angle triplet into a raw (unnormalized) histogram.
fn accumulate(hist: &mut [f32; FPFH_DIM], alpha: f32, phi: f32, theta: f32) {
    hist[bin_index(alpha, -1.0, 1.0)] += 1.0;
    hist[BINS_PER_ANGLE + bin_index(phi, -1.0, 1.0)] += 1.0;
    hist[2 * BINS_PER_ANGLE + bin_index(theta, -PI, PI)] += 1.0;
}

/// Normalize each 11-bin block to sum to 100.
fn normalize(hist: &mut [f32; FPFH_DIM]) {
    for block in 0..3 {
        let range = block * BINS_PER_ANGLE..(block + 1) * BINS_PER_ANGLE;
        let sum: f32 = hist[range.clone()].iter().sum();
        if sum > 0.0 {
            for v in &mut hist[range] {
                *v *= 100.0 / sum;
            }
        }
    }
}

/// Compute one FPFH descriptor per point.
///
/// Requires normals; degenerate (zero-normal) points and points with no
/// neighbors produce the all-zero descriptor. The result is index-aligned
/// with `cloud.points`.
pub fn compute_fpfh(cloud: &PointCloud3D, config: &FpfhConfig) -> Result<Vec<FpfhFeature>> {
    config.validate()?;
    let normals = cloud
        .normals
        .as_ref()
        .ok_or(AlignError::MissingNormals("FPFH computation"))?;
    if normals.len() != cloud.points.len() {
        return Err(AlignError::LengthMismatch {
            what: "normals",
            expected: cloud.points.len(),
            actual: normals.len(),
        });
    }

    let points = &cloud.points;
    let tree = KdTree3::build(points);

    // pass 1: SPFH per point, neighborhoods kept for pass 2
    let spfh_and_neighbors: Vec<([f32; FPFH_DIM], Vec<(usize, f32)>)> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut neighbors = tree.hybrid(&points[i], config.radius, config.max_nn);
            neighbors.retain(|&(j, _)| j != i);

            let mut hist = [0.0f32; FPFH_DIM];
            if normals[i].norm() < 1e-6 {
                return (hist, neighbors);
            }
            for &(j, _) in &neighbors {
                if normals[j].norm() < 1e-6 {
                    continue;
                }
                if let Some((alpha, phi, theta)) =
                    pair_features(&points[i], &normals[i], &points[j], &normals[j])
                {
                    accumulate(&mut hist, alpha, phi, theta);
                }
            }
            normalize(&mut hist);
            (hist, neighbors)
        })
        .collect();

    // pass 2: FPFH(p) = SPFH(p) + (1/k) * sum_j SPFH(j) / dist(p, j)
    let features: Vec<FpfhFeature> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let (own, neighbors) = &spfh_and_neighbors[i];
            let mut hist = *own;

            if !neighbors.is_empty() {
                let k = neighbors.len() as f32;
                for &(j, dist) in neighbors {
                    let weight = 1.0 / dist.max(1e-6);
                    let (spfh_j, _) = &spfh_and_neighbors[j];
                    for b in 0..FPFH_DIM {
                        hist[b] += spfh_j[b] * weight / k;
                    }
                }
                normalize(&mut hist);
            }
            FpfhFeature { histogram: hist }
        })
        .collect();

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{estimate_normals, NormalEstimationConfig};
    use approx::assert_relative_eq;

    fn surface_cloud() -> PointCloud3D {
        // two tilted patches so angle histograms are non-trivial
        let mut cloud = PointCloud3D::new();
        for i in 0..8 {
            for j in 0..8 {
                let x = i as f32 * 0.05;
                let y = j as f32 * 0.05;
                cloud.push(Point3::new(x, y, 0.02 * x + (i * 8 + j) as f32 * 1e-5));
                cloud.push(Point3::new(x, y + 0.5, 0.3 * y + (i * 8 + j) as f32 * 1e-5));
            }
        }
        let config = NormalEstimationConfig {
            radius: 0.2,
            max_nn: 30,
            viewpoint: Point3::new(0.0, 0.0, 10.0),
        };
        estimate_normals(&mut cloud, &config).unwrap();
        cloud
    }

    #[test]
    fn test_requires_normals() {
        let cloud = PointCloud3D::from_points(vec![Point3::origin()]);
        assert!(matches!(
            compute_fpfh(&cloud, &FpfhConfig::default()),
            Err(AlignError::MissingNormals(_))
        ));
    }

    #[test]
    fn test_histogram_blocks_sum_to_100() {
        let cloud = surface_cloud();
        let features = compute_fpfh(
            &cloud,
            &FpfhConfig {
                radius: 0.3,
                max_nn: 40,
            },
        )
        .unwrap();

        assert_eq!(features.len(), cloud.len());
        for f in &features {
            for block in 0..3 {
                let sum: f32 = f.histogram[block * 11..(block + 1) * 11].iter().sum();
                assert_relative_eq!(sum, 100.0, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_isolated_point_zero_descriptor() {
        let mut cloud = surface_cloud();
        cloud.push(Point3::new(50.0, 50.0, 50.0));

        let features = compute_fpfh(
            &cloud,
            &FpfhConfig {
                radius: 0.3,
                max_nn: 40,
            },
        )
        .unwrap();

        let outlier = features.last().unwrap();
        assert_eq!(outlier.histogram, [0.0; FPFH_DIM]);
        for f in &features {
            for v in &f.histogram {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn test_descriptor_distance() {
        let a = FpfhFeature::default();
        let mut b = FpfhFeature::default();
        b.histogram[0] = 3.0;
        b.histogram[11] = 4.0;

        assert_relative_eq!(a.distance(&b), 5.0, epsilon = 1e-6);
        assert_relative_eq!(a.distance(&a), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_translation_invariance() {
        let cloud = surface_cloud();
        let config = FpfhConfig {
            radius: 0.3,
            max_nn: 40,
        };
        let features = compute_fpfh(&cloud, &config).unwrap();

        let shift = nalgebra::Matrix4::new_translation(&Vector3::new(2.0, -1.0, 0.5));
        let moved = crate::core::transform_cloud(&cloud, &shift);
        let moved_features = compute_fpfh(&moved, &config).unwrap();

        for (a, b) in features.iter().zip(moved_features.iter()) {
            assert!(a.distance(b) < 1e-2, "FPFH must be translation invariant");
        }
    }

    #[test]
    fn test_rigid_motion_invariance() {
        let cloud = surface_cloud();
        let config = FpfhConfig {
            radius: 0.3,
            max_nn: 40,
        };
        let features = compute_fpfh(&cloud, &config).unwrap();

        let motion = nalgebra::Isometry3::new(
            Vector3::new(1.5, -0.8, 0.6),
            Vector3::new(0.3, -0.2, 0.4),
        )
        .to_homogeneous();
        let moved = crate::core::transform_cloud(&cloud, &motion);
        let moved_features = compute_fpfh(&moved, &config).unwrap();

        // bin-boundary jitter from f32 rotation allows a few percent drift
        // on blocks summing to 100, nothing more
        for (a, b) in features.iter().zip(moved_features.iter()) {
            assert!(
                a.distance(b) < 5.0,
                "descriptor moved by {} under a rigid motion",
                a.distance(b)
            );
        }
    }

    #[test]
    fn test_pair_features_degenerate_pair() {
        let p = Point3::origin();
        let n = Vector3::z();
        assert!(pair_features(&p, &n, &p, &n).is_none());
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let cloud = surface_cloud();
        let config = FpfhConfig {
            radius: 0.0,
            max_nn: 40,
        };
        assert!(compute_fpfh(&cloud, &config).is_err());
    }
}

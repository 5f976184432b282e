//! Incremental transform estimation from weighted correspondences.
//!
//! Geometry is stored in `f32`; the normal equations and the closed-form
//! solve accumulate in `f64` so long residual sums do not lose precision.

use nalgebra::{Matrix3, Matrix4, Matrix6, Point3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::core::PointCloud3D;

/// Per-iteration transform estimation method used by ICP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// Point-to-point (closed-form weighted Kabsch / SVD)
    #[default]
    PointToPoint,
    /// Point-to-plane (linearized least squares, needs target normals)
    PointToPlane,
    /// Generalized / plane-to-plane (Mahalanobis, needs covariances on
    /// both clouds)
    Generalized,
}

#[inline]
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rigid transform from a small-angle axis vector and a translation.
///
/// The rotation is reconstructed by Rodrigues' formula, so it stays exactly
/// orthonormal even though the solve linearized it.
fn small_angle_transform(omega: &Vector3<f64>, translation: &Vector3<f64>) -> Matrix4<f32> {
    let angle = omega.norm();
    let rotation = if angle < 1e-12 {
        Matrix3::identity()
    } else {
        let k = skew(&(omega / angle));
        Matrix3::identity() + angle.sin() * k + (1.0 - angle.cos()) * (k * k)
    };

    let mut transform = Matrix4::<f64>::identity();
    transform.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    transform
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(translation);
    transform.cast::<f32>()
}

/// Solve the damped 6x6 normal equations `A x = b`.
///
/// Tikhonov damping is scaled to the largest diagonal entry; Cholesky is
/// tried first, LU covers the indefinite leftovers. `None` means the system
/// is numerically unusable even after damping.
fn solve_normal_equations(mut a: Matrix6<f64>, b: Vector6<f64>) -> Option<Vector6<f64>> {
    let mut diag_max = 0.0f64;
    for i in 0..6 {
        diag_max = diag_max.max(a[(i, i)].abs());
    }
    if diag_max == 0.0 || !diag_max.is_finite() {
        return None;
    }
    let damping = 1e-6 * diag_max;
    for i in 0..6 {
        a[(i, i)] += damping;
    }

    if let Some(chol) = a.cholesky() {
        return Some(chol.solve(&b));
    }
    a.lu().solve(&b)
}

/// Weighted point-to-point alignment (Kabsch).
///
/// `pairs` are `(source index, target index, _)` triples; `weights` is
/// index-aligned with `pairs`. Returns `None` when the weighted pair set is
/// degenerate (total weight zero, or a rank-deficient cross-covariance the
/// SVD cannot factor).
pub(crate) fn solve_point_to_point(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    pairs: &[(usize, usize, f32)],
    weights: &[f32],
) -> Option<Matrix4<f32>> {
    let mut weight_sum = 0.0f64;
    let mut source_centroid = Vector3::<f64>::zeros();
    let mut target_centroid = Vector3::<f64>::zeros();
    for (&(i, j, _), &w) in pairs.iter().zip(weights) {
        let w = w as f64;
        weight_sum += w;
        source_centroid += w * source[i].coords.cast::<f64>();
        target_centroid += w * target[j].coords.cast::<f64>();
    }
    if weight_sum <= 1e-12 {
        return None;
    }
    source_centroid /= weight_sum;
    target_centroid /= weight_sum;

    let mut cross = Matrix3::<f64>::zeros();
    for (&(i, j, _), &w) in pairs.iter().zip(weights) {
        let s = source[i].coords.cast::<f64>() - source_centroid;
        let q = target[j].coords.cast::<f64>() - target_centroid;
        cross += (w as f64) * s * q.transpose();
    }

    let svd = cross.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut rotation = (u * v_t).transpose();
    if rotation.determinant() < 0.0 {
        let mut flip = Matrix3::<f64>::identity();
        flip[(2, 2)] = -1.0;
        rotation = v_t.transpose() * flip * u.transpose();
    }
    let translation = target_centroid - rotation * source_centroid;

    let mut transform = Matrix4::<f64>::identity();
    transform.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    transform
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&translation);
    Some(transform.cast::<f32>())
}

/// Weighted point-to-plane alignment.
///
/// Minimizes the normal-projected residual `((q - s) . n)` linearized in a
/// small rotation; pairs whose target normal is degenerate (zero) are
/// skipped. Returns `None` when the normal equations cannot be solved.
pub(crate) fn solve_point_to_plane(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: &[Vector3<f32>],
    pairs: &[(usize, usize, f32)],
    weights: &[f32],
) -> Option<Matrix4<f32>> {
    let mut a = Matrix6::<f64>::zeros();
    let mut b = Vector6::<f64>::zeros();
    let mut used = 0usize;

    for (&(i, j, _), &w) in pairs.iter().zip(weights) {
        let n = target_normals[j].cast::<f64>();
        if n.norm_squared() < 1e-12 {
            continue;
        }
        let s = source[i].coords.cast::<f64>();
        let q = target[j].coords.cast::<f64>();

        let residual = (q - s).dot(&n);
        let jac = Vector6::new(
            s.y * n.z - s.z * n.y,
            s.z * n.x - s.x * n.z,
            s.x * n.y - s.y * n.x,
            n.x,
            n.y,
            n.z,
        );

        let w = w as f64;
        a += w * jac * jac.transpose();
        b += w * residual * jac;
        used += 1;
    }
    if used < 3 {
        return None;
    }

    let x = solve_normal_equations(a, b)?;
    Some(small_angle_transform(
        &Vector3::new(x[0], x[1], x[2]),
        &Vector3::new(x[3], x[4], x[5]),
    ))
}

/// Weighted generalized (plane-to-plane) alignment.
///
/// The per-pair information matrix is `(C_target + C_source)^-1`, with the
/// source covariance already rotated into the target frame by the caller.
/// Pairs whose combined covariance is singular are skipped.
pub(crate) fn solve_generalized(
    source: &PointCloud3D,
    target: &PointCloud3D,
    pairs: &[(usize, usize, f32)],
    weights: &[f32],
) -> Option<Matrix4<f32>> {
    let source_covs = source.covariances.as_ref()?;
    let target_covs = target.covariances.as_ref()?;

    let mut a = Matrix6::<f64>::zeros();
    let mut b = Vector6::<f64>::zeros();
    let mut used = 0usize;

    for (&(i, j, _), &w) in pairs.iter().zip(weights) {
        let combined = (target_covs[j] + source_covs[i]).cast::<f64>();
        let info = match combined.try_inverse() {
            Some(m) => m,
            None => continue,
        };

        let s = source.points[i].coords.cast::<f64>();
        let q = target.points[j].coords.cast::<f64>();
        let residual = q - s;

        // residual(x) = e - B x with x = [omega; t]
        let mut jac = nalgebra::Matrix3x6::<f64>::zeros();
        jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&s)));
        jac.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&Matrix3::identity());

        let w = w as f64;
        a += w * jac.transpose() * info * jac;
        b += w * jac.transpose() * info * residual;
        used += 1;
    }
    if used < 3 {
        return None;
    }

    let x = solve_normal_equations(a, b)?;
    Some(small_angle_transform(
        &Vector3::new(x[0], x[1], x[2]),
        &Vector3::new(x[3], x[4], x[5]),
    ))
}

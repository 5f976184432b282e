//! Rigid-transform application and composition.
//!
//! Transforms are 4×4 homogeneous matrices (orthonormal rotation block plus
//! translation column). [`transform_cloud`] is pure and never touches the
//! caller's cloud; [`transform_cloud_in_place`] is the explicitly scoped
//! mutating variant for callers that want to avoid the copy and accept that
//! the original coordinates are gone afterwards.

use nalgebra::{Matrix3, Matrix4, Point3};

use super::cloud::PointCloud3D;

/// Apply a rigid transform to a single point.
#[inline]
pub fn transform_point(transformation: &Matrix4<f32>, point: &Point3<f32>) -> Point3<f32> {
    transformation.transform_point(point)
}

/// Compose two rigid transforms: the result applies `inner` first, then
/// `outer` (`compose(outer, inner) * p == outer * (inner * p)`).
#[inline]
pub fn compose(outer: &Matrix4<f32>, inner: &Matrix4<f32>) -> Matrix4<f32> {
    outer * inner
}

/// Rotation block of a homogeneous transform.
#[inline]
pub(crate) fn rotation_of(transformation: &Matrix4<f32>) -> Matrix3<f32> {
    transformation.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Apply a rigid transform to a cloud, returning a new cloud.
///
/// Points are mapped by the full transform, normals by the rotation block,
/// covariances by conjugation (`R C Rᵀ`). The input is never mutated.
pub fn transform_cloud(cloud: &PointCloud3D, transformation: &Matrix4<f32>) -> PointCloud3D {
    let rotation = rotation_of(transformation);

    let points = cloud
        .points
        .iter()
        .map(|p| transformation.transform_point(p))
        .collect();

    let normals = cloud
        .normals
        .as_ref()
        .map(|normals| normals.iter().map(|n| rotation * n).collect());

    let covariances = cloud
        .covariances
        .as_ref()
        .map(|covs| covs.iter().map(|c| rotation * c * rotation.transpose()).collect());

    PointCloud3D {
        points,
        normals,
        covariances,
    }
}

/// Apply a rigid transform to a cloud in place.
///
/// After this call the original coordinates are no longer available; callers
/// that still need them must use [`transform_cloud`] instead.
pub fn transform_cloud_in_place(cloud: &mut PointCloud3D, transformation: &Matrix4<f32>) {
    let rotation = rotation_of(transformation);

    for p in &mut cloud.points {
        *p = transformation.transform_point(p);
    }
    if let Some(normals) = &mut cloud.normals {
        for n in normals {
            *n = rotation * *n;
        }
    }
    if let Some(covariances) = &mut cloud.covariances {
        for c in covariances {
            *c = rotation * *c * rotation.transpose();
        }
    }
}

/// Concatenate two clouds into one, raw coordinates only.
///
/// Attribute arrays are carried over only when both inputs have them;
/// otherwise the result has none, keeping the alignment invariant.
pub fn concatenate(a: &PointCloud3D, b: &PointCloud3D) -> PointCloud3D {
    let mut points = Vec::with_capacity(a.len() + b.len());
    points.extend_from_slice(&a.points);
    points.extend_from_slice(&b.points);

    let normals = match (&a.normals, &b.normals) {
        (Some(na), Some(nb)) => {
            let mut v = Vec::with_capacity(na.len() + nb.len());
            v.extend_from_slice(na);
            v.extend_from_slice(nb);
            Some(v)
        }
        _ => None,
    };

    let covariances = match (&a.covariances, &b.covariances) {
        (Some(ca), Some(cb)) => {
            let mut v = Vec::with_capacity(ca.len() + cb.len());
            v.extend_from_slice(ca);
            v.extend_from_slice(cb);
            Some(v)
        }
        _ => None,
    };

    PointCloud3D {
        points,
        normals,
        covariances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};
    use std::f32::consts::FRAC_PI_2;

    fn sample_cloud() -> PointCloud3D {
        let mut cloud = PointCloud3D::from_points(vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-2.0, 0.5, 3.0),
        ]);
        cloud.normals = Some(vec![Vector3::z(); 3]);
        cloud
    }

    fn isometry(tx: f32, ty: f32, tz: f32, axis_angle: Vector3<f32>) -> Matrix4<f32> {
        Isometry3::new(Vector3::new(tx, ty, tz), axis_angle).to_homogeneous()
    }

    #[test]
    fn test_identity_is_exact() {
        let cloud = sample_cloud();
        let out = transform_cloud(&cloud, &Matrix4::identity());
        assert_eq!(cloud, out);
    }

    #[test]
    fn test_rotation_moves_points_and_normals() {
        let cloud = sample_cloud();
        let rot = isometry(0.0, 0.0, 0.0, Vector3::x() * FRAC_PI_2);
        let out = transform_cloud(&cloud, &rot);

        // (0, 1, 0) rotates to (0, 0, 1) about x
        assert_relative_eq!(out.points[1].z, 1.0, epsilon = 1e-6);
        // z normal rotates to -y
        let n = out.normals.as_ref().unwrap()[0];
        assert_relative_eq!(n.y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_composition_associativity() {
        let cloud = sample_cloud();
        let t1 = isometry(1.0, -2.0, 0.5, Vector3::new(0.2, 0.0, 0.1));
        let t2 = isometry(-0.3, 0.7, 2.0, Vector3::new(0.0, -0.4, 0.3));

        let step_by_step = transform_cloud(&transform_cloud(&cloud, &t1), &t2);
        let composed = transform_cloud(&cloud, &compose(&t2, &t1));

        for (a, b) in step_by_step.points.iter().zip(composed.points.iter()) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-4);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-4);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_in_place_matches_pure() {
        let cloud = sample_cloud();
        let t = isometry(0.5, 1.5, -1.0, Vector3::new(0.1, 0.2, 0.3));

        let pure = transform_cloud(&cloud, &t);
        let mut in_place = cloud.clone();
        transform_cloud_in_place(&mut in_place, &t);

        assert_eq!(pure, in_place);
    }

    #[test]
    fn test_roundtrip_inverse() {
        let cloud = sample_cloud();
        let t = isometry(3.0, -1.0, 2.0, Vector3::new(0.3, 0.5, -0.2));
        let inv = t.try_inverse().unwrap();

        let back = transform_cloud(&transform_cloud(&cloud, &t), &inv);
        for (a, b) in cloud.points.iter().zip(back.points.iter()) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-4);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-4);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_covariance_conjugation_preserves_symmetry() {
        let mut cloud = PointCloud3D::from_points(vec![Point3::origin()]);
        let c = Matrix3::new(1.0, 0.1, 0.0, 0.1, 2.0, 0.2, 0.0, 0.2, 3.0);
        cloud.covariances = Some(vec![c]);

        let t = isometry(0.0, 0.0, 0.0, Vector3::new(0.4, -0.3, 0.8));
        let out = transform_cloud(&cloud, &t);
        let rotated = out.covariances.as_ref().unwrap()[0];

        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotated[(i, j)], rotated[(j, i)], epsilon = 1e-5);
            }
        }
        // trace is invariant under conjugation by a rotation
        assert_relative_eq!(rotated.trace(), c.trace(), epsilon = 1e-4);
    }

    #[test]
    fn test_concatenate() {
        let a = sample_cloud();
        let b = PointCloud3D::from_points(vec![Point3::new(9.0, 9.0, 9.0)]);

        let joined = concatenate(&a, &b);
        assert_eq!(joined.len(), 4);
        // b has no normals, so the result drops them
        assert!(!joined.has_normals());

        let mut b2 = b.clone();
        b2.normals = Some(vec![Vector3::x()]);
        let joined2 = concatenate(&a, &b2);
        assert_eq!(joined2.normals.as_ref().unwrap().len(), 4);
    }
}

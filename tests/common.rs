//! Test utilities for registration evaluation.
//!
//! Synthetic surface generators with enough geometric structure to pin all
//! six degrees of freedom.

#![allow(dead_code)]

use nalgebra::{Isometry3, Matrix4, Point3, Vector3};
use sandhi_align::{estimate_normals, NormalEstimationConfig, PointCloud3D};

/// Points on three faces of a unit cube, deterministically jittered so no
/// axis holds a long run of identical coordinates.
pub fn cube_faces_cloud(points_per_edge: usize) -> PointCloud3D {
    let n = points_per_edge;
    let step = 1.0 / (n - 1) as f32;
    let mut cloud = PointCloud3D::new();
    for i in 0..n {
        for j in 0..n {
            let a = i as f32 * step;
            let b = j as f32 * step;
            let eps = ((i * n + j) % 17) as f32 * 1e-4;
            cloud.push(Point3::new(a, b, eps));
            cloud.push(Point3::new(a, eps, b));
            cloud.push(Point3::new(eps, a, b));
        }
    }
    cloud
}

/// Wavy asymmetric surface patch, distinctive enough for feature matching.
pub fn wavy_patch(n: usize, spacing: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    for i in 0..n {
        for j in 0..n {
            let x = i as f32 * spacing;
            let y = j as f32 * spacing;
            let z = 0.15 * (3.0 * x).sin() * (2.0 * y).cos() + 0.1 * x * y;
            cloud.push(Point3::new(x, y, z + (i * n + j) as f32 * 1e-5));
        }
    }
    cloud
}

/// Attach normals oriented toward a viewpoint well above the surface.
pub fn with_normals(mut cloud: PointCloud3D, radius: f32) -> PointCloud3D {
    estimate_normals(
        &mut cloud,
        &NormalEstimationConfig {
            radius,
            max_nn: 30,
            viewpoint: Point3::new(0.5, 0.5, 10.0),
        },
    )
    .unwrap();
    cloud
}

/// Homogeneous rigid transform from a translation and an axis-angle vector.
pub fn rigid(translation: Vector3<f32>, axis_angle: Vector3<f32>) -> Matrix4<f32> {
    Isometry3::new(translation, axis_angle).to_homogeneous()
}

/// Largest absolute entry difference between two transforms.
pub fn transform_error(a: &Matrix4<f32>, b: &Matrix4<f32>) -> f32 {
    let mut worst = 0.0f32;
    for i in 0..4 {
        for j in 0..4 {
            worst = worst.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    worst
}

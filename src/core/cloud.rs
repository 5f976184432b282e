//! 3D point cloud type.

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// An ordered set of 3D points with optional per-point attributes.
///
/// Attribute arrays, when present, are index-aligned 1:1 with `points`:
/// `normals[i]` and `covariances[i]` describe the local surface around
/// `points[i]`. Normals are unit length, except for points where estimation
/// was degenerate (fewer than 3 neighbors), which carry a zero vector.
/// Covariances are the regularized local-shape matrices consumed by
/// generalized ICP.
///
/// Registration reads clouds; only the attach operations
/// ([`estimate_normals`](crate::features::estimate_normals),
/// [`estimate_covariances`](crate::features::estimate_covariances)) take
/// `&mut` access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PointCloud3D {
    /// Point coordinates in meters
    pub points: Vec<Point3<f32>>,
    /// Optional per-point unit surface normals (zero vector = degenerate)
    pub normals: Option<Vec<Vector3<f32>>>,
    /// Optional per-point regularized local covariances (for generalized ICP)
    pub covariances: Option<Vec<Matrix3<f32>>>,
}

impl PointCloud3D {
    /// Create an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            normals: None,
            covariances: None,
        }
    }

    /// Create from a vector of points, without attributes.
    pub fn from_points(points: Vec<Point3<f32>>) -> Self {
        Self {
            points,
            normals: None,
            covariances: None,
        }
    }

    /// Add a point. Attribute arrays, if present, grow with a degenerate
    /// placeholder (zero normal, identity covariance) to stay aligned.
    #[inline]
    pub fn push(&mut self, point: Point3<f32>) {
        self.points.push(point);
        if let Some(normals) = &mut self.normals {
            normals.push(Vector3::zeros());
        }
        if let Some(covariances) = &mut self.covariances {
            covariances.push(Matrix3::identity());
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the cloud has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether per-point normals are attached.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Whether per-point covariances are attached.
    #[inline]
    pub fn has_covariances(&self) -> bool {
        self.covariances.is_some()
    }

    /// Remove all points and attributes.
    pub fn clear(&mut self) {
        self.points.clear();
        self.normals = None;
        self.covariances = None;
    }

    /// Center of mass of the points.
    pub fn centroid(&self) -> Option<Point3<f32>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.points.len() as f32))
    }

    /// Validate internal consistency of the cloud.
    ///
    /// Checks attribute alignment and that every attached normal is unit
    /// length (within 1e-3) or exactly the zero-vector degenerate marker.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(normals) = &self.normals {
            if normals.len() != self.points.len() {
                return Err("normals and points length mismatch");
            }
            for n in normals {
                let norm = n.norm();
                if norm != 0.0 && (norm - 1.0).abs() > 1e-3 {
                    return Err("normal is neither unit length nor zero");
                }
            }
        }
        if let Some(covariances) = &self.covariances {
            if covariances.len() != self.points.len() {
                return Err("covariances and points length mismatch");
            }
        }
        Ok(())
    }
}

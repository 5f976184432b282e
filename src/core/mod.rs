//! Core foundation: point cloud type and rigid-transform operations.

pub mod cloud;
pub mod transform;

pub use cloud::PointCloud3D;
pub use transform::{
    compose, concatenate, transform_cloud, transform_cloud_in_place, transform_point,
};

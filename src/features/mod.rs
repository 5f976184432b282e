//! Per-point geometry features: surface normals, local covariances, and
//! FPFH shape descriptors.

mod covariances;
mod fpfh;
mod normals;

pub use covariances::{estimate_covariances, CovarianceEstimationConfig};
pub use fpfh::{compute_fpfh, FpfhConfig, FpfhFeature, FPFH_DIM};
pub use normals::{estimate_normals, NormalEstimationConfig};

//! sandhi-align - Rigid 3D point cloud registration
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  registration/                      │  ← Alignment
//! │          (fast global, ICP, evaluation)             │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   features/                         │  ← Descriptors
//! │           (normals, covariances, FPFH)              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    search/                          │  ← Spatial index
//! │                   (k-d tree)                        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │              (cloud, transforms)                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! A full coarse-to-fine alignment of two unorganized clouds:
//!
//! 1. [`estimate_normals`] on both clouds
//! 2. [`compute_fpfh`] on both clouds
//! 3. [`register_fast_global`] for a coarse transform with no initial guess
//! 4. [`register_icp`] seeded with the coarse transform for refinement
//! 5. [`transform_cloud`] to bring the source into the target frame
//!
//! Steps 1-3 can be skipped when a decent initial guess already exists.
//! The reported transform always maps source coordinates into the target
//! frame (`q ≈ T * s`).

// ============================================================================
// Errors (shared by every layer)
// ============================================================================
pub mod error;

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Spatial search (depends on core)
// ============================================================================
pub mod search;

// ============================================================================
// Layer 3: Features (depends on core, search)
// ============================================================================
pub mod features;

// ============================================================================
// Layer 4: Registration (depends on all layers)
// ============================================================================
pub mod registration;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::{
    compose, concatenate, transform_cloud, transform_cloud_in_place, transform_point,
    PointCloud3D,
};

// Search
pub use search::KdTree3;

// Features
pub use features::{
    compute_fpfh, estimate_covariances, estimate_normals, CovarianceEstimationConfig,
    FpfhConfig, FpfhFeature, NormalEstimationConfig, FPFH_DIM,
};

// Registration
pub use registration::{
    evaluate_registration, find_correspondences, register_fast_global, register_icp,
    ConvergenceCriteria, EstimationMethod, FastGlobalConfig, IcpConfig, RegistrationResult,
    RobustLoss,
};

// Errors
pub use error::{AlignError, Result};

//! Error types for sandhi-align.

/// Result type alias
pub type Result<T> = std::result::Result<T, AlignError>;

/// Registration error types.
///
/// Only invalid configuration and malformed inputs are reported as errors.
/// Degenerate geometry (too few neighbors, no surviving correspondences,
/// non-convergence) is recovered locally or reported through the fields of
/// [`RegistrationResult`](crate::RegistrationResult).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlignError {
    /// Invalid configuration parameter, rejected before any computation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation requires per-point normals that are not attached
    #[error("{0} requires normals; run estimate_normals on the cloud first")]
    MissingNormals(&'static str),

    /// Operation requires per-point covariances that are not attached
    #[error("{0} requires covariances; run estimate_covariances on the cloud first")]
    MissingCovariances(&'static str),

    /// Two index-aligned sequences have different lengths
    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        /// Which pair of sequences disagrees
        what: &'static str,
        /// Expected length (the point count)
        expected: usize,
        /// Actual length of the attribute sequence
        actual: usize,
    },
}

//! Robust loss functions for iteratively reweighted least squares.

use serde::{Deserialize, Serialize};

/// Robust loss applied to ICP residuals.
///
/// Each variant maps a residual to an IRLS weight in `(0, 1]`; `None` is
/// plain least squares. `scale` is the residual magnitude (same units as
/// the residual) at which down-weighting becomes significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RobustLoss {
    /// Plain least squares, weight 1 everywhere
    #[default]
    None,
    /// L1 loss, weight `1 / |r|`
    L1,
    /// Huber loss, quadratic inside `scale`, linear outside
    Huber,
    /// Cauchy loss, weight `1 / (1 + (r/s)^2)`
    Cauchy,
    /// Tukey biweight, hard zero beyond `scale`
    Tukey,
    /// Geman-McClure, weight `(s^2 / (s^2 + r^2))^2`
    GemanMcClure,
}

impl RobustLoss {
    /// IRLS weight for a squared residual.
    ///
    /// `scale` must be positive for every variant except `None`; callers
    /// validate it up front.
    #[inline]
    pub fn weight(&self, residual_sq: f32, scale: f32) -> f32 {
        match self {
            RobustLoss::None => 1.0,
            RobustLoss::L1 => {
                let r = residual_sq.sqrt();
                if r < 1e-10 {
                    1.0
                } else {
                    1.0 / r
                }
            }
            RobustLoss::Huber => {
                let r = residual_sq.sqrt();
                if r <= scale {
                    1.0
                } else {
                    scale / r
                }
            }
            RobustLoss::Cauchy => 1.0 / (1.0 + residual_sq / (scale * scale)),
            RobustLoss::Tukey => {
                let r = residual_sq.sqrt();
                if r >= scale {
                    0.0
                } else {
                    let t = 1.0 - (r / scale) * (r / scale);
                    t * t
                }
            }
            RobustLoss::GemanMcClure => {
                let s2 = scale * scale;
                let w = s2 / (s2 + residual_sq);
                w * w
            }
        }
    }
}

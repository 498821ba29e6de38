//! # Error
//!
//! $$
//! \text{build}: (\alpha, T, N, \varepsilon) \to \text{model} \;\vert\; \text{StocProcError}
//! $$
//!
//! Every variant carries the numbers needed to decide how to retry (larger grid,
//! more modes, looser tolerance), so callers never have to parse messages.
use thiserror::Error;

/// Errors raised while building or sampling a process model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StocProcError {
  /// The autocorrelation function is not Hermitian on the integration grid,
  /// or `α(0)` is not a usable normalization.
  #[error("invalid kernel: {reason} (deviation {deviation:.3e}, tolerance {tolerance:.3e})")]
  InvalidKernel {
    reason: &'static str,
    deviation: f64,
    tolerance: f64,
  },

  /// The discretized kernel has an eigenvalue too negative to be rounding noise.
  #[error(
    "kernel is not positive semi-definite: eigenvalue {eigenvalue:.3e} against largest {largest:.3e}"
  )]
  NonPositiveSemiDefinite { eigenvalue: f64, largest: f64 },

  /// Truncation could not reach the requested accuracy.
  ///
  /// Recoverable by increasing the grid size or the mode cap.
  #[error(
    "tolerance {target:.3e} not achieved: best error {achieved:.3e} with {num_modes} modes on {grid_points} grid points"
  )]
  ToleranceNotAchieved {
    achieved: f64,
    target: f64,
    num_modes: usize,
    grid_points: usize,
  },

  /// Interpolated basis functions failed the orthonormality spot check.
  #[error("basis construction failed: <φ_{row}, φ_{col}> deviates by {deviation:.3e} (tolerance {tolerance:.3e})")]
  BasisConstruction {
    row: usize,
    col: usize,
    deviation: f64,
    tolerance: f64,
  },

  /// A query time lies outside `[0, t_max]`.
  #[error("time {t} at index {index} is outside the domain [0, {t_max}]")]
  OutOfDomain { index: usize, t: f64, t_max: f64 },

  /// Configuration or argument rejected before any numerics ran.
  #[error("invalid parameter '{name}': {reason}")]
  InvalidParameter { name: &'static str, reason: String },

  /// A numerical backend did not converge.
  #[error("numerical failure: {reason}")]
  Numerical { reason: String },
}

impl StocProcError {
  pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidParameter {
      name,
      reason: reason.into(),
    }
  }

  /// Whether retrying with a finer grid or a larger mode cap may succeed.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      Self::ToleranceNotAchieved { .. } | Self::BasisConstruction { .. }
    )
  }
}

pub type Result<T> = std::result::Result<T, StocProcError>;

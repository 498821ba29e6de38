//! # Traits
//!
//! $$
//! \text{Trait contracts: } \alpha(\tau),\ J(\omega),\ \lambda_k\phi_k,\ z(t)=\sum_k\sqrt{\lambda_k}X_k\phi_k(t)
//! $$
//!
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::error::Result;
use crate::model::Diagnostics;
use crate::sampler::check_domain;
use crate::sampler::Realization;

/// Stationary, Hermitian autocorrelation function `α(τ) = ⟨z(t+τ) z*(t)⟩`.
///
/// Implementations must satisfy `α(-τ) = conj(α(τ))`; the kernel discretizer
/// verifies this on the integration grid.
pub trait Autocorrelation: Send + Sync {
  fn eval(&self, tau: f64) -> Complex64;
}

impl<F> Autocorrelation for F
where
  F: Fn(f64) -> Complex64 + Send + Sync,
{
  fn eval(&self, tau: f64) -> Complex64 {
    self(tau)
  }
}

/// Non-negative spectral density `J(ω)` with `α(τ) = 1/π ∫ J(ω) e^{-iωτ} dω`.
pub trait SpectralDensity: Send + Sync {
  fn eval(&self, omega: f64) -> f64;
}

impl<F> SpectralDensity for F
where
  F: Fn(f64) -> f64 + Send + Sync,
{
  fn eval(&self, omega: f64) -> f64 {
    self(omega)
  }
}

/// Eigen-decomposition of a Hermitian matrix.
///
/// Returns the eigenvalues (any order) and the matching eigenvectors as columns.
/// Solvers may return fewer pairs than the matrix dimension.
pub trait HermitianEigenSolver {
  fn solve(&self, matrix: &DMatrix<Complex64>) -> Result<(DVector<f64>, DMatrix<Complex64>)>;
}

/// Continuous function on a closed interval, evaluable at single points or batches.
pub trait Interpolant: Send + Sync {
  fn domain(&self) -> (f64, f64);

  fn eval(&self, t: f64) -> Complex64;

  fn eval_batch(&self, ts: &[f64]) -> Array1<Complex64> {
    ts.iter().map(|&t| self.eval(t)).collect()
  }
}

/// Capability shared by every built process model.
///
/// A model is an immutable set of `K` modes `√λ_k φ_k(t)` on `[0, t_max]`;
/// a realization is the model combined with `K` coefficients.
pub trait ProcessModel: Send + Sync {
  fn t_max(&self) -> f64;

  /// Number of random coefficients a realization consumes.
  fn num_modes(&self) -> usize;

  /// True when every basis function is real-valued, so real coefficients give a real process.
  fn is_real(&self) -> bool;

  /// Mode amplitudes `√λ_k`, including any scale factor.
  fn mode_weights(&self) -> &[f64];

  /// Unweighted basis function `φ_k(t)`. `t` is not range checked.
  fn eval_mode(&self, k: usize, t: f64) -> Complex64;

  /// Binds coefficients to the model for O(1) evaluation.
  fn realize(&self, coefficients: &[Complex64]) -> Result<Realization>;

  fn diagnostics(&self) -> Diagnostics;

  /// Exact mode sum `z(t) = Σ_k √λ_k X_k φ_k(t)` at every query time.
  fn evaluate(&self, coefficients: &[Complex64], times: &[f64]) -> Result<Array1<Complex64>> {
    crate::sampler::check_coefficients(self.num_modes(), coefficients.len())?;
    check_domain(times, self.t_max())?;
    let weights = self.mode_weights();
    Ok(
      times
        .iter()
        .map(|&t| {
          weights
            .iter()
            .zip(coefficients.iter())
            .enumerate()
            .map(|(k, (&w, &x))| x * w * self.eval_mode(k, t))
            .sum()
        })
        .collect(),
    )
  }
}

pub trait ProcessExt: Send + Sync {
  type Output: Send;

  fn sample(&self) -> Self::Output;

  fn sample_par(&self, m: usize) -> Vec<Self::Output> {
    (0..m).into_par_iter().map(|_| self.sample()).collect()
  }
}

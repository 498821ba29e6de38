//! # Kernel
//!
//! $$
//! A_{ij}=\alpha(t_i-t_j),\qquad K_{ij}=A_{ij}w_j,\qquad D=W^{1/2}AW^{1/2}
//! $$
//!
use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use num_complex::Complex64;
use tracing::debug;

use crate::error::Result;
use crate::error::StocProcError;
use crate::kle::eigen::EigenMode;
use crate::quadrature::IntegrationGrid;
use crate::traits::Autocorrelation;

/// Autocorrelation sampled on every pair of quadrature nodes.
///
/// Holds a reference to the autocorrelation so that off-grid values
/// (Nyström interpolation, validation) use the exact function.
pub struct KernelMatrix<'a, A: Autocorrelation + ?Sized> {
  alpha: &'a A,
  grid: IntegrationGrid,
  values: DMatrix<Complex64>,
  alpha0: f64,
  is_real: bool,
}

impl<'a, A: Autocorrelation + ?Sized> KernelMatrix<'a, A> {
  /// Evaluates `α(t_i - t_j)` and verifies Hermiticity within `hermitian_tol · |α(0)|`.
  pub fn discretize(alpha: &'a A, grid: IntegrationGrid, hermitian_tol: f64) -> Result<Self> {
    let a0 = alpha.eval(0.0);
    if !a0.is_finite() || a0.norm() == 0.0 {
      return Err(StocProcError::InvalidKernel {
        reason: "α(0) must be finite and non-zero",
        deviation: a0.norm(),
        tolerance: hermitian_tol,
      });
    }
    let alpha0 = a0.norm();
    if a0.re <= 0.0 || a0.im.abs() > hermitian_tol * alpha0 {
      return Err(StocProcError::InvalidKernel {
        reason: "α(0) must be real and positive",
        deviation: a0.im.abs() / alpha0,
        tolerance: hermitian_tol,
      });
    }

    let t = &grid.nodes;
    let n = t.len();
    let values = DMatrix::from_fn(n, n, |i, j| alpha.eval(t[i] - t[j]));

    let mut deviation = 0.0_f64;
    let mut is_real = true;
    for j in 0..n {
      for i in 0..n {
        let v = values[(i, j)];
        if !v.is_finite() {
          return Err(StocProcError::InvalidKernel {
            reason: "α returned a non-finite value on the grid",
            deviation: f64::INFINITY,
            tolerance: hermitian_tol,
          });
        }
        if v.im.abs() > f64::EPSILON * alpha0 {
          is_real = false;
        }
        if i < j {
          deviation = deviation.max((v - values[(j, i)].conj()).norm());
        }
      }
    }
    let deviation = deviation / alpha0;
    if deviation > hermitian_tol {
      return Err(StocProcError::InvalidKernel {
        reason: "α(-τ) != conj(α(τ)) on the integration grid",
        deviation,
        tolerance: hermitian_tol,
      });
    }

    debug!(
      grid_points = n,
      rule = ?grid.rule,
      hermitian_deviation = deviation,
      is_real,
      "kernel discretized"
    );

    Ok(Self {
      alpha,
      grid,
      values,
      alpha0,
      is_real,
    })
  }

  pub fn grid(&self) -> &IntegrationGrid {
    &self.grid
  }

  pub fn len(&self) -> usize {
    self.grid.len()
  }

  pub fn is_empty(&self) -> bool {
    self.grid.is_empty()
  }

  /// `|α(0)|`, the normalization of every relative error.
  pub fn alpha0(&self) -> f64 {
    self.alpha0
  }

  /// True when `α` is real on every grid pair.
  pub fn is_real(&self) -> bool {
    self.is_real
  }

  pub fn alpha(&self, tau: f64) -> Complex64 {
    self.alpha.eval(tau)
  }

  /// `A_ij = α(t_i - t_j)`
  pub fn values(&self) -> &DMatrix<Complex64> {
    &self.values
  }

  /// `K_ij = α(t_i - t_j) w_j`, the Nyström matrix of the integral operator.
  pub fn weighted(&self) -> DMatrix<Complex64> {
    let w = &self.grid.weights;
    DMatrix::from_fn(self.len(), self.len(), |i, j| self.values[(i, j)] * w[j])
  }

  /// `D = W^{1/2} A W^{1/2}`, Hermitian and similar to [`Self::weighted`].
  ///
  /// The rounding-level anti-Hermitian part of `A` is discarded.
  pub fn symmetrized(&self) -> DMatrix<Complex64> {
    let sw = self.grid.weights.mapv(f64::sqrt);
    DMatrix::from_fn(self.len(), self.len(), |i, j| {
      let a = 0.5 * (self.values[(i, j)] + self.values[(j, i)].conj());
      a * (sw[i] * sw[j])
    })
  }

  /// Nyström extension `u_k(t) = 1/λ_k Σ_j α(t - s_j) w_j u_k(s_j)` at arbitrary times.
  ///
  /// Returns a `times × modes` matrix. Every mode must have a positive eigenvalue.
  pub fn nystrom(&self, times: &[f64], modes: &[EigenMode]) -> Array2<Complex64> {
    let s = &self.grid.nodes;
    let w = &self.grid.weights;
    let b = Array2::from_shape_fn((times.len(), s.len()), |(i, j)| {
      self.alpha.eval(times[i] - s[j]) * w[j]
    });
    let u = Array2::from_shape_fn((s.len(), modes.len()), |(j, k)| {
      modes[k].vector[j] / modes[k].eigenvalue
    });
    b.dot(&u)
  }

  /// Nyström values of a single mode, see [`Self::nystrom`].
  pub fn nystrom_mode(&self, times: &[f64], mode: &EigenMode) -> Array1<Complex64> {
    self
      .nystrom(times, std::slice::from_ref(mode))
      .column(0)
      .to_owned()
  }
}

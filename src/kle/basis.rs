//! # Basis
//!
//! $$
//! \phi_k(t)=\mathrm{spline}\Big[\tfrac{1}{\lambda_k}\sum_j\alpha(t-s_j)\,w_j\,u_k(s_j)\Big],\qquad
//! \sum_i w_i\,\overline{\phi_j(t_i)}\,\phi_k(t_i)\approx\delta_{jk}
//! $$
//!
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use num_complex::Complex64;
use tracing::debug;

use crate::error::Result;
use crate::error::StocProcError;
use crate::kle::eigen::EigenMode;
use crate::kle::kernel::KernelMatrix;
use crate::spline::CubicSpline;
use crate::traits::Autocorrelation;
use crate::traits::Interpolant;

/// Retained eigenfunctions as splines on a common fine grid.
#[derive(Debug, Clone)]
pub struct ContinuousBasis {
  splines: Vec<CubicSpline>,
  t_max: f64,
  fine_points: usize,
}

impl ContinuousBasis {
  /// Samples every mode at `ng_fac · (N - 1) + 1` equidistant points by
  /// Nyström interpolation and fits one spline per mode.
  ///
  /// The result is checked for orthonormality at the quadrature nodes; any
  /// Gram entry off by more than `orthonormality_tol` is a
  /// [`StocProcError::BasisConstruction`] error.
  pub fn build<A: Autocorrelation + ?Sized>(
    kernel: &KernelMatrix<'_, A>,
    modes: &[EigenMode],
    ng_fac: usize,
    orthonormality_tol: f64,
  ) -> Result<Self> {
    if modes.is_empty() {
      return Err(StocProcError::invalid("modes", "basis needs at least one mode"));
    }
    let mut basis = Self::empty(kernel, ng_fac)?;
    basis.extend(kernel, modes)?;
    basis.check_orthonormality(kernel, orthonormality_tol)?;
    Ok(basis)
  }

  /// Basis without modes on the fine grid of `kernel`.
  pub(crate) fn empty<A: Autocorrelation + ?Sized>(
    kernel: &KernelMatrix<'_, A>,
    ng_fac: usize,
  ) -> Result<Self> {
    if ng_fac == 0 {
      return Err(StocProcError::invalid("ng_fac", "must be at least 1"));
    }
    Ok(Self {
      splines: Vec::new(),
      t_max: kernel.grid().t_max,
      fine_points: ng_fac * (kernel.len() - 1) + 1,
    })
  }

  /// Appends splines for `modes` after the existing ones.
  pub(crate) fn extend<A: Autocorrelation + ?Sized>(
    &mut self,
    kernel: &KernelMatrix<'_, A>,
    modes: &[EigenMode],
  ) -> Result<()> {
    if modes.is_empty() {
      return Ok(());
    }
    let fine: Vec<f64> = Array1::linspace(0.0, self.t_max, self.fine_points).to_vec();
    let values = kernel.nystrom(&fine, modes);
    for k in 0..modes.len() {
      self
        .splines
        .push(CubicSpline::fit(0.0, self.t_max, values.slice(s![.., k]))?);
    }
    debug!(modes = self.len(), fine_points = self.fine_points, "continuous basis extended");
    Ok(())
  }

  /// Keeps the first `k` modes.
  pub(crate) fn truncate(&mut self, k: usize) {
    self.splines.truncate(k);
  }

  /// Gram matrix of the splines under the quadrature rule of `kernel`, compared against the identity.
  pub fn check_orthonormality<A: Autocorrelation + ?Sized>(
    &self,
    kernel: &KernelMatrix<'_, A>,
    tolerance: f64,
  ) -> Result<()> {
    let grid = kernel.grid();
    let nodes = grid.nodes.to_vec();
    let k = self.len();
    let mut phi = Array2::<Complex64>::zeros((nodes.len(), k));
    for (j, spline) in self.splines.iter().enumerate() {
      phi.column_mut(j).assign(&spline.eval_batch(&nodes));
    }

    let mut worst = (0, 0, 0.0_f64);
    for a in 0..k {
      for b in a..k {
        let g: Complex64 = (0..nodes.len())
          .map(|i| phi[(i, a)].conj() * phi[(i, b)] * grid.weights[i])
          .sum();
        let expected = if a == b { 1.0 } else { 0.0 };
        let deviation = (g - expected).norm();
        if deviation > worst.2 {
          worst = (a, b, deviation);
        }
      }
    }

    debug!(max_deviation = worst.2, "basis orthonormality");
    if worst.2 > tolerance {
      return Err(StocProcError::BasisConstruction {
        row: worst.0,
        col: worst.1,
        deviation: worst.2,
        tolerance,
      });
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.splines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.splines.is_empty()
  }

  pub fn t_max(&self) -> f64 {
    self.t_max
  }

  pub fn splines(&self) -> &[CubicSpline] {
    &self.splines
  }

  pub fn mode(&self, k: usize) -> &CubicSpline {
    &self.splines[k]
  }

  /// Number of knots shared by every spline.
  pub fn fine_points(&self) -> usize {
    self.fine_points
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::correlation::ExponentialCorrelation;
  use crate::correlation::GaussianCorrelation;
  use crate::kle::eigen::decompose;
  use crate::kle::eigen::DenseEigenSolver;
  use crate::kle::selector::select;
  use crate::kle::selector::ValidationScheme;
  use crate::quadrature::IntegrationGrid;
  use crate::quadrature::QuadratureRule;

  #[test]
  fn splines_follow_nystrom_values_and_stay_orthonormal() {
    let gauss = GaussianCorrelation::new(1.0, 0.8);
    let alpha = move |tau: f64| gauss.alpha(tau) * Complex64::new(0.0, -tau).exp();
    let grid = IntegrationGrid::new(QuadratureRule::Simpson, 3.0, 61).unwrap();
    let kernel = KernelMatrix::discretize(&alpha, grid, 1e-10).unwrap();
    assert!(!kernel.is_real());
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-6, true).unwrap();
    let set = select(&kernel, &dec, 1e-4, None, ValidationScheme::default(), 4).unwrap();
    let basis = ContinuousBasis::build(&kernel, &set.modes, 4, 1e-2).unwrap();

    assert_eq!(basis.len(), set.len());
    assert_eq!(basis.fine_points(), 4 * 60 + 1);

    let times = [0.0, 0.37, 1.5, 2.999, 3.0];
    let exact = kernel.nystrom(&times, &set.modes);
    for k in 0..basis.len() {
      for (i, &t) in times.iter().enumerate() {
        assert_abs_diff_eq!((basis.mode(k).eval(t) - exact[(i, k)]).norm(), 0.0, epsilon = 1e-5);
      }
    }
  }

  #[test]
  fn extending_matches_a_single_build() {
    let alpha = ExponentialCorrelation::default();
    let grid = IntegrationGrid::new(QuadratureRule::Simpson, 2.0, 33).unwrap();
    let kernel = KernelMatrix::discretize(&alpha, grid, 1e-10).unwrap();
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-6, true).unwrap();
    let whole = ContinuousBasis::build(&kernel, &dec.modes[..6], 3, 1e-2).unwrap();

    let mut grown = ContinuousBasis::empty(&kernel, 3).unwrap();
    assert!(grown.is_empty());
    grown.extend(&kernel, &dec.modes[..2]).unwrap();
    grown.extend(&kernel, &dec.modes[2..8]).unwrap();
    grown.truncate(6);
    assert_eq!(grown.len(), 6);
    assert_eq!(grown.fine_points(), 3 * 32 + 1);
    for k in 0..6 {
      for &t in &[0.0, 0.41, 1.0, 1.93] {
        assert_abs_diff_eq!((grown.mode(k).eval(t) - whole.mode(k).eval(t)).norm(), 0.0, epsilon = 1e-12);
      }
    }
    assert!(ContinuousBasis::empty(&kernel, 0).is_err());
  }

  #[test]
  fn orthonormality_violation_is_reported() {
    let alpha = ExponentialCorrelation::new(1.0, 0.2, 0.0);
    let grid = IntegrationGrid::new(QuadratureRule::Trapezoidal, 2.0, 41).unwrap();
    let kernel = KernelMatrix::discretize(&alpha, grid, 1e-10).unwrap();
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-6, true).unwrap();
    // a duplicated mode cannot be orthogonal to its copy
    let mut modes = dec.modes[..3].to_vec();
    modes.push(dec.modes[0].clone());
    let err = ContinuousBasis::build(&kernel, &modes, 2, 1e-2).unwrap_err();
    match err {
      StocProcError::BasisConstruction { row, col, deviation, .. } => {
        assert_eq!((row, col), (0, modes.len() - 1));
        assert!(deviation > 0.5);
      }
      other => panic!("unexpected error {other:?}"),
    }
  }
}

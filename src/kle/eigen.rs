//! # Eigen
//!
//! $$
//! D v_k=\lambda_k v_k,\qquad u_k=W^{-1/2}v_k,\qquad \sum_i w_i\,\overline{u_k(t_i)}\,u_l(t_i)=\delta_{kl}
//! $$
//!
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::SymmetricEigen;
use ndarray::Array1;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::StocProcError;
use crate::kle::kernel::KernelMatrix;
use crate::traits::Autocorrelation;
use crate::traits::HermitianEigenSolver;

/// Which eigen-solver the KLE pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EigenSolverKind {
  /// Full Hermitian decomposition.
  #[default]
  Dense,
  /// Leading `num_modes` pairs only, see [`SubspaceIteration`].
  Subspace(SubspaceIteration),
}

impl EigenSolverKind {
  pub(crate) fn solver(&self) -> Box<dyn HermitianEigenSolver> {
    match self {
      Self::Dense => Box::new(DenseEigenSolver),
      Self::Subspace(s) => Box::new(*s),
    }
  }
}

/// Dense solver backed by nalgebra's symmetric eigen-decomposition.
/// Real matrices take the real symmetric path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEigenSolver;

impl HermitianEigenSolver for DenseEigenSolver {
  fn solve(&self, matrix: &DMatrix<Complex64>) -> Result<(DVector<f64>, DMatrix<Complex64>)> {
    let n = matrix.nrows();
    let max_niter = 100 * n.max(10);

    if matrix.iter().all(|v| v.im == 0.0) {
      let real = matrix.map(|v| v.re);
      let eig = SymmetricEigen::try_new(real, f64::EPSILON, max_niter).ok_or_else(|| {
        StocProcError::Numerical {
          reason: format!("real symmetric eigen-decomposition of size {n} did not converge"),
        }
      })?;
      let vectors = eig.eigenvectors.map(|v| Complex64::new(v, 0.0));
      return Ok((eig.eigenvalues, vectors));
    }

    let eig = SymmetricEigen::try_new(matrix.clone(), f64::EPSILON, max_niter).ok_or_else(|| {
      StocProcError::Numerical {
        reason: format!("Hermitian eigen-decomposition of size {n} did not converge"),
      }
    })?;
    Ok((eig.eigenvalues, eig.eigenvectors))
  }
}

/// Block power iteration with Rayleigh-Ritz projection.
///
/// Converges to the `num_modes` eigenpairs of largest magnitude. For a
/// positive semi-definite kernel those are the leading modes of the expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubspaceIteration {
  pub num_modes: usize,
  /// Extra block columns, speeds up convergence of the last wanted pair.
  pub oversampling: usize,
  pub max_iterations: usize,
  /// Residual `‖A x - θ x‖` relative to the largest Ritz value.
  pub tolerance: f64,
  pub seed: u64,
}

impl Default for SubspaceIteration {
  fn default() -> Self {
    Self {
      num_modes: 32,
      oversampling: 8,
      max_iterations: 500,
      tolerance: 1e-10,
      seed: 0,
    }
  }
}

impl HermitianEigenSolver for SubspaceIteration {
  fn solve(&self, matrix: &DMatrix<Complex64>) -> Result<(DVector<f64>, DMatrix<Complex64>)> {
    let n = matrix.nrows();
    if self.num_modes == 0 {
      return Err(StocProcError::invalid("num_modes", "subspace iteration needs at least one mode"));
    }
    let k = self.num_modes.min(n);
    let p = (k + self.oversampling).min(n);
    if p == n {
      return DenseEigenSolver.solve(matrix);
    }

    let real = matrix.iter().all(|v| v.im == 0.0);
    let mut rng = StdRng::seed_from_u64(self.seed);
    let start = DMatrix::<Complex64>::from_fn(n, p, |_, _| {
      let re: f64 = StandardNormal.sample(&mut rng);
      let im: f64 = if real { 0.0 } else { StandardNormal.sample(&mut rng) };
      Complex64::new(re, im)
    });
    let mut q = start.qr().q();

    for iteration in 0..self.max_iterations {
      let z = matrix * &q;
      let mut h = q.adjoint() * &z;
      h = (&h + h.adjoint()) * Complex64::new(0.5, 0.0);

      let (theta, s) = DenseEigenSolver.solve(&h)?;
      let mut order: Vec<usize> = (0..p).collect();
      order.sort_by(|&a, &b| theta[b].abs().total_cmp(&theta[a].abs()));
      let s = s.select_columns(&order);
      let theta = DVector::from_iterator(p, order.iter().map(|&i| theta[i]));

      let ritz = &q * &s;
      let applied = &z * &s;
      let scale = theta[0].abs().max(f64::MIN_POSITIVE);
      let converged = (0..k).all(|j| {
        let r = applied.column(j) - ritz.column(j) * Complex64::new(theta[j], 0.0);
        r.norm() <= self.tolerance * scale
      });
      if converged {
        debug!(iteration, block = p, modes = k, "subspace iteration converged");
        let values = DVector::from_iterator(k, theta.iter().take(k).copied());
        return Ok((values, ritz.columns(0, k).into_owned()));
      }

      q = applied.qr().q();
    }

    Err(StocProcError::Numerical {
      reason: format!(
        "subspace iteration for {k} modes did not converge in {} iterations",
        self.max_iterations
      ),
    })
  }
}

/// One eigenpair of the discretized integral operator.
///
/// `vector` holds `u_k(t_i)` on the quadrature nodes, orthonormal in the
/// weighted inner product.
#[derive(Debug, Clone)]
pub struct EigenMode {
  pub eigenvalue: f64,
  pub vector: Array1<Complex64>,
}

/// Eigenpairs sorted by descending eigenvalue.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
  pub modes: Vec<EigenMode>,
  pub largest: f64,
  /// Number of slightly negative eigenvalues set to zero.
  pub clipped: usize,
}

/// Solves `D v = λ v` for the kernel, maps back `u = W^{-1/2} v` and checks
/// positive semi-definiteness.
///
/// Eigenvalues below `-negative_tol · λ_max` are an error, smaller negative
/// values are clipped to zero. With `align` every eigenvector is rotated so
/// `u_k(t_0)` is real and non-negative (or the component of largest modulus, if
/// `u_k(t_0)` vanishes).
pub fn decompose<A: Autocorrelation + ?Sized>(
  kernel: &KernelMatrix<'_, A>,
  solver: &dyn HermitianEigenSolver,
  negative_tol: f64,
  align: bool,
) -> Result<EigenDecomposition> {
  let d = kernel.symmetrized();
  let (values, vectors) = solver.solve(&d)?;
  if values.iter().any(|v| !v.is_finite()) {
    return Err(StocProcError::Numerical {
      reason: "eigen-solver returned non-finite eigenvalues".to_string(),
    });
  }

  let mut order: Vec<usize> = (0..values.len()).collect();
  order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

  let largest = order.first().map(|&i| values[i]).unwrap_or(0.0);
  if largest <= 0.0 {
    return Err(StocProcError::NonPositiveSemiDefinite {
      eigenvalue: largest,
      largest,
    });
  }
  let smallest = order.last().map(|&i| values[i]).unwrap_or(0.0);
  if smallest < -negative_tol * largest {
    return Err(StocProcError::NonPositiveSemiDefinite {
      eigenvalue: smallest,
      largest,
    });
  }

  let inv_sqrt_w = kernel.grid().weights.mapv(|w| 1.0 / w.sqrt());
  let mut clipped = 0;
  let modes = order
    .iter()
    .map(|&i| {
      let mut eigenvalue = values[i];
      if eigenvalue < 0.0 {
        eigenvalue = 0.0;
        clipped += 1;
      }
      let mut vector: Array1<Complex64> = vectors
        .column(i)
        .iter()
        .zip(inv_sqrt_w.iter())
        .map(|(&v, &s)| v * s)
        .collect();
      if align || kernel.is_real() {
        align_phase(&mut vector);
      }
      if kernel.is_real() {
        vector.mapv_inplace(|v| Complex64::new(v.re, 0.0));
      }
      EigenMode { eigenvalue, vector }
    })
    .collect::<Vec<_>>();

  if clipped > 0 {
    warn!(
      clipped,
      smallest,
      largest,
      "clipped negative eigenvalues within tolerance"
    );
  }
  debug!(
    modes = modes.len(),
    largest,
    smallest,
    "kernel eigen-decomposition"
  );

  Ok(EigenDecomposition {
    modes,
    largest,
    clipped,
  })
}

/// Rotates `u` so its reference component is real and non-negative.
fn align_phase(u: &mut Array1<Complex64>) {
  let max = u.iter().map(|v| v.norm()).fold(0.0, f64::max);
  if max == 0.0 {
    return;
  }
  let reference = if u[0].norm() > 1e-8 * max {
    u[0]
  } else {
    u.iter().copied().fold(Complex64::new(0.0, 0.0), |acc, v| {
      if v.norm() > acc.norm() {
        v
      } else {
        acc
      }
    })
  };
  let phase = reference.conj() / reference.norm();
  u.mapv_inplace(|v| v * phase);
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;

  use super::*;
  use crate::correlation::ExponentialCorrelation;
  use crate::correlation::GaussianCorrelation;
  use crate::quadrature::IntegrationGrid;
  use crate::quadrature::QuadratureRule;

  fn kernel_for<A: Autocorrelation>(alpha: &A, rule: QuadratureRule, n: usize) -> KernelMatrix<'_, A> {
    let grid = IntegrationGrid::new(rule, 4.0, rule.admissible_points(n)).unwrap();
    KernelMatrix::discretize(alpha, grid, 1e-10).unwrap()
  }

  fn weighted_gram(kernel: &KernelMatrix<'_, impl Autocorrelation>, modes: &[EigenMode]) -> DMatrix<Complex64> {
    let w = &kernel.grid().weights;
    DMatrix::from_fn(modes.len(), modes.len(), |a, b| {
      modes[a]
        .vector
        .iter()
        .zip(modes[b].vector.iter())
        .zip(w.iter())
        .map(|((x, y), &wi)| x.conj() * y * wi)
        .sum()
    })
  }

  #[test]
  fn eigenvectors_are_weighted_orthonormal() {
    let alpha = ExponentialCorrelation::new(1.0, 0.8, 1.5);
    let kernel = kernel_for(&alpha, QuadratureRule::Simpson, 41);
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-8, true).unwrap();
    assert_eq!(dec.modes.len(), 41);
    let g = weighted_gram(&kernel, &dec.modes[..10]);
    for a in 0..10 {
      for b in 0..10 {
        let expected = if a == b { 1.0 } else { 0.0 };
        assert_abs_diff_eq!((g[(a, b)] - expected).norm(), 0.0, epsilon = 1e-10);
      }
    }
  }

  #[test]
  fn eigenvalues_are_sorted_and_solve_the_weighted_problem() {
    let alpha = ExponentialCorrelation::default();
    let kernel = kernel_for(&alpha, QuadratureRule::Trapezoidal, 33);
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-8, true).unwrap();
    assert!(dec.modes.windows(2).all(|m| m[0].eigenvalue >= m[1].eigenvalue));

    let k = kernel.weighted();
    for mode in dec.modes.iter().take(5) {
      let u = DVector::from_iterator(mode.vector.len(), mode.vector.iter().copied());
      let residual = &k * &u - &u * Complex64::new(mode.eigenvalue, 0.0);
      assert!(residual.norm() < 1e-10 * dec.largest);
    }
  }

  #[test]
  fn alignment_makes_first_component_real_and_non_negative() {
    let alpha = ExponentialCorrelation::new(1.0, 1.0, 2.0);
    let kernel = kernel_for(&alpha, QuadratureRule::Trapezoidal, 21);
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-8, true).unwrap();
    for mode in dec.modes.iter().take(8) {
      assert!(mode.vector[0].re >= 0.0);
      assert_abs_diff_eq!(mode.vector[0].im, 0.0, epsilon = 1e-12);
    }
  }

  #[test]
  fn real_kernels_give_real_vectors() {
    let alpha = GaussianCorrelation::new(1.0, 1.0);
    let kernel = kernel_for(&alpha, QuadratureRule::Simpson, 25);
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-6, false).unwrap();
    assert!(dec.modes.iter().all(|m| m.vector.iter().all(|v| v.im == 0.0)));
  }

  #[test]
  fn indefinite_kernel_is_rejected() {
    let alpha = |tau: f64| Complex64::new(1.0 - tau * tau, 0.0);
    let grid = IntegrationGrid::new(QuadratureRule::Trapezoidal, 3.0, 31).unwrap();
    let kernel = KernelMatrix::discretize(&alpha, grid, 1e-10).unwrap();
    let err = decompose(&kernel, &DenseEigenSolver, 1e-6, true).unwrap_err();
    match err {
      StocProcError::NonPositiveSemiDefinite { eigenvalue, largest } => {
        assert!(eigenvalue < 0.0);
        assert!(largest > 0.0);
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn rounding_level_negative_eigenvalues_are_clipped() {
    // rank one kernel: all but one eigenvalue are rounding noise around zero
    let alpha = |_tau: f64| Complex64::new(1.0, 0.0);
    let grid = IntegrationGrid::new(QuadratureRule::Trapezoidal, 1.0, 16).unwrap();
    let kernel = KernelMatrix::discretize(&alpha, grid, 1e-10).unwrap();
    let dec = decompose(&kernel, &DenseEigenSolver, 1e-8, true).unwrap();
    assert_relative_eq!(dec.largest, 1.0, max_relative = 1e-12);
    assert!(dec.modes.iter().all(|m| m.eigenvalue >= 0.0));
    assert!(dec.modes[1..].iter().all(|m| m.eigenvalue < 1e-12));
  }

  #[test]
  fn subspace_iteration_matches_dense_leading_modes() {
    let alpha = ExponentialCorrelation::new(1.0, 0.5, 1.0);
    let kernel = kernel_for(&alpha, QuadratureRule::Simpson, 101);
    let dense = decompose(&kernel, &DenseEigenSolver, 1e-8, true).unwrap();
    let solver = SubspaceIteration {
      num_modes: 6,
      oversampling: 10,
      max_iterations: 2000,
      tolerance: 1e-11,
      seed: 7,
    };
    let sub = decompose(&kernel, &solver, 1e-8, true).unwrap();
    assert_eq!(sub.modes.len(), 6);
    for (d, s) in dense.modes.iter().zip(sub.modes.iter()) {
      assert_relative_eq!(d.eigenvalue, s.eigenvalue, max_relative = 1e-8);
      let diff = d
        .vector
        .iter()
        .zip(s.vector.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
      assert!(diff < 1e-5, "eigenvector mismatch {diff}");
    }
  }

  #[test]
  fn subspace_iteration_requires_modes() {
    let m = DMatrix::<Complex64>::identity(4, 4);
    let solver = SubspaceIteration {
      num_modes: 0,
      ..Default::default()
    };
    assert!(solver.solve(&m).is_err());
  }
}

//! # Karhunen-Loève expansion
//!
//! $$
//! \int_0^T \alpha(t-s)\,u_k(s)\,ds=\lambda_k u_k(t),\qquad z(t)=\sum_{k<K}\sqrt{\lambda_k}\,X_k\,u_k(t)
//! $$
//!
//! The Fredholm equation is discretized with a quadrature rule, solved as a
//! Hermitian eigenproblem and truncated to the fewest modes that reproduce `α`
//! within the requested tolerance. Eigenfunctions are extended off-grid by
//! Nyström interpolation and stored as splines; the truncation is validated on
//! those splines, so the reported error is the error of the sampled model.
pub mod basis;
pub mod eigen;
pub mod kernel;
pub mod selector;

use std::time::Instant;

use num_complex::Complex64;
use tracing::debug;
use tracing::info;

use crate::error::Result;
use crate::error::StocProcError;
use crate::model::Diagnostics;
use crate::model::ExpansionMethod;
use crate::quadrature::IntegrationGrid;
use crate::quadrature::QuadratureRule;
use crate::sampler::check_coefficients;
use crate::sampler::Realization;
use crate::spline::CubicSpline;
use crate::traits::Autocorrelation;
use crate::traits::HermitianEigenSolver;
use crate::traits::Interpolant;
use crate::traits::ProcessModel;

pub use self::basis::ContinuousBasis;
pub use self::eigen::DenseEigenSolver;
pub use self::eigen::EigenMode;
pub use self::eigen::EigenSolverKind;
pub use self::eigen::SubspaceIteration;
pub use self::kernel::KernelMatrix;
pub use self::selector::TruncatedModeSet;
pub use self::selector::ValidationScheme;

/// Number of quadrature nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSize {
  /// Exactly this many nodes, rounded up to the next admissible size of the rule.
  Fixed(usize),
  /// Start at `initial` and double the number of intervals until the
  /// tolerance is met or `max` would be exceeded.
  Auto { initial: usize, max: usize },
}

impl Default for GridSize {
  fn default() -> Self {
    Self::Auto {
      initial: 33,
      max: 1025,
    }
  }
}

impl GridSize {
  /// Grid sizes tried in order.
  pub fn sizes(&self, rule: QuadratureRule) -> Result<Vec<usize>> {
    match *self {
      Self::Fixed(n) => Ok(vec![rule.admissible_points(n)]),
      Self::Auto { initial, max } => {
        let mut n = rule.admissible_points(initial);
        if n > max {
          return Err(StocProcError::invalid(
            "grid",
            format!("initial size {n} exceeds maximum {max}"),
          ));
        }
        let mut sizes = vec![n];
        loop {
          n = rule.admissible_points(2 * (n - 1) + 1);
          if n > max {
            break;
          }
          sizes.push(n);
        }
        Ok(sizes)
      }
    }
  }
}

/// Configuration of the Karhunen-Loève construction.
#[derive(Debug, Clone, Copy)]
pub struct KleConfig {
  /// Right end of the time interval `[0, t_max]`.
  pub t_max: f64,
  /// Target sup-norm error of the truncated kernel, relative to `|α(0)|`.
  pub tolerance: f64,
  pub grid: GridSize,
  pub quadrature: QuadratureRule,
  /// Cap on retained modes. `None` allows every positive eigenvalue.
  pub max_modes: Option<usize>,
  pub solver: EigenSolverKind,
  pub validation: ValidationScheme,
  /// Fine spline grid has `ng_fac · (N - 1) + 1` points.
  pub ng_fac: usize,
  /// Allowed `|α(-τ) - conj(α(τ))|` on the grid, relative to `|α(0)|`.
  pub hermitian_tol: f64,
  /// Allowed magnitude of negative eigenvalues, relative to the largest.
  pub negative_tol: f64,
  /// Allowed deviation of the spline Gram matrix from the identity.
  pub orthonormality_tol: f64,
  /// Rotate every eigenvector so `u_k(t_0)` is real and non-negative.
  pub align_eigenvectors: bool,
}

impl KleConfig {
  pub fn new(t_max: f64, tolerance: f64) -> Self {
    Self {
      t_max,
      tolerance,
      ..Default::default()
    }
  }

  fn validate(&self) -> Result<()> {
    if !(self.t_max.is_finite() && self.t_max > 0.0) {
      return Err(StocProcError::invalid(
        "t_max",
        format!("must be positive and finite, got {}", self.t_max),
      ));
    }
    if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
      return Err(StocProcError::invalid(
        "tolerance",
        format!("must be positive and finite, got {}", self.tolerance),
      ));
    }
    if self.ng_fac == 0 {
      return Err(StocProcError::invalid("ng_fac", "must be at least 1"));
    }
    if self.max_modes == Some(0) {
      return Err(StocProcError::invalid("max_modes", "must be at least 1"));
    }
    for (name, value) in [
      ("hermitian_tol", self.hermitian_tol),
      ("negative_tol", self.negative_tol),
      ("orthonormality_tol", self.orthonormality_tol),
    ] {
      if !(value.is_finite() && value >= 0.0) {
        return Err(StocProcError::invalid(
          name,
          format!("must be non-negative and finite, got {value}"),
        ));
      }
    }
    Ok(())
  }
}

impl Default for KleConfig {
  fn default() -> Self {
    Self {
      t_max: 1.0,
      tolerance: 1e-2,
      grid: GridSize::default(),
      quadrature: QuadratureRule::default(),
      max_modes: None,
      solver: EigenSolverKind::default(),
      validation: ValidationScheme::default(),
      ng_fac: 4,
      hermitian_tol: 1e-10,
      negative_tol: 1e-8,
      orthonormality_tol: 1e-2,
      align_eigenvectors: true,
    }
  }
}

/// Truncated Karhunen-Loève expansion with spline-interpolated eigenfunctions.
#[derive(Debug, Clone)]
pub struct KleModel {
  t_max: f64,
  eigenvalues: Vec<f64>,
  weights: Vec<f64>,
  basis: ContinuousBasis,
  is_real: bool,
  scale: f64,
  achieved_error: f64,
  tolerance: f64,
  errors: Vec<f64>,
  grid_points: usize,
  clipped: usize,
}

impl KleModel {
  /// Runs the full pipeline: discretize, decompose, select, interpolate.
  ///
  /// With [`GridSize::Auto`] a grid that misses the tolerance (or fails the
  /// orthonormality check) is refined; every other error aborts immediately.
  pub fn build<A: Autocorrelation + ?Sized>(alpha: &A, config: &KleConfig) -> Result<Self> {
    config.validate()?;
    let start = Instant::now();
    let solver = config.solver.solver();
    let mut last = None;

    for n in config.grid.sizes(config.quadrature)? {
      match Self::build_on_grid(alpha, config, solver.as_ref(), n) {
        Ok(model) => {
          info!(
            modes = model.num_modes(),
            grid_points = n,
            achieved = model.achieved_error,
            tolerance = config.tolerance,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Karhunen-Loève expansion built"
          );
          return Ok(model);
        }
        Err(err) if err.is_recoverable() => {
          debug!(grid_points = n, %err, "grid too coarse");
          last = Some(err);
        }
        Err(err) => return Err(err),
      }
    }

    Err(last.unwrap_or_else(|| StocProcError::invalid("grid", "no admissible grid size")))
  }

  fn build_on_grid<A: Autocorrelation + ?Sized>(
    alpha: &A,
    config: &KleConfig,
    solver: &dyn HermitianEigenSolver,
    n: usize,
  ) -> Result<Self> {
    let stage = Instant::now();
    let grid = IntegrationGrid::new(config.quadrature, config.t_max, n)?;
    let kernel = KernelMatrix::discretize(alpha, grid, config.hermitian_tol)?;
    debug!(elapsed_ms = stage.elapsed().as_millis() as u64, "discretize");

    let stage = Instant::now();
    let decomposition = eigen::decompose(
      &kernel,
      solver,
      config.negative_tol,
      config.align_eigenvectors,
    )?;
    debug!(elapsed_ms = stage.elapsed().as_millis() as u64, "eigen-decomposition");

    let stage = Instant::now();
    let truncated = selector::select(
      &kernel,
      &decomposition,
      config.tolerance,
      config.max_modes,
      config.validation,
      config.ng_fac,
    )?;
    debug!(
      elapsed_ms = stage.elapsed().as_millis() as u64,
      modes = truncated.len(),
      fine_points = truncated.basis.fine_points(),
      "mode selection"
    );
    truncated
      .basis
      .check_orthonormality(&kernel, config.orthonormality_tol)?;

    let eigenvalues: Vec<f64> = truncated.modes.iter().map(|m| m.eigenvalue).collect();
    Ok(Self {
      t_max: config.t_max,
      weights: eigenvalues.iter().map(|l| l.sqrt()).collect(),
      eigenvalues,
      basis: truncated.basis,
      is_real: kernel.is_real(),
      scale: 1.0,
      achieved_error: truncated.achieved_error,
      tolerance: truncated.tolerance,
      errors: truncated.errors,
      grid_points: n,
      clipped: decomposition.clipped,
    })
  }

  /// Copy whose realizations are multiplied by `√scale`.
  pub fn scaled(&self, scale: f64) -> Result<Self> {
    if !(scale.is_finite() && scale > 0.0) {
      return Err(StocProcError::invalid(
        "scale",
        format!("must be positive and finite, got {scale}"),
      ));
    }
    let mut model = self.clone();
    model.scale = self.scale * scale;
    model.weights = self
      .eigenvalues
      .iter()
      .map(|l| (l * model.scale).sqrt())
      .collect();
    Ok(model)
  }

  /// Retained eigenvalues `λ_k`, descending and unscaled.
  pub fn eigenvalues(&self) -> &[f64] {
    &self.eigenvalues
  }

  pub fn basis(&self) -> &ContinuousBasis {
    &self.basis
  }
}

impl ProcessModel for KleModel {
  fn t_max(&self) -> f64 {
    self.t_max
  }

  fn num_modes(&self) -> usize {
    self.eigenvalues.len()
  }

  fn is_real(&self) -> bool {
    self.is_real
  }

  fn mode_weights(&self) -> &[f64] {
    &self.weights
  }

  fn eval_mode(&self, k: usize, t: f64) -> Complex64 {
    self.basis.mode(k).eval(t)
  }

  fn realize(&self, coefficients: &[Complex64]) -> Result<Realization> {
    check_coefficients(self.num_modes(), coefficients.len())?;
    let splines: Vec<&CubicSpline> = self.basis.splines().iter().collect();
    let weighted: Vec<Complex64> = coefficients
      .iter()
      .zip(self.weights.iter())
      .map(|(&x, &w)| x * w)
      .collect();
    let combined = CubicSpline::linear_combination(&splines, &weighted)?;
    Ok(Realization::new(combined, self.t_max, coefficients.to_vec()))
  }

  fn diagnostics(&self) -> Diagnostics {
    Diagnostics {
      method: ExpansionMethod::KarhunenLoeve,
      num_modes: self.num_modes(),
      eigenvalues: self.eigenvalues.clone(),
      achieved_error: self.achieved_error,
      tolerance: self.tolerance,
      grid_points: self.grid_points,
      clipped: self.clipped,
      error_history: self.errors.clone(),
      scale: self.scale,
    }
  }
}

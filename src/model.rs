//! # Model
//!
//! $$
//! z(t)=\sum_k c_k X_k \phi_k(t),\qquad
//! \begin{cases}c_k=\sqrt{\lambda_k},\ \phi_k=u_k & \text{Karhunen-Loève}\\
//! c_k=\sqrt{J(\omega_k)\Delta\omega/\pi},\ \phi_k=e^{-i\omega_k t} & \text{Fourier}\end{cases}
//! $$
//!
use std::fmt;

use num_complex::Complex64;

use crate::error::Result;
use crate::fourier::FourierConfig;
use crate::fourier::FourierModel;
use crate::kle::KleConfig;
use crate::kle::KleModel;
use crate::sampler::Realization;
use crate::traits::Autocorrelation;
use crate::traits::ProcessModel;
use crate::traits::SpectralDensity;

/// Construction strategy.
#[derive(Debug, Clone, Copy)]
pub enum Method {
  KarhunenLoeve(KleConfig),
  Fourier(FourierConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMethod {
  KarhunenLoeve,
  Fourier,
}

impl fmt::Display for ExpansionMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::KarhunenLoeve => write!(f, "karhunen-loeve"),
      Self::Fourier => write!(f, "fourier"),
    }
  }
}

/// Read-only summary of a built model.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
  pub method: ExpansionMethod,
  pub num_modes: usize,
  /// Squared mode weights `c_k²`, descending, without the scale factor.
  pub eigenvalues: Vec<f64>,
  /// Sup-norm error of the reconstructed correlation, relative to `|α(0)|`.
  pub achieved_error: f64,
  pub tolerance: f64,
  /// Quadrature nodes (Karhunen-Loève) or frequency nodes (Fourier).
  pub grid_points: usize,
  /// Negative eigenvalues clipped to zero.
  pub clipped: usize,
  /// Error after each added mode. Empty for the Fourier path.
  pub error_history: Vec<f64>,
  pub scale: f64,
}

impl fmt::Display for Diagnostics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}: {} modes on {} grid points, error {:.3e} (tolerance {:.3e})",
      self.method, self.num_modes, self.grid_points, self.achieved_error, self.tolerance
    )?;
    if self.clipped > 0 {
      write!(f, ", {} eigenvalues clipped", self.clipped)?;
    }
    if self.scale != 1.0 {
      write!(f, ", scale {}", self.scale)?;
    }
    Ok(())
  }
}

/// A built stochastic process, immutable and cheap to share.
#[derive(Debug, Clone)]
pub enum StocProc {
  Kle(KleModel),
  Fourier(FourierModel),
}

impl StocProc {
  pub fn new_kle<A: Autocorrelation + ?Sized>(alpha: &A, config: KleConfig) -> Result<Self> {
    KleModel::build(alpha, &config).map(Self::Kle)
  }

  /// Fourier model from a spectral density.
  ///
  /// `reference` is the autocorrelation the discretization is validated
  /// against; without it the transform of `density` is integrated numerically.
  pub fn new_fourier<J: SpectralDensity + ?Sized>(
    density: &J,
    reference: Option<&dyn Autocorrelation>,
    config: FourierConfig,
  ) -> Result<Self> {
    FourierModel::build(density, reference, &config).map(Self::Fourier)
  }

  /// Builds with either method from a type that knows both `α` and `J`.
  pub fn build<C>(correlation: &C, method: Method) -> Result<Self>
  where
    C: Autocorrelation + SpectralDensity,
  {
    match method {
      Method::KarhunenLoeve(config) => Self::new_kle(correlation, config),
      Method::Fourier(config) => Self::new_fourier(
        correlation,
        Some(correlation as &dyn Autocorrelation),
        config,
      ),
    }
  }

  /// Copy whose realizations are multiplied by `√scale`.
  pub fn scaled(&self, scale: f64) -> Result<Self> {
    match self {
      Self::Kle(m) => m.scaled(scale).map(Self::Kle),
      Self::Fourier(m) => m.scaled(scale).map(Self::Fourier),
    }
  }

  pub fn method(&self) -> ExpansionMethod {
    match self {
      Self::Kle(_) => ExpansionMethod::KarhunenLoeve,
      Self::Fourier(_) => ExpansionMethod::Fourier,
    }
  }

  fn inner(&self) -> &dyn ProcessModel {
    match self {
      Self::Kle(m) => m,
      Self::Fourier(m) => m,
    }
  }
}

impl ProcessModel for StocProc {
  fn t_max(&self) -> f64 {
    self.inner().t_max()
  }

  fn num_modes(&self) -> usize {
    self.inner().num_modes()
  }

  fn is_real(&self) -> bool {
    self.inner().is_real()
  }

  fn mode_weights(&self) -> &[f64] {
    self.inner().mode_weights()
  }

  fn eval_mode(&self, k: usize, t: f64) -> Complex64 {
    self.inner().eval_mode(k, t)
  }

  fn realize(&self, coefficients: &[Complex64]) -> Result<Realization> {
    self.inner().realize(coefficients)
  }

  fn diagnostics(&self) -> Diagnostics {
    self.inner().diagnostics()
  }

  fn evaluate(&self, coefficients: &[Complex64], times: &[f64]) -> Result<ndarray::Array1<Complex64>> {
    self.inner().evaluate(coefficients, times)
  }
}

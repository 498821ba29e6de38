//! # Fourier
//!
//! $$
//! \alpha(\tau)=\frac{1}{\pi}\int J(\omega)e^{-i\omega\tau}d\omega\approx\sum_{k<N}c_k^2e^{-i\omega_k\tau},\qquad
//! c_k=\sqrt{w_k J(\omega_k)/\pi}
//! $$
//!
//! Equidistant midpoint nodes `ω_k = a + (k + ½)Δω` with `N Δω Δt = 2π` turn the
//! mode sum on the grid `t_l = l Δt` into a single FFT:
//! `z(t_l) = e^{-i(a + Δω/2) t_l} Σ_k c_k X_k e^{-2πi kl/N}`.
//! Tanh-sinh nodes cluster at the band edges and need far fewer modes for
//! densities with endpoint singularities; their paths are summed directly.
use std::f64::consts::FRAC_PI_2;
use std::f64::consts::PI;
use std::time::Instant;

use gauss_quad::GaussLegendre;
use ndarray::Array1;
use ndrustfft::ndfft;
use ndrustfft::FftHandler;
use num_complex::Complex64;
use rayon::prelude::*;
use roots::find_root_brent;
use roots::SimpleConvergency;
use tracing::debug;
use tracing::info;

use crate::error::Result;
use crate::error::StocProcError;
use crate::model::Diagnostics;
use crate::model::ExpansionMethod;
use crate::sampler::check_coefficients;
use crate::sampler::Realization;
use crate::spline::CubicSpline;
use crate::traits::Autocorrelation;
use crate::traits::Interpolant;
use crate::traits::ProcessModel;
use crate::traits::SpectralDensity;

/// Bandwidth widenings tried when refining the nodes stops helping.
const MAX_WIDENINGS: usize = 10;
const INITIAL_NODES: usize = 32;
/// Step halvings tried per bandwidth on the tanh-sinh grid.
const MAX_HALVINGS: usize = 12;
/// Largest `kh` of a tanh-sinh node; beyond it the weights underflow.
const TANH_SINH_EXTENT: f64 = 5.0;

/// Frequency discretization of the Fourier integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyGrid {
  /// Midpoint nodes on a power-of-two grid, realizations by FFT.
  #[default]
  Equidistant,
  /// Tanh-sinh nodes, realizations by direct summation on the time grid.
  TanhSinh,
}

/// Configuration of the Fourier construction.
#[derive(Debug, Clone, Copy)]
pub struct FourierConfig {
  pub t_max: f64,
  /// Sup-norm error of the discrete frequency sum against `α` on `[0, t_max]`,
  /// relative to `|α(0)|`.
  pub integration_tol: f64,
  /// Sup-norm error of spline interpolation of `α` at half steps, relative to `|α(0)|`.
  pub interpolation_tol: f64,
  /// Integrate over `ω < 0` as well. Required whenever `J` has mass there.
  pub negative_frequencies: bool,
  pub frequency_grid: FrequencyGrid,
  /// Upper limit on frequency nodes.
  pub max_nodes: usize,
  /// Number of `τ` points in `[0, t_max]` used for validation.
  pub validation_points: usize,
}

impl FourierConfig {
  pub fn new(t_max: f64, tolerance: f64) -> Self {
    Self {
      t_max,
      integration_tol: tolerance,
      interpolation_tol: tolerance,
      ..Default::default()
    }
  }

  fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("t_max", self.t_max),
      ("integration_tol", self.integration_tol),
      ("interpolation_tol", self.interpolation_tol),
    ] {
      if !(value.is_finite() && value > 0.0) {
        return Err(StocProcError::invalid(
          name,
          format!("must be positive and finite, got {value}"),
        ));
      }
    }
    if self.max_nodes < INITIAL_NODES {
      return Err(StocProcError::invalid(
        "max_nodes",
        format!("must be at least {INITIAL_NODES}"),
      ));
    }
    if self.validation_points < 2 {
      return Err(StocProcError::invalid("validation_points", "must be at least 2"));
    }
    Ok(())
  }
}

impl Default for FourierConfig {
  fn default() -> Self {
    Self {
      t_max: 1.0,
      integration_tol: 1e-2,
      interpolation_tol: 1e-2,
      negative_frequencies: false,
      frequency_grid: FrequencyGrid::default(),
      max_nodes: 1 << 22,
      validation_points: 256,
    }
  }
}

#[derive(Debug, Clone)]
enum FrequencyNodes {
  Equidistant { omega_min: f64, d_omega: f64 },
  Explicit(Vec<f64>),
}

/// Discrete frequency expansion of a spectral density.
#[derive(Debug, Clone)]
pub struct FourierModel {
  t_max: f64,
  nodes: FrequencyNodes,
  dt: f64,
  time_points: usize,
  /// `c_k²`, frequency order.
  densities: Vec<f64>,
  weights: Vec<f64>,
  scale: f64,
  achieved_error: f64,
  tolerance: f64,
}

impl FourierModel {
  pub fn build<J: SpectralDensity + ?Sized>(
    density: &J,
    reference: Option<&dyn Autocorrelation>,
    config: &FourierConfig,
  ) -> Result<Self> {
    config.validate()?;
    let start = Instant::now();
    let (peak_x, peak) = find_peak(density, config.negative_frequencies)?;

    let numeric;
    let reference: &dyn Autocorrelation = match reference {
      Some(r) => r,
      None => {
        numeric = NumericTransform::new(density, peak_x, peak, config)?;
        &numeric
      }
    };
    let alpha0 = reference.eval(0.0).norm();
    if !(alpha0.is_finite() && alpha0 > 0.0) {
      return Err(StocProcError::InvalidKernel {
        reason: "α(0) must be finite and non-zero",
        deviation: alpha0,
        tolerance: 0.0,
      });
    }
    let target = Target::new(reference, config.t_max, config.validation_points, alpha0);
    let dt_max = interpolation_step(reference, config, alpha0)?;

    let model = match config.frequency_grid {
      FrequencyGrid::Equidistant => {
        Self::equidistant(density, peak_x, peak, &target, dt_max, config)?
      }
      FrequencyGrid::TanhSinh => Self::tanh_sinh(density, peak_x, peak, &target, dt_max, config)?,
    };

    info!(
      grid = ?config.frequency_grid,
      nodes = model.num_modes(),
      dt = model.dt,
      achieved = model.achieved_error,
      elapsed_ms = start.elapsed().as_millis() as u64,
      "Fourier expansion built"
    );
    Ok(model)
  }

  fn equidistant<J: SpectralDensity + ?Sized>(
    density: &J,
    peak_x: f64,
    peak: f64,
    target: &Target,
    dt_max: f64,
    config: &FourierConfig,
  ) -> Result<Self> {
    let (a, b, nodes, interval_error) = integration_interval(density, peak_x, peak, target, config)?;

    // N Δω Δt = 2π
    let (mut a, mut b) = (a, b);
    let d_omega_required = (b - a) / nodes as f64;
    if 2.0 * PI / (b - a) > dt_max {
      let width = 2.0 * PI / dt_max;
      if config.negative_frequencies {
        let center = 0.5 * (a + b);
        a = center - 0.5 * width;
        b = center + 0.5 * width;
      } else {
        b = a + width;
      }
    }
    let width = b - a;
    let dt = 2.0 * PI / width;
    let time_points = (config.t_max / dt).ceil() as usize + 1;
    let n = time_points
      .max((width / d_omega_required).ceil() as usize)
      .next_power_of_two();
    if n > config.max_nodes {
      return Err(StocProcError::ToleranceNotAchieved {
        achieved: interval_error,
        target: config.integration_tol,
        num_modes: n,
        grid_points: n,
      });
    }
    let d_omega = width / n as f64;
    let densities = node_densities(density, a, d_omega, n)?;
    let achieved = target.error(a, d_omega, &densities);
    if achieved > config.integration_tol {
      return Err(StocProcError::ToleranceNotAchieved {
        achieved,
        target: config.integration_tol,
        num_modes: n,
        grid_points: n,
      });
    }
    debug!(nodes = n, omega_min = a, omega_max = b, "equidistant frequency grid");

    Ok(Self::from_parts(
      config,
      FrequencyNodes::Equidistant {
        omega_min: a,
        d_omega,
      },
      dt,
      time_points,
      densities,
      achieved,
    ))
  }

  fn tanh_sinh<J: SpectralDensity + ?Sized>(
    density: &J,
    peak_x: f64,
    peak: f64,
    target: &Target,
    dt_max: f64,
    config: &FourierConfig,
  ) -> Result<Self> {
    let (frequencies, densities, achieved) = tanh_sinh_nodes(density, peak_x, peak, target, config)?;
    let time_points = (config.t_max / dt_max).ceil() as usize + 1;
    let dt = config.t_max / (time_points - 1) as f64;
    Ok(Self::from_parts(
      config,
      FrequencyNodes::Explicit(frequencies),
      dt,
      time_points,
      densities,
      achieved,
    ))
  }

  fn from_parts(
    config: &FourierConfig,
    nodes: FrequencyNodes,
    dt: f64,
    time_points: usize,
    densities: Vec<f64>,
    achieved: f64,
  ) -> Self {
    Self {
      t_max: config.t_max,
      nodes,
      dt,
      time_points,
      weights: densities.iter().map(|c| c.sqrt()).collect(),
      densities,
      scale: 1.0,
      achieved_error: achieved,
      tolerance: config.integration_tol,
    }
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
      .densities
      .iter()
      .map(|c| (c * model.scale).sqrt())
      .collect();
    Ok(model)
  }

  pub fn frequency(&self, k: usize) -> f64 {
    match &self.nodes {
      FrequencyNodes::Equidistant { omega_min, d_omega } => omega_min + (k as f64 + 0.5) * d_omega,
      FrequencyNodes::Explicit(omega) => omega[k],
    }
  }

  pub fn frequency_grid(&self) -> FrequencyGrid {
    match self.nodes {
      FrequencyNodes::Equidistant { .. } => FrequencyGrid::Equidistant,
      FrequencyNodes::Explicit(_) => FrequencyGrid::TanhSinh,
    }
  }

  /// Node spacing of an equidistant grid.
  pub fn d_omega(&self) -> Option<f64> {
    match self.nodes {
      FrequencyNodes::Equidistant { d_omega, .. } => Some(d_omega),
      FrequencyNodes::Explicit(_) => None,
    }
  }

  /// Step of the native time grid.
  pub fn dt(&self) -> f64 {
    self.dt
  }

  /// Path values on the native grid `t_l = l Δt`, `l < time_points`, by one FFT.
  ///
  /// Only defined for [`FrequencyGrid::Equidistant`].
  pub fn fft_path(&self, coefficients: &[Complex64]) -> Result<Array1<Complex64>> {
    check_coefficients(self.num_modes(), coefficients.len())?;
    let FrequencyNodes::Equidistant { omega_min, d_omega } = self.nodes else {
      return Err(StocProcError::invalid(
        "frequency_grid",
        "FFT paths need equidistant frequencies",
      ));
    };
    let n = self.num_modes();
    let input: Array1<Complex64> = coefficients
      .iter()
      .zip(self.weights.iter())
      .map(|(&x, &c)| x * c)
      .collect();
    let mut output = Array1::<Complex64>::zeros(n);
    let fft = FftHandler::<f64>::new(n);
    ndfft(&input, &mut output, &fft, 0);

    let shift = omega_min + 0.5 * d_omega;
    Ok(
      (0..self.time_points)
        .map(|l| {
          let t = l as f64 * self.dt;
          output[l] * Complex64::new(0.0, -shift * t).exp()
        })
        .collect(),
    )
  }

  /// Path values on the native time grid: FFT for equidistant nodes, direct sum otherwise.
  pub fn grid_path(&self, coefficients: &[Complex64]) -> Result<Array1<Complex64>> {
    match &self.nodes {
      FrequencyNodes::Equidistant { .. } => self.fft_path(coefficients),
      FrequencyNodes::Explicit(omega) => {
        check_coefficients(self.num_modes(), coefficients.len())?;
        let amplitudes: Vec<Complex64> = coefficients
          .iter()
          .zip(self.weights.iter())
          .map(|(&x, &c)| x * c)
          .collect();
        let path: Vec<Complex64> = (0..self.time_points)
          .into_par_iter()
          .map(|l| {
            let t = l as f64 * self.dt;
            omega
              .iter()
              .zip(amplitudes.iter())
              .map(|(&w, &c)| c * Complex64::new(0.0, -w * t).exp())
              .sum()
          })
          .collect();
        Ok(path.into())
      }
    }
  }
}

impl ProcessModel for FourierModel {
  fn t_max(&self) -> f64 {
    self.t_max
  }

  fn num_modes(&self) -> usize {
    self.densities.len()
  }

  fn is_real(&self) -> bool {
    false
  }

  fn mode_weights(&self) -> &[f64] {
    &self.weights
  }

  fn eval_mode(&self, k: usize, t: f64) -> Complex64 {
    Complex64::new(0.0, -self.frequency(k) * t).exp()
  }

  fn realize(&self, coefficients: &[Complex64]) -> Result<Realization> {
    let path = self.grid_path(coefficients)?;
    let t_end = (self.time_points - 1) as f64 * self.dt;
    let spline = CubicSpline::fit(0.0, t_end, path.view())?;
    Ok(Realization::new(spline, self.t_max, coefficients.to_vec()))
  }

  fn diagnostics(&self) -> Diagnostics {
    let mut eigenvalues = self.densities.clone();
    eigenvalues.sort_by(|a, b| b.total_cmp(a));
    Diagnostics {
      method: ExpansionMethod::Fourier,
      num_modes: self.num_modes(),
      eigenvalues,
      achieved_error: self.achieved_error,
      tolerance: self.tolerance,
      grid_points: self.num_modes(),
      clipped: 0,
      error_history: Vec::new(),
      scale: self.scale,
    }
  }
}

/// Reference values of `α` on the validation points.
struct Target {
  taus: Vec<f64>,
  values: Vec<Complex64>,
  alpha0: f64,
}

impl Target {
  fn new(reference: &dyn Autocorrelation, t_max: f64, points: usize, alpha0: f64) -> Self {
    let taus = Array1::linspace(0.0, t_max, points).to_vec();
    let values = taus.par_iter().map(|&t| reference.eval(t)).collect();
    Self {
      taus,
      values,
      alpha0,
    }
  }

  /// `sup_τ |Σ_k c_k² e^{-iω_k τ} - α(τ)| / |α(0)|`
  fn error(&self, a: f64, d_omega: f64, densities: &[f64]) -> f64 {
    let first = a + 0.5 * d_omega;
    self
      .taus
      .par_iter()
      .zip(self.values.par_iter())
      .map(|(&tau, &exact)| {
        let step = Complex64::new(0.0, -d_omega * tau).exp();
        let mut phase = Complex64::new(0.0, -first * tau).exp();
        let mut sum = Complex64::new(0.0, 0.0);
        for &c in densities {
          sum += phase * c;
          phase *= step;
        }
        (sum - exact).norm()
      })
      .reduce(|| 0.0, f64::max)
      / self.alpha0
  }

  /// Same as [`Target::error`] for arbitrary node positions.
  fn error_at(&self, frequencies: &[f64], densities: &[f64]) -> f64 {
    self
      .taus
      .par_iter()
      .zip(self.values.par_iter())
      .map(|(&tau, &exact)| {
        let sum: Complex64 = frequencies
          .iter()
          .zip(densities.iter())
          .map(|(&w, &c)| Complex64::new(0.0, -w * tau).exp() * c)
          .sum();
        (sum - exact).norm()
      })
      .reduce(|| 0.0, f64::max)
      / self.alpha0
  }
}

/// `c_k² = J(ω_k) Δω / π` on the midpoint grid.
fn node_densities<J: SpectralDensity + ?Sized>(
  density: &J,
  a: f64,
  d_omega: f64,
  n: usize,
) -> Result<Vec<f64>> {
  (0..n)
    .map(|k| {
      let omega = a + (k as f64 + 0.5) * d_omega;
      let j = density.eval(omega);
      if !(j.is_finite() && j >= 0.0) {
        return Err(StocProcError::invalid(
          "spectral_density",
          format!("J({omega}) = {j} is not a finite non-negative number"),
        ));
      }
      Ok(j * d_omega / PI)
    })
    .collect()
}

/// Location and value of the maximum of `J`, sampled on a logarithmic grid.
fn find_peak<J: SpectralDensity + ?Sized>(density: &J, negative: bool) -> Result<(f64, f64)> {
  let mut samples = vec![0.0];
  for k in -48..=48 {
    let x = 10f64.powf(k as f64 / 8.0);
    samples.push(x);
    if negative {
      samples.push(-x);
    }
  }

  let mut best = (0.0, f64::NEG_INFINITY);
  for x in samples {
    let j = density.eval(x);
    if j.is_nan() || j < 0.0 {
      return Err(StocProcError::invalid(
        "spectral_density",
        format!("J({x}) = {j} is not non-negative"),
      ));
    }
    if j > best.1 {
      best = (x, j);
    }
  }
  if !(best.1.is_finite() && best.1 > 0.0) {
    return Err(StocProcError::invalid(
      "spectral_density",
      "no finite positive value found",
    ));
  }
  Ok(best)
}

/// First `ω` beyond the peak, in `direction`, with `J(ω) = threshold · J_peak`.
fn boundary<J: SpectralDensity + ?Sized>(
  density: &J,
  peak_x: f64,
  peak: f64,
  threshold: f64,
  direction: f64,
) -> Result<f64> {
  let level = threshold * peak;
  let f = |w: f64| density.eval(w) - level;

  let mut step = (0.1 * peak_x.abs()).max(1e-3);
  let mut inner = peak_x;
  let mut outer = peak_x + direction * step;
  while f(outer) > 0.0 {
    inner = outer;
    step *= 2.0;
    outer = peak_x + direction * step;
    if step > 1e15 {
      return Err(StocProcError::Numerical {
        reason: format!("spectral density does not decay below {level:.3e}"),
      });
    }
  }

  let mut convergency = SimpleConvergency {
    eps: 1e-12 * step.max(1.0),
    max_iter: 100,
  };
  Ok(find_root_brent(inner, outer, f, &mut convergency).unwrap_or(outer))
}

/// Integration interval and node count meeting `integration_tol`.
fn integration_interval<J: SpectralDensity + ?Sized>(
  density: &J,
  peak_x: f64,
  peak: f64,
  target: &Target,
  config: &FourierConfig,
) -> Result<(f64, f64, usize, f64)> {
  let tol = config.integration_tol;
  let mut threshold = 0.25 * tol;
  let mut best = (f64::INFINITY, 0);

  for _ in 0..MAX_WIDENINGS {
    let b = boundary(density, peak_x, peak, threshold, 1.0)?;
    let a = if config.negative_frequencies {
      boundary(density, peak_x, peak, threshold, -1.0)?
    } else {
      0.0
    };

    let mut n = INITIAL_NODES;
    let mut previous = f64::INFINITY;
    loop {
      let d_omega = (b - a) / n as f64;
      let err = target.error(a, d_omega, &node_densities(density, a, d_omega, n)?);
      debug!(omega_min = a, omega_max = b, nodes = n, err, "frequency discretization");
      if err < best.0 {
        best = (err, n);
      }
      if err <= tol {
        return Ok((a, b, n, err));
      }
      // aliasing is resolved once the period 2π/Δω spans the interval twice,
      // beyond that a stalled error means the bandwidth is too narrow
      let resolved = 2.0 * PI / d_omega > 2.0 * config.t_max;
      if 2 * n > config.max_nodes || (resolved && err > 0.5 * previous) {
        break;
      }
      previous = err;
      n *= 2;
    }
    threshold *= 0.1;
  }

  Err(StocProcError::ToleranceNotAchieved {
    achieved: best.0,
    target: tol,
    num_modes: best.1,
    grid_points: best.1,
  })
}

/// Tanh-sinh rule on `[a, b]` with step `h`, weighted by `J / π`.
///
/// Nodes `a + half·y_k` and `b - half·y_k` with `y_k = 1 / (e^u cosh u)`,
/// `u = π/2 sinh(kh)`, so both ends are resolved without cancellation.
/// Terms past `kh = 1` are dropped once both ends fall below `cutoff`.
fn tanh_sinh_rule<J: SpectralDensity + ?Sized>(
  density: &J,
  a: f64,
  b: f64,
  h: f64,
  cutoff: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
  let half = 0.5 * (b - a);
  let term = |omega: f64, weight: f64| -> Result<f64> {
    let j = density.eval(omega);
    if !(j.is_finite() && j >= 0.0) {
      return Err(StocProcError::invalid(
        "spectral_density",
        format!("J({omega}) = {j} is not a finite non-negative number"),
      ));
    }
    Ok(j * weight / PI)
  };

  let mut frequencies = vec![a + half];
  let mut densities = vec![term(a + half, half * h * FRAC_PI_2)?];
  let k_min = (1.0 / h).ceil() as usize;
  let mut k = 1;
  while k as f64 * h <= TANH_SINH_EXTENT {
    let kh = k as f64 * h;
    let u = FRAC_PI_2 * kh.sinh();
    let y = 1.0 / (u.exp() * u.cosh());
    let weight = half * h * FRAC_PI_2 * kh.cosh() / u.cosh().powi(2);
    let mut largest = 0.0_f64;
    for omega in [a + half * y, b - half * y] {
      let c = term(omega, weight)?;
      if c > 0.0 {
        frequencies.push(omega);
        densities.push(c);
      }
      largest = largest.max(c);
    }
    if k >= k_min && largest < cutoff {
      break;
    }
    k += 1;
  }
  Ok((frequencies, densities))
}

/// Tanh-sinh nodes meeting `integration_tol`: halves the step until the
/// error stalls, then widens the band by half its width.
fn tanh_sinh_nodes<J: SpectralDensity + ?Sized>(
  density: &J,
  peak_x: f64,
  peak: f64,
  target: &Target,
  config: &FourierConfig,
) -> Result<(Vec<f64>, Vec<f64>, f64)> {
  let tol = config.integration_tol;
  let threshold = 0.25 * tol;
  let cutoff = 1e-3 * tol * target.alpha0;
  let mut b = boundary(density, peak_x, peak, threshold, 1.0)?;
  let mut a = if config.negative_frequencies {
    boundary(density, peak_x, peak, threshold, -1.0)?
  } else {
    0.0
  };
  let mut best = (f64::INFINITY, 0);

  for _ in 0..MAX_WIDENINGS {
    let half = 0.5 * (b - a);
    let mut h = 0.5;
    let mut previous = f64::INFINITY;
    for _ in 0..MAX_HALVINGS {
      let (frequencies, densities) = tanh_sinh_rule(density, a, b, h, cutoff)?;
      let n = frequencies.len();
      if n > config.max_nodes {
        break;
      }
      let err = target.error_at(&frequencies, &densities);
      debug!(omega_min = a, omega_max = b, h, nodes = n, err, "tanh-sinh discretization");
      if err < best.0 {
        best = (err, n);
      }
      if err <= tol {
        return Ok((frequencies, densities, err));
      }
      // node spacing at the center bounds the resolvable times
      let resolved = 2.0 / (half * h) > 2.0 * config.t_max;
      if resolved && err > 0.5 * previous {
        break;
      }
      previous = err;
      h *= 0.5;
    }

    let width = b - a;
    if config.negative_frequencies {
      let center = 0.5 * (a + b);
      a = center - 0.75 * width;
      b = center + 0.75 * width;
    } else {
      b = a + 1.5 * width;
    }
  }

  Err(StocProcError::ToleranceNotAchieved {
    achieved: best.0,
    target: tol,
    num_modes: best.1,
    grid_points: best.1,
  })
}

/// Largest time step whose cubic spline reproduces `α` at half steps within `interpolation_tol`.
fn interpolation_step(reference: &dyn Autocorrelation, config: &FourierConfig, alpha0: f64) -> Result<f64> {
  let t_max = config.t_max;
  let mut intervals = INITIAL_NODES;
  loop {
    let dt = t_max / intervals as f64;
    let knots: Array1<Complex64> = (0..=intervals)
      .into_par_iter()
      .map(|i| reference.eval(i as f64 * dt))
      .collect::<Vec<_>>()
      .into();
    let spline = CubicSpline::fit(0.0, t_max, knots.view())?;
    let err = (0..intervals)
      .into_par_iter()
      .map(|i| {
        let t = (i as f64 + 0.5) * dt;
        (spline.eval(t) - reference.eval(t)).norm()
      })
      .reduce(|| 0.0, f64::max)
      / alpha0;
    debug!(dt, err, "interpolation step");
    if err <= config.interpolation_tol {
      return Ok(dt);
    }
    intervals *= 2;
    if intervals > config.max_nodes {
      return Err(StocProcError::ToleranceNotAchieved {
        achieved: err,
        target: config.interpolation_tol,
        num_modes: 0,
        grid_points: intervals / 2 + 1,
      });
    }
  }
}

/// `α(τ) = 1/π ∫_a^b J(ω) e^{-iωτ} dω` by panel-wise Gauss-Legendre quadrature.
struct NumericTransform<'a, J: ?Sized> {
  density: &'a J,
  a: f64,
  h: f64,
  panels: usize,
  quad: GaussLegendre,
}

impl<'a, J: SpectralDensity + ?Sized> NumericTransform<'a, J> {
  fn new(density: &'a J, peak_x: f64, peak: f64, config: &FourierConfig) -> Result<Self> {
    let threshold = 1e-3 * config.integration_tol;
    let b = boundary(density, peak_x, peak, threshold, 1.0)?;
    let a = if config.negative_frequencies {
      boundary(density, peak_x, peak, threshold, -1.0)?
    } else {
      0.0
    };
    // half an oscillation period of e^{-iωT} per panel
    let h_max = PI / config.t_max;
    let panels = (((b - a) / h_max).ceil() as usize).max(64);
    let quad = GaussLegendre::new(20).map_err(|e| StocProcError::Numerical {
      reason: format!("Gauss-Legendre rule: {e:?}"),
    })?;
    debug!(omega_min = a, omega_max = b, panels, "numeric reference transform");
    Ok(Self {
      density,
      a,
      h: (b - a) / panels as f64,
      panels,
      quad,
    })
  }
}

impl<J: SpectralDensity + ?Sized> Autocorrelation for NumericTransform<'_, J> {
  fn eval(&self, tau: f64) -> Complex64 {
    let mut acc = Complex64::new(0.0, 0.0);
    for p in 0..self.panels {
      let lo = self.a + p as f64 * self.h;
      let hi = lo + self.h;
      let re = self.quad.integrate(lo, hi, |w| self.density.eval(w) * (w * tau).cos());
      let im = self.quad.integrate(lo, hi, |w| -self.density.eval(w) * (w * tau).sin());
      acc += Complex64::new(re, im);
    }
    acc / PI
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::correlation::ExponentialCorrelation;
  use crate::correlation::GaussianCorrelation;
  use crate::correlation::OhmicCorrelation;

  fn correlation_error(model: &FourierModel, alpha: &dyn Autocorrelation, t_max: f64) -> f64 {
    let w = model.mode_weights();
    (0..=100)
      .map(|i| {
        let tau = t_max * i as f64 / 100.0;
        let sum: Complex64 = (0..model.num_modes())
          .map(|k| w[k] * w[k] * model.eval_mode(k, tau))
          .sum();
        (sum - alpha.eval(tau)).norm()
      })
      .fold(0.0, f64::max)
      / alpha.eval(0.0).norm()
  }

  #[test]
  #[traced_test]
  fn lorentzian_with_negative_frequencies() {
    let c = ExponentialCorrelation::new(1.0, 1.0, 0.5);
    let config = FourierConfig {
      negative_frequencies: true,
      ..FourierConfig::new(10.0, 1e-2)
    };
    let model = FourierModel::build(&c, Some(&c), &config).unwrap();
    assert_eq!(model.frequency_grid(), FrequencyGrid::Equidistant);
    assert!(model.num_modes().is_power_of_two());
    assert_relative_eq!(
      model.num_modes() as f64 * model.d_omega().unwrap() * model.dt(),
      2.0 * PI,
      max_relative = 1e-12
    );
    assert!(correlation_error(&model, &c, 10.0) <= 1e-2);
    assert!(logs_contain("Fourier expansion built"));
  }

  #[test]
  fn ohmic_density_without_reference() {
    let c = OhmicCorrelation::new(1.0, 1.0, 2.0);
    let config = FourierConfig::new(3.0, 1e-2);
    let model = FourierModel::build(&c, None, &config).unwrap();
    assert!(correlation_error(&model, &c, 3.0) <= 1.5e-2);
  }

  #[test]
  fn fft_path_matches_closed_form_sum() {
    let c = GaussianCorrelation::new(1.0, 0.5);
    let config = FourierConfig {
      negative_frequencies: true,
      ..FourierConfig::new(4.0, 1e-3)
    };
    let model = FourierModel::build(&c, Some(&c), &config).unwrap();
    let x: Vec<Complex64> = (0..model.num_modes())
      .map(|k| Complex64::new((0.37 * k as f64).cos(), (1.1 * k as f64).sin()))
      .collect();

    let grid = model.fft_path(&x).unwrap();
    let times: Vec<f64> = (0..grid.len())
      .map(|l| l as f64 * model.dt())
      .filter(|&t| t <= 4.0)
      .collect();
    let direct = model.evaluate(&x, &times).unwrap();
    let scale = direct.iter().map(|v| v.norm()).fold(0.0, f64::max);
    for (l, d) in direct.iter().enumerate() {
      assert!((grid[l] - d).norm() < 1e-9 * scale.max(1.0), "l={l}");
    }
  }

  /// Sup error on `T j / 500`, a subset of the 1001 validation points.
  fn tanh_sinh_error<C: Autocorrelation + SpectralDensity>(
    c: &C,
    negative: bool,
    t_max: f64,
    tol: f64,
  ) -> (FourierModel, f64) {
    let config = FourierConfig {
      negative_frequencies: negative,
      frequency_grid: FrequencyGrid::TanhSinh,
      validation_points: 1001,
      ..FourierConfig::new(t_max, tol)
    };
    let model = FourierModel::build(c, Some(c), &config).unwrap();
    let w = model.mode_weights();
    let err = (0..=500)
      .map(|i| {
        let tau = t_max * i as f64 / 500.0;
        let sum: Complex64 = (0..model.num_modes())
          .map(|k| w[k] * w[k] * model.eval_mode(k, tau))
          .sum();
        (sum - Autocorrelation::eval(c, tau)).norm()
      })
      .fold(0.0, f64::max)
      / Autocorrelation::eval(c, 0.0).norm();
    (model, err)
  }

  #[test]
  #[traced_test]
  fn tanh_sinh_grid_reproduces_ohmic_correlation() {
    // ω^{1/2} at the lower band edge
    let c = OhmicCorrelation::new(1.0, 0.5, 2.0);
    let (model, err) = tanh_sinh_error(&c, false, 3.0, 1e-2);
    assert_eq!(model.frequency_grid(), FrequencyGrid::TanhSinh);
    assert!(model.d_omega().is_none());
    assert!((0..model.num_modes()).all(|k| model.frequency(k) > 0.0));
    assert!(err <= 1e-2, "err={err}");
    assert!(logs_contain("tanh-sinh discretization"));
  }

  #[test]
  fn tanh_sinh_grid_reproduces_lorentzian_correlation() {
    let c = ExponentialCorrelation::new(1.0, 1.0, 0.5);
    let (model, err) = tanh_sinh_error(&c, true, 5.0, 1e-2);
    assert!((0..model.num_modes()).any(|k| model.frequency(k) < 0.0));
    assert!(err <= 1e-2, "err={err}");
    assert!(model.diagnostics().achieved_error <= 1e-2);
  }

  #[test]
  fn tanh_sinh_paths_are_direct_sums() {
    let c = OhmicCorrelation::new(1.0, 1.0, 2.0);
    let config = FourierConfig {
      frequency_grid: FrequencyGrid::TanhSinh,
      ..FourierConfig::new(2.0, 1e-2)
    };
    let model = FourierModel::build(&c, Some(&c), &config).unwrap();
    let x: Vec<Complex64> = (0..model.num_modes())
      .map(|k| Complex64::new((0.61 * k as f64).sin(), (0.23 * k as f64).cos()))
      .collect();
    assert!(matches!(
      model.fft_path(&x),
      Err(StocProcError::InvalidParameter { .. })
    ));

    let grid = model.grid_path(&x).unwrap();
    let times: Vec<f64> = (0..grid.len())
      .map(|l| (l as f64 * model.dt()).min(2.0))
      .collect();
    let direct = model.evaluate(&x, &times).unwrap();
    for (l, d) in direct.iter().enumerate() {
      assert!((grid[l] - d).norm() < 1e-9 * d.norm().max(1.0), "l={l}");
    }

    let path = model.realize(&x).unwrap();
    for (l, &t) in times.iter().enumerate() {
      assert!((path.at(t).unwrap() - grid[l]).norm() < 1e-9 * grid[l].norm().max(1.0));
    }
  }

  #[test]
  fn missing_negative_frequencies_are_detected() {
    // half of the Lorentzian mass sits below zero
    let c = ExponentialCorrelation::new(1.0, 1.0, 0.0);
    let config = FourierConfig {
      max_nodes: 1 << 14,
      ..FourierConfig::new(2.0, 1e-2)
    };
    assert!(matches!(
      FourierModel::build(&c, Some(&c), &config),
      Err(StocProcError::ToleranceNotAchieved { .. })
    ));
  }

  #[test]
  fn invalid_densities_are_rejected() {
    let config = FourierConfig::new(1.0, 1e-2);
    let zero = |_w: f64| 0.0;
    assert!(matches!(
      FourierModel::build(&zero, None, &config),
      Err(StocProcError::InvalidParameter { .. })
    ));
    let negative = |w: f64| -(-w * w).exp();
    assert!(FourierModel::build(&negative, None, &config).is_err());
    assert!(FourierModel::build(&zero, None, &FourierConfig::new(-1.0, 1e-2)).is_err());
  }

  #[test]
  fn numeric_transform_matches_closed_form() {
    let c = GaussianCorrelation::new(2.0, 0.7);
    let config = FourierConfig {
      negative_frequencies: true,
      ..FourierConfig::new(5.0, 1e-3)
    };
    let (x, p) = find_peak(&c, true).unwrap();
    let numeric = NumericTransform::new(&c, x, p, &config).unwrap();
    for &tau in &[0.0, 0.5, 2.0, 5.0] {
      assert!((numeric.eval(tau) - c.alpha(tau)).norm() < 1e-6, "tau={tau}");
    }
  }
}

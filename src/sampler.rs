//! # Sampler
//!
//! $$
//! X_k\sim\mathcal{CN}(0,1):\ \langle X_kX_l^*\rangle=\delta_{kl},\ \langle X_kX_l\rangle=0,
//! \qquad z(t)=\sum_k c_k X_k\phi_k(t)
//! $$
//!
use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

use ndarray::Array1;
use ndarray::ArrayView1;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::thread_rng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::error::Result;
use crate::error::StocProcError;
use crate::spline::CubicSpline;
use crate::traits::Interpolant;
use crate::traits::ProcessExt;
use crate::traits::ProcessModel;

/// Relative slack on the domain ends, absorbs rounding in generated time grids.
const DOMAIN_SLACK: f64 = 1e-12;

/// Distribution of the expansion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Noise {
  /// Circularly symmetric complex Gaussian, `⟨X X*⟩ = 1`, `⟨X X⟩ = 0`.
  #[default]
  Complex,
  /// Real `N(0, 1)`. Only valid for real models.
  Real,
}

/// Evaluation times of a realization.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeQuery {
  Points(Vec<f64>),
  /// `count` equidistant points from `start` to `stop` inclusive.
  Uniform { start: f64, stop: f64, count: usize },
}

impl TimeQuery {
  pub fn times(&self) -> Result<Vec<f64>> {
    match self {
      Self::Points(p) => Ok(p.clone()),
      Self::Uniform { start, stop, count } => {
        if *count == 0 {
          return Err(StocProcError::invalid("count", "at least one time point required"));
        }
        if *count == 1 {
          return Ok(vec![*start]);
        }
        Ok(Array1::linspace(*start, *stop, *count).to_vec())
      }
    }
  }
}

/// Circularly symmetric complex normal, independent real and imaginary parts
/// with standard deviation `sigma / √2` each.
#[derive(Debug, Clone, Copy)]
struct ComplexNormal {
  sigma: f64,
}

impl Distribution<Complex64> for ComplexNormal {
  fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Complex64 {
    let re: f64 = StandardNormal.sample(rng);
    let im: f64 = StandardNormal.sample(rng);
    Complex64::new(re, im) * (self.sigma * FRAC_1_SQRT_2)
  }
}

/// Rejects the whole batch if any time is non-finite or outside `[0, t_max]`.
pub fn check_domain(times: &[f64], t_max: f64) -> Result<()> {
  let slack = DOMAIN_SLACK * t_max;
  for (index, &t) in times.iter().enumerate() {
    if !t.is_finite() || t < -slack || t > t_max + slack {
      return Err(StocProcError::OutOfDomain { index, t, t_max });
    }
  }
  Ok(())
}

pub(crate) fn check_coefficients(expected: usize, got: usize) -> Result<()> {
  if expected != got {
    return Err(StocProcError::invalid(
      "coefficients",
      format!("model has {expected} modes, got {got} coefficients"),
    ));
  }
  Ok(())
}

/// Draws one i.i.d. coefficient per mode.
pub fn draw_coefficients<M, R>(model: &M, noise: Noise, rng: &mut R) -> Result<Array1<Complex64>>
where
  M: ProcessModel + ?Sized,
  R: Rng + ?Sized,
{
  let k = model.num_modes();
  match noise {
    Noise::Complex => {
      let dist = ComplexNormal { sigma: 1.0 };
      Ok((0..k).map(|_| dist.sample(rng)).collect())
    }
    Noise::Real => {
      if !model.is_real() {
        return Err(StocProcError::invalid(
          "noise",
          "real coefficients require a real-valued model",
        ));
      }
      Ok(
        (0..k)
          .map(|_| Complex64::new(StandardNormal.sample(rng), 0.0))
          .collect(),
      )
    }
  }
}

/// Fresh realization evaluated at `times`.
pub fn sample<M, R>(model: &M, times: &[f64], noise: Noise, rng: &mut R) -> Result<Array1<Complex64>>
where
  M: ProcessModel + ?Sized,
  R: Rng + ?Sized,
{
  check_domain(times, model.t_max())?;
  let x = draw_coefficients(model, noise, rng)?;
  sample_with(model, x.view(), times)
}

/// Realization for given coefficients, identical output for identical input.
pub fn sample_with<M>(
  model: &M,
  coefficients: ArrayView1<Complex64>,
  times: &[f64],
) -> Result<Array1<Complex64>>
where
  M: ProcessModel + ?Sized,
{
  check_domain(times, model.t_max())?;
  let x = coefficients.to_vec();
  model.realize(&x)?.eval(times)
}

/// Process path bound to its coefficients.
///
/// Holds a single spline, the weighted sum of all basis functions, so each
/// evaluation costs the same regardless of the number of modes.
#[derive(Debug, Clone)]
pub struct Realization {
  spline: CubicSpline,
  t_max: f64,
  coefficients: Vec<Complex64>,
}

impl Realization {
  pub(crate) fn new(spline: CubicSpline, t_max: f64, coefficients: Vec<Complex64>) -> Self {
    Self {
      spline,
      t_max,
      coefficients,
    }
  }

  pub fn t_max(&self) -> f64 {
    self.t_max
  }

  pub fn coefficients(&self) -> &[Complex64] {
    &self.coefficients
  }

  pub fn at(&self, t: f64) -> Result<Complex64> {
    check_domain(&[t], self.t_max)?;
    Ok(self.spline.eval(t))
  }

  pub fn eval(&self, times: &[f64]) -> Result<Array1<Complex64>> {
    check_domain(times, self.t_max)?;
    Ok(self.spline.eval_batch(times))
  }

  /// Knots of the underlying spline and the path values there.
  pub fn knots(&self) -> (Array1<f64>, Array1<Complex64>) {
    (self.spline.knots(), self.spline.knot_values().to_owned())
  }
}

/// Repeated sampling of one model on a fixed set of times.
#[derive(Clone)]
pub struct StocProcSampler<M: ProcessModel> {
  model: Arc<M>,
  times: Vec<f64>,
  noise: Noise,
}

impl<M: ProcessModel> StocProcSampler<M> {
  pub fn new(model: Arc<M>, query: TimeQuery, noise: Noise) -> Result<Self> {
    let times = query.times()?;
    check_domain(&times, model.t_max())?;
    if noise == Noise::Real && !model.is_real() {
      return Err(StocProcError::invalid(
        "noise",
        "real coefficients require a real-valued model",
      ));
    }
    Ok(Self { model, times, noise })
  }

  pub fn times(&self) -> &[f64] {
    &self.times
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn sample_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array1<Complex64>> {
    sample(self.model.as_ref(), &self.times, self.noise, rng)
  }

  /// `m` paths, path `i` drawn from `StdRng::seed_from_u64(seed + i)`.
  ///
  /// The result does not depend on the number of rayon threads.
  pub fn sample_par_seeded(&self, m: usize, seed: u64) -> Result<Vec<Array1<Complex64>>> {
    (0..m)
      .into_par_iter()
      .map(|i| {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
        self.sample_with_rng(&mut rng)
      })
      .collect()
  }
}

impl<M: ProcessModel> ProcessExt for StocProcSampler<M> {
  type Output = Result<Array1<Complex64>>;

  fn sample(&self) -> Self::Output {
    self.sample_with_rng(&mut thread_rng())
  }
}

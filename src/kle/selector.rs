//! # Selector
//!
//! $$
//! \varepsilon_K=\sup_{(t,s)}\frac{\left|\alpha(t-s)-\sum_{k<K}\lambda_k u_k(t)\overline{u_k(s)}\right|}{|\alpha(0)|}
//! $$
//!
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::error::StocProcError;
use crate::kle::basis::ContinuousBasis;
use crate::kle::eigen::EigenDecomposition;
use crate::kle::eigen::EigenMode;
use crate::kle::kernel::KernelMatrix;
use crate::traits::Autocorrelation;
use crate::traits::Interpolant;

/// Modes validated in the first pass. Every further pass doubles the count.
const BLOCK: usize = 16;

/// Point pairs on which the truncated kernel is compared against `α`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScheme {
  /// All pairs from `0`, `T` and the midpoints of the fine spline grid
  /// subdivided `refine` times. Spline interpolation error peaks at the
  /// midpoints, truncation error at the ends.
  FineGrid { refine: usize },
  /// `samples` uniformly random pairs `(t, s)` in `[0, T]²`.
  Random { samples: usize, seed: u64 },
}

impl Default for ValidationScheme {
  fn default() -> Self {
    Self::FineGrid { refine: 1 }
  }
}

/// Modes retained by the selector, their splines and the error they achieve.
#[derive(Debug, Clone)]
pub struct TruncatedModeSet {
  pub modes: Vec<EigenMode>,
  pub basis: ContinuousBasis,
  pub achieved_error: f64,
  pub tolerance: f64,
  /// `ε_K` after adding each mode, `errors[k]` uses `k + 1` modes.
  pub errors: Vec<f64>,
}

impl TruncatedModeSet {
  pub fn len(&self) -> usize {
    self.modes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modes.is_empty()
  }
}

/// Validation points.
enum Validation {
  /// Every pair `a <= b` of a point set.
  Pairs { times: Vec<f64> },
  /// Independent `(t, s)` draws.
  Random { t: Vec<f64>, s: Vec<f64> },
}

impl Validation {
  fn new(t_max: f64, fine_points: usize, scheme: ValidationScheme) -> Result<Self> {
    match scheme {
      ValidationScheme::FineGrid { refine } => {
        if refine == 0 {
          return Err(StocProcError::invalid("refine", "must be at least 1"));
        }
        let intervals = refine * (fine_points - 1);
        let dt = t_max / intervals as f64;
        let mut times = Vec::with_capacity(intervals + 2);
        times.push(0.0);
        times.extend((0..intervals).map(|i| (i as f64 + 0.5) * dt));
        times.push(t_max);
        Ok(Self::Pairs { times })
      }
      ValidationScheme::Random { samples, seed } => {
        if samples == 0 {
          return Err(StocProcError::invalid("samples", "must be at least 1"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let t = (0..samples).map(|_| rng.gen_range(0.0..=t_max)).collect();
        let s = (0..samples).map(|_| rng.gen_range(0.0..=t_max)).collect();
        Ok(Self::Random { t, s })
      }
    }
  }

  fn num_pairs(&self) -> usize {
    match self {
      Self::Pairs { times } => times.len() * (times.len() + 1) / 2,
      Self::Random { t, .. } => t.len(),
    }
  }

  /// `sup |α(t - s) - Σ_{j<=k} λ_j φ_j(t) conj(φ_j(s))|` for every `k < eigenvalues.len()`,
  /// with `φ_j` the splines of `basis`.
  fn residuals<A: Autocorrelation + ?Sized>(
    &self,
    kernel: &KernelMatrix<'_, A>,
    basis: &ContinuousBasis,
    eigenvalues: &[f64],
  ) -> Vec<f64> {
    let k = eigenvalues.len();
    let merge = |mut x: Vec<f64>, y: Vec<f64>| {
      for (a, b) in x.iter_mut().zip(y) {
        *a = a.max(b);
      }
      x
    };

    let worst = match self {
      Self::Pairs { times } => {
        let phi = spline_values(basis, times, k);
        let m = times.len();
        (0..m)
          .into_par_iter()
          .map(|a| {
            let row_a: Vec<Complex64> = phi
              .row(a)
              .iter()
              .zip(eigenvalues)
              .map(|(u, &l)| u * l)
              .collect();
            let mut worst = vec![0.0_f64; k];
            for b in a..m {
              let row_b = phi.row(b);
              let mut r = kernel.alpha(times[a] - times[b]);
              for j in 0..k {
                r -= row_a[j] * row_b[j].conj();
                worst[j] = worst[j].max(r.norm_sqr());
              }
            }
            worst
          })
          .reduce(|| vec![0.0; k], merge)
      }
      Self::Random { t, s } => {
        let phi_t = spline_values(basis, t, k);
        let phi_s = spline_values(basis, s, k);
        (0..t.len())
          .into_par_iter()
          .map(|i| {
            let mut worst = vec![0.0_f64; k];
            let mut r = kernel.alpha(t[i] - s[i]);
            for j in 0..k {
              r -= phi_t[(i, j)] * phi_s[(i, j)].conj() * eigenvalues[j];
              worst[j] = r.norm_sqr();
            }
            worst
          })
          .reduce(|| vec![0.0; k], merge)
      }
    };
    worst.into_iter().map(f64::sqrt).collect()
  }
}

/// `times × k` matrix of the first `k` splines.
fn spline_values(basis: &ContinuousBasis, times: &[f64], k: usize) -> Array2<Complex64> {
  let mut phi = Array2::<Complex64>::zeros((times.len(), k));
  for (j, spline) in basis.splines()[..k].iter().enumerate() {
    phi.column_mut(j).assign(&spline.eval_batch(times));
  }
  phi
}

/// Picks the smallest `K` such that the spline-interpolated expansion
/// reproduces `α` within `tolerance · |α(0)|` on the validation pairs.
///
/// Only modes with positive eigenvalue are candidates. Running out of
/// candidates, or reaching `max_modes`, is [`StocProcError::ToleranceNotAchieved`].
pub fn select<A: Autocorrelation + ?Sized>(
  kernel: &KernelMatrix<'_, A>,
  decomposition: &EigenDecomposition,
  tolerance: f64,
  max_modes: Option<usize>,
  scheme: ValidationScheme,
  ng_fac: usize,
) -> Result<TruncatedModeSet> {
  if !(tolerance.is_finite() && tolerance > 0.0) {
    return Err(StocProcError::invalid(
      "tolerance",
      format!("must be positive and finite, got {tolerance}"),
    ));
  }

  let candidates = decomposition
    .modes
    .iter()
    .take_while(|m| m.eigenvalue > 0.0)
    .count();
  let cap = max_modes.map_or(candidates, |k| k.min(candidates));
  let eigenvalues: Vec<f64> = decomposition.modes[..cap]
    .iter()
    .map(|m| m.eigenvalue)
    .collect();

  let alpha0 = kernel.alpha0();
  let mut basis = ContinuousBasis::empty(kernel, ng_fac)?;
  let validation = Validation::new(kernel.grid().t_max, basis.fine_points(), scheme)?;
  debug!(
    pairs = validation.num_pairs(),
    candidates,
    cap,
    "validating truncated expansion"
  );

  // without modes the residual is α itself
  let mut achieved = 1.0;
  let mut count = BLOCK.min(cap);
  while count > 0 {
    let done = basis.len();
    basis.extend(kernel, &decomposition.modes[done..count])?;
    let errors: Vec<f64> = validation
      .residuals(kernel, &basis, &eigenvalues[..count])
      .into_iter()
      .map(|e| e / alpha0)
      .collect();

    if let Some(k) = errors.iter().position(|&e| e <= tolerance) {
      let num_modes = k + 1;
      debug!(num_modes, achieved = errors[k], tolerance, "tolerance reached");
      basis.truncate(num_modes);
      return Ok(TruncatedModeSet {
        modes: decomposition.modes[..num_modes].to_vec(),
        basis,
        achieved_error: errors[k],
        tolerance,
        errors: errors[..num_modes].to_vec(),
      });
    }

    achieved = errors[count - 1];
    debug!(modes = count, achieved, tolerance, "validation pass");
    if count == cap {
      break;
    }
    count = (2 * count).min(cap);
  }

  Err(StocProcError::ToleranceNotAchieved {
    achieved,
    target: tolerance,
    num_modes: cap,
    grid_points: kernel.len(),
  })
}

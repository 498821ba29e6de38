//! # Stats
//!
//! $$
//! \hat\alpha(t_i,t_j)=\frac1M\sum_{m=1}^M z^{(m)}(t_i)\,\overline{z^{(m)}(t_j)},\qquad
//! \varepsilon=\sup_{i,j}\frac{|\sum_k c_k^2\phi_k(t_i)\overline{\phi_k(t_j)}-\alpha(t_i-t_j)|}{|\alpha(0)|}
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::error::Result;
use crate::error::StocProcError;
use crate::sampler::check_domain;
use crate::traits::Autocorrelation;
use crate::traits::ProcessModel;

/// Sup-norm error of the correlation implied by `model` against `alpha`, on all pairs of `times`.
///
/// Independent of how the model was validated while it was built, so it can
/// be used to check a model on a denser grid.
pub fn autocorrelation_error<M, A>(model: &M, alpha: &A, times: &[f64]) -> Result<f64>
where
  M: ProcessModel + ?Sized,
  A: Autocorrelation + ?Sized,
{
  check_domain(times, model.t_max())?;
  let alpha0 = alpha.eval(0.0).norm();
  if !(alpha0.is_finite() && alpha0 > 0.0) {
    return Err(StocProcError::InvalidKernel {
      reason: "α(0) must be finite and non-zero",
      deviation: alpha0,
      tolerance: 0.0,
    });
  }

  let w = model.mode_weights();
  let phi = Array2::from_shape_fn((times.len(), model.num_modes()), |(i, k)| {
    model.eval_mode(k, times[i]) * w[k]
  });

  let err = (0..times.len())
    .into_par_iter()
    .map(|i| {
      let row_i = phi.row(i);
      (i..times.len())
        .map(|j| {
          let implied: Complex64 = row_i
            .iter()
            .zip(phi.row(j).iter())
            .map(|(a, b)| a * b.conj())
            .sum();
          (implied - alpha.eval(times[i] - times[j])).norm()
        })
        .fold(0.0, f64::max)
    })
    .reduce(|| 0.0, f64::max);

  Ok(err / alpha0)
}

fn stack(paths: &[Array1<Complex64>]) -> Result<Array2<Complex64>> {
  let first = paths
    .first()
    .ok_or_else(|| StocProcError::invalid("paths", "at least one path required"))?;
  let n = first.len();
  if paths.iter().any(|p| p.len() != n) {
    return Err(StocProcError::invalid("paths", "all paths must have equal length"));
  }
  Ok(Array2::from_shape_fn((paths.len(), n), |(m, i)| paths[m][i]))
}

/// Sample estimate of `⟨z(t_i) z*(t_j)⟩` from paths sampled on a common grid.
pub fn empirical_autocorrelation(paths: &[Array1<Complex64>]) -> Result<Array2<Complex64>> {
  let z = stack(paths)?;
  let m = z.nrows() as f64;
  Ok(z.t().dot(&z.mapv(|v| v.conj())).mapv(|v| v / m))
}

/// Sample estimate of `⟨z(t_i) z(t_j)⟩`, zero for a circularly symmetric process.
pub fn empirical_pseudo_covariance(paths: &[Array1<Complex64>]) -> Result<Array2<Complex64>> {
  let z = stack(paths)?;
  let m = z.nrows() as f64;
  Ok(z.t().dot(&z).mapv(|v| v / m))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  use super::*;
  use crate::correlation::GaussianCorrelation;
  use crate::kle::KleConfig;
  use crate::kle::KleModel;
  use crate::sampler::sample;
  use crate::sampler::Noise;

  #[test]
  fn estimators_on_known_paths() {
    let i = Complex64::new(0.0, 1.0);
    let one = Complex64::new(1.0, 0.0);
    let paths = vec![array![one, i], array![-one, -i]];
    let c = empirical_autocorrelation(&paths).unwrap();
    // z_0 z_1* = 1 · conj(i) = -i
    assert_eq!(c[(0, 0)], one);
    assert_eq!(c[(0, 1)], -i);
    assert_eq!(c[(1, 0)], i);
    let p = empirical_pseudo_covariance(&paths).unwrap();
    assert_eq!(p[(1, 1)], -one);
    assert!(empirical_autocorrelation(&[]).is_err());
    assert!(empirical_autocorrelation(&[array![one], array![one, one]]).is_err());
  }

  #[test]
  fn model_reproduces_correlation_on_dense_grid() {
    let alpha = GaussianCorrelation::new(1.0, 0.7);
    let model = KleModel::build(&alpha, &KleConfig::new(3.0, 1e-3)).unwrap();
    let times: Vec<f64> = (0..=400).map(|i| 3.0 * i as f64 / 400.0).collect();
    let err = autocorrelation_error(&model, &alpha, &times).unwrap();
    assert!(err <= 1e-3, "error {err}");
    assert!(autocorrelation_error(&model, &alpha, &[3.5]).is_err());
  }

  #[test]
  fn sample_statistics_converge() {
    let alpha = GaussianCorrelation::new(1.0, 1.0);
    let model = KleModel::build(&alpha, &KleConfig::new(2.0, 1e-3)).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let times = [0.0, 0.5, 1.0, 2.0];
    let paths: Vec<_> = (0..20_000)
      .map(|_| sample(&model, &times, Noise::Complex, &mut rng).unwrap())
      .collect();
    let c = empirical_autocorrelation(&paths).unwrap();
    let p = empirical_pseudo_covariance(&paths).unwrap();
    for (i, &t) in times.iter().enumerate() {
      for (j, &s) in times.iter().enumerate() {
        let exact = alpha.alpha(t - s);
        assert_abs_diff_eq!((c[(i, j)] - exact).norm(), 0.0, epsilon = 0.05);
        assert_abs_diff_eq!(p[(i, j)].norm(), 0.0, epsilon = 0.05);
      }
    }
  }
}

//! # Correlation
//!
//! $$
//! \alpha(\tau)=\frac{1}{\pi}\int_{-\infty}^{\infty} J(\omega)\,e^{-i\omega\tau}\,d\omega
//! $$
//!
//! Closed-form correlation functions together with their spectral densities.
//! They serve as reference inputs for both expansion methods and as ground truth
//! in tests.
use std::f64::consts::PI;

use num_complex::Complex64;
use statrs::function::gamma::gamma;

use crate::traits::Autocorrelation;
use crate::traits::SpectralDensity;

/// `α(τ) = a e^{-γ|τ| - iΩτ}` with Lorentzian density `J(ω) = a γ / (γ² + (ω - Ω)²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialCorrelation {
  pub amplitude: f64,
  pub gamma: f64,
  pub omega: f64,
}

impl ExponentialCorrelation {
  pub fn new(amplitude: f64, gamma: f64, omega: f64) -> Self {
    Self {
      amplitude,
      gamma,
      omega,
    }
  }

  pub fn alpha(&self, tau: f64) -> Complex64 {
    self.amplitude * Complex64::new(-self.gamma * tau.abs(), -self.omega * tau).exp()
  }

  pub fn spectral_density(&self, omega: f64) -> f64 {
    let d = omega - self.omega;
    self.amplitude * self.gamma / (self.gamma * self.gamma + d * d)
  }
}

impl Default for ExponentialCorrelation {
  /// `α(τ) = e^{-|τ|}`
  fn default() -> Self {
    Self::new(1.0, 1.0, 0.0)
  }
}

/// `α(τ) = a e^{-τ²/(2σ²)}` with `J(ω) = a σ √(π/2) e^{-σ²ω²/2}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianCorrelation {
  pub amplitude: f64,
  pub sigma: f64,
}

impl GaussianCorrelation {
  pub fn new(amplitude: f64, sigma: f64) -> Self {
    Self { amplitude, sigma }
  }

  pub fn alpha(&self, tau: f64) -> Complex64 {
    let x = tau / self.sigma;
    Complex64::new(self.amplitude * (-0.5 * x * x).exp(), 0.0)
  }

  pub fn spectral_density(&self, omega: f64) -> f64 {
    let x = omega * self.sigma;
    self.amplitude * self.sigma * (0.5 * PI).sqrt() * (-0.5 * x * x).exp()
  }
}

/// Ohmic family with exponential cutoff,
/// `J(ω) = η ω^s e^{-ω/ω_c}` for `ω > 0` and
/// `α(τ) = η/π Γ(s+1) ω_c^{s+1} (1 + iω_cτ)^{-(s+1)}`.
///
/// `s < 1` is sub-ohmic, `s = 1` ohmic, `s > 1` super-ohmic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhmicCorrelation {
  pub eta: f64,
  pub s: f64,
  pub omega_c: f64,
  prefactor: f64,
}

impl OhmicCorrelation {
  pub fn new(eta: f64, s: f64, omega_c: f64) -> Self {
    Self {
      eta,
      s,
      omega_c,
      prefactor: eta / PI * gamma(s + 1.0) * omega_c.powf(s + 1.0),
    }
  }

  pub fn alpha(&self, tau: f64) -> Complex64 {
    self.prefactor * Complex64::new(1.0, self.omega_c * tau).powf(-(self.s + 1.0))
  }

  pub fn spectral_density(&self, omega: f64) -> f64 {
    if omega <= 0.0 {
      0.0
    } else {
      self.eta * omega.powf(self.s) * (-omega / self.omega_c).exp()
    }
  }
}

macro_rules! impl_correlation_traits {
  ($($ty:ty),*) => {
    $(
      impl Autocorrelation for $ty {
        fn eval(&self, tau: f64) -> Complex64 {
          self.alpha(tau)
        }
      }

      impl SpectralDensity for $ty {
        fn eval(&self, omega: f64) -> f64 {
          self.spectral_density(omega)
        }
      }
    )*
  };
}

impl_correlation_traits!(ExponentialCorrelation, GaussianCorrelation, OhmicCorrelation);

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use gauss_quad::GaussLegendre;

  use super::*;

  /// `1/π ∫_a^b J(ω) e^{-iωτ} dω` by panel-wise Gauss-Legendre.
  fn fourier_integral<F: Fn(f64) -> f64>(j: F, a: f64, b: f64, tau: f64) -> Complex64 {
    let quad = GaussLegendre::new(20).unwrap();
    let panels = ((b - a) / 0.1).ceil() as usize;
    let h = (b - a) / panels as f64;
    let mut acc = Complex64::new(0.0, 0.0);
    for p in 0..panels {
      let lo = a + p as f64 * h;
      let re = quad.integrate(lo, lo + h, |w| j(w) * (w * tau).cos());
      let im = quad.integrate(lo, lo + h, |w| -j(w) * (w * tau).sin());
      acc += Complex64::new(re, im);
    }
    acc / PI
  }

  #[test]
  fn correlation_functions_are_hermitian() {
    let exp = ExponentialCorrelation::new(2.0, 0.7, 1.3);
    let ohm = OhmicCorrelation::new(0.5, 0.8, 4.0);
    let gauss = GaussianCorrelation::new(1.0, 0.5);
    for &tau in &[0.1, 0.9, 3.3] {
      assert_relative_eq!(exp.alpha(-tau).re, exp.alpha(tau).conj().re, max_relative = 1e-14);
      assert_relative_eq!(exp.alpha(-tau).im, exp.alpha(tau).conj().im, max_relative = 1e-14);
      assert_relative_eq!(ohm.alpha(-tau).im, -ohm.alpha(tau).im, max_relative = 1e-12);
      assert_relative_eq!(gauss.alpha(-tau).re, gauss.alpha(tau).re);
    }
  }

  #[test]
  fn gaussian_density_transforms_to_correlation() {
    let g = GaussianCorrelation::new(1.5, 0.8);
    for &tau in &[0.0, 0.4, 1.7] {
      let num = fourier_integral(|w| g.spectral_density(w), -20.0, 20.0, tau);
      assert_relative_eq!(num.re, g.alpha(tau).re, epsilon = 1e-10);
      assert!(num.im.abs() < 1e-10);
    }
  }

  #[test]
  fn ohmic_density_transforms_to_correlation() {
    let o = OhmicCorrelation::new(1.0, 1.0, 2.0);
    for &tau in &[0.0, 0.5, 2.0] {
      let num = fourier_integral(|w| o.spectral_density(w), 0.0, 120.0, tau);
      let exact = o.alpha(tau);
      assert!((num - exact).norm() < 1e-8 * exact.norm().max(1.0), "tau={tau}");
    }
  }

  #[test]
  fn lorentzian_normalization() {
    // α(0) = 1/π ∫ J = amplitude
    let e = ExponentialCorrelation::new(3.0, 0.5, 1.0);
    assert_relative_eq!(e.alpha(0.0).re, 3.0);
    let num = fourier_integral(|w| e.spectral_density(w), -4000.0, 4000.0, 0.0);
    assert_relative_eq!(num.re, 3.0, max_relative = 1e-3);
  }
}

//! # Spline
//!
//! $$
//! p_i(s) = h_{00}(s)\,y_i + h_{10}(s)\,\Delta x\,m_i + h_{01}(s)\,y_{i+1} + h_{11}(s)\,\Delta x\,m_{i+1},\quad s\in[0,1]
//! $$
//!
//! Complex cubic spline on an equidistant grid. The slopes `m_i` solve the usual
//! tridiagonal continuity system; the end slopes are fourth order one-sided
//! differences, so cubics are reproduced exactly. Evaluation is O(1).
use ndarray::Array1;
use ndarray::ArrayView1;
use num_complex::Complex64;
use num_traits::Zero;

use crate::error::Result;
use crate::error::StocProcError;
use crate::traits::Interpolant;

#[derive(Debug, Clone)]
pub struct CubicSpline {
  x_low: f64,
  x_high: f64,
  dx: f64,
  values: Array1<Complex64>,
  slopes: Array1<Complex64>,
}

impl CubicSpline {
  /// Fits the spline through `values` sampled at `linspace(x_low, x_high, values.len())`.
  pub fn fit(x_low: f64, x_high: f64, values: ArrayView1<Complex64>) -> Result<Self> {
    let n = values.len();
    if n < 2 {
      return Err(StocProcError::invalid(
        "values",
        format!("spline needs at least 2 samples, got {n}"),
      ));
    }
    if !(x_low.is_finite() && x_high.is_finite() && x_high > x_low) {
      return Err(StocProcError::invalid(
        "x_high",
        format!("invalid spline domain [{x_low}, {x_high}]"),
      ));
    }
    if values.iter().any(|v| !v.is_finite()) {
      return Err(StocProcError::Numerical {
        reason: "non-finite sample passed to spline fit".to_string(),
      });
    }

    let dx = (x_high - x_low) / (n - 1) as f64;
    let slopes = clamped_slopes(values, dx);

    Ok(Self {
      x_low,
      x_high,
      dx,
      values: values.to_owned(),
      slopes,
    })
  }

  /// `Σ_k c_k s_k` for splines sharing one grid.
  ///
  /// The fit is linear in the samples, so this equals fitting the combined samples,
  /// at `O(K·n)` instead of re-solving the slope system.
  pub fn linear_combination(splines: &[&CubicSpline], coefficients: &[Complex64]) -> Result<Self> {
    let first = splines.first().ok_or_else(|| {
      StocProcError::invalid("splines", "linear combination of an empty spline set")
    })?;
    if splines.len() != coefficients.len() {
      return Err(StocProcError::invalid(
        "coefficients",
        format!(
          "{} coefficients for {} splines",
          coefficients.len(),
          splines.len()
        ),
      ));
    }

    let n = first.len();
    let mut values = Array1::<Complex64>::zeros(n);
    let mut slopes = Array1::<Complex64>::zeros(n);
    for (s, &c) in splines.iter().zip(coefficients.iter()) {
      if s.len() != n || s.x_low != first.x_low || s.x_high != first.x_high {
        return Err(StocProcError::invalid(
          "splines",
          "linear combination requires a common grid",
        ));
      }
      if c.is_zero() {
        continue;
      }
      values.scaled_add(c, &s.values);
      slopes.scaled_add(c, &s.slopes);
    }

    Ok(Self {
      x_low: first.x_low,
      x_high: first.x_high,
      dx: first.dx,
      values,
      slopes,
    })
  }

  /// Number of knots.
  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn knots(&self) -> Array1<f64> {
    Array1::linspace(self.x_low, self.x_high, self.len())
  }

  pub fn knot_values(&self) -> ArrayView1<Complex64> {
    self.values.view()
  }

  pub fn scale(&mut self, factor: f64) {
    self.values.mapv_inplace(|v| v * factor);
    self.slopes.mapv_inplace(|v| v * factor);
  }
}

impl Interpolant for CubicSpline {
  fn domain(&self) -> (f64, f64) {
    (self.x_low, self.x_high)
  }

  fn eval(&self, t: f64) -> Complex64 {
    let n = self.values.len();
    let pos = (t - self.x_low) / self.dx;
    let i = (pos.floor().max(0.0) as usize).min(n - 2);
    let s = pos - i as f64;

    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    self.values[i] * h00
      + self.slopes[i] * (h10 * self.dx)
      + self.values[i + 1] * h01
      + self.slopes[i + 1] * (h11 * self.dx)
  }
}

fn clamped_slopes(y: ArrayView1<Complex64>, dx: f64) -> Array1<Complex64> {
  let n = y.len();
  let mut m = Array1::<Complex64>::zeros(n);

  if n == 2 {
    let d = (y[1] - y[0]) / dx;
    m.fill(d);
    return m;
  }

  let last = n - 1;
  if n >= 5 {
    m[0] = (y[0] * -25.0 + y[1] * 48.0 - y[2] * 36.0 + y[3] * 16.0 - y[4] * 3.0) / (12.0 * dx);
    m[last] = (y[last] * 25.0 - y[last - 1] * 48.0 + y[last - 2] * 36.0 - y[last - 3] * 16.0
      + y[last - 4] * 3.0)
      / (12.0 * dx);
  } else {
    m[0] = (y[0] * -3.0 + y[1] * 4.0 - y[2]) / (2.0 * dx);
    m[last] = (y[last] * 3.0 - y[last - 1] * 4.0 + y[last - 2]) / (2.0 * dx);
  }

  // m_{i-1} + 4 m_i + m_{i+1} = 3 (y_{i+1} - y_{i-1}) / dx, i = 1..n-2
  let inner = n - 2;
  let mut c_prime = vec![0.0; inner];
  let mut d_prime = vec![Complex64::zero(); inner];
  for k in 0..inner {
    let i = k + 1;
    let mut rhs = (y[i + 1] - y[i - 1]) * (3.0 / dx);
    if k == 0 {
      rhs -= m[0];
    }
    if k == inner - 1 {
      rhs -= m[last];
    }
    if k == 0 {
      c_prime[0] = 1.0 / 4.0;
      d_prime[0] = rhs / 4.0;
    } else {
      let denom = 4.0 - c_prime[k - 1];
      c_prime[k] = 1.0 / denom;
      d_prime[k] = (rhs - d_prime[k - 1]) / denom;
    }
  }
  for k in (0..inner).rev() {
    let next = if k + 1 < inner {
      m[k + 2]
    } else {
      Complex64::zero()
    };
    m[k + 1] = d_prime[k] - next * c_prime[k];
  }

  m
}

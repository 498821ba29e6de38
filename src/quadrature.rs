//! # Quadrature
//!
//! $$
//! \int_0^T f(s)\,ds \approx \sum_{i=0}^{N-1} w_i f(t_i),\qquad \sum_i w_i = T
//! $$
//!
use std::f64::consts::FRAC_PI_2;

use gauss_quad::GaussLegendre;
use ndarray::Array1;

use crate::error::Result;
use crate::error::StocProcError;

/// Integration scheme used to discretize the Fredholm equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadratureRule {
  /// t_i = (i + 1/2) Δ, w_i = Δ. Never samples the end points.
  Midpoint,
  /// Equidistant nodes including both ends, half weights at the ends.
  Trapezoidal,
  /// Composite Simpson, odd number of nodes.
  #[default]
  Simpson,
  /// Composite Simpson 3/8, `N = 3m + 1` nodes.
  FourPoint,
  /// Gauss-Legendre nodes mapped to `[0, T]`, from `gauss_quad`.
  GaussLegendre,
  /// Double exponential (tanh-sinh) nodes, clustered at both ends.
  TanhSinh,
}

impl QuadratureRule {
  /// Smallest admissible node count that is `>= n`.
  pub fn admissible_points(&self, n: usize) -> usize {
    let n = n.max(2);
    match self {
      Self::Simpson => {
        let n = n.max(3);
        if n % 2 == 0 {
          n + 1
        } else {
          n
        }
      }
      Self::FourPoint => {
        let n = n.max(4);
        n + (3 - (n - 1) % 3) % 3
      }
      Self::TanhSinh => n.max(3),
      _ => n,
    }
  }

  /// Whether nodes form a uniform grid containing `0` and `T`.
  pub fn includes_end_points(&self) -> bool {
    matches!(self, Self::Trapezoidal | Self::Simpson | Self::FourPoint)
  }
}

/// Quadrature nodes and weights on `[0, t_max]`.
#[derive(Debug, Clone)]
pub struct IntegrationGrid {
  pub rule: QuadratureRule,
  pub t_max: f64,
  pub nodes: Array1<f64>,
  pub weights: Array1<f64>,
}

impl IntegrationGrid {
  /// Builds the grid for `rule` with exactly `n` nodes.
  ///
  /// `n` must already be admissible for the rule, see [`QuadratureRule::admissible_points`].
  pub fn new(rule: QuadratureRule, t_max: f64, n: usize) -> Result<Self> {
    if !(t_max.is_finite() && t_max > 0.0) {
      return Err(StocProcError::invalid(
        "t_max",
        format!("must be positive and finite, got {t_max}"),
      ));
    }
    if n < 2 {
      return Err(StocProcError::invalid(
        "num_grid_points",
        format!("need at least 2 nodes, got {n}"),
      ));
    }
    if rule.admissible_points(n) != n {
      return Err(StocProcError::invalid(
        "num_grid_points",
        format!(
          "{n} nodes not admissible for {rule:?}, next valid size is {}",
          rule.admissible_points(n)
        ),
      ));
    }

    let (nodes, weights) = match rule {
      QuadratureRule::Midpoint => {
        let dt = t_max / n as f64;
        (
          Array1::from_shape_fn(n, |i| (i as f64 + 0.5) * dt),
          Array1::from_elem(n, dt),
        )
      }
      QuadratureRule::Trapezoidal => {
        let dt = t_max / (n - 1) as f64;
        let mut w = Array1::from_elem(n, dt);
        w[0] = 0.5 * dt;
        w[n - 1] = 0.5 * dt;
        (Array1::linspace(0.0, t_max, n), w)
      }
      QuadratureRule::Simpson => {
        let dt = t_max / (n - 1) as f64;
        let w = Array1::from_shape_fn(n, |i| {
          let c = if i == 0 || i == n - 1 {
            1.0
          } else if i % 2 == 1 {
            4.0
          } else {
            2.0
          };
          c * dt / 3.0
        });
        (Array1::linspace(0.0, t_max, n), w)
      }
      QuadratureRule::FourPoint => {
        let dt = t_max / (n - 1) as f64;
        let w = Array1::from_shape_fn(n, |i| {
          let c = if i == 0 || i == n - 1 {
            1.0
          } else if i % 3 == 0 {
            2.0
          } else {
            3.0
          };
          3.0 * c * dt / 8.0
        });
        (Array1::linspace(0.0, t_max, n), w)
      }
      QuadratureRule::GaussLegendre => {
        let (x, w) = gauss_legendre_unit(n)?;
        let half = 0.5 * t_max;
        (x.mapv(|x| half * (x + 1.0)), w.mapv(|w| half * w))
      }
      QuadratureRule::TanhSinh => {
        let (x, w) = tanh_sinh_unit(n);
        let half = 0.5 * t_max;
        (x.mapv(|x| half * (x + 1.0)), w.mapv(|w| half * w))
      }
    };

    Ok(Self {
      rule,
      t_max,
      nodes,
      weights,
    })
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// `Σ_i w_i f(t_i)`
  pub fn integrate<F: Fn(f64) -> f64>(&self, f: F) -> f64 {
    self
      .nodes
      .iter()
      .zip(self.weights.iter())
      .map(|(&t, &w)| w * f(t))
      .sum()
  }
}

/// Legendre nodes on `[-1, 1]` in ascending order.
fn gauss_legendre_unit(n: usize) -> Result<(Array1<f64>, Array1<f64>)> {
  let rule = GaussLegendre::new(n).map_err(|e| StocProcError::Numerical {
    reason: format!("Gauss-Legendre rule with {n} nodes: {e}"),
  })?;
  let mut pairs = rule.into_node_weight_pairs();
  pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
  Ok((
    pairs.iter().map(|p| p.0).collect(),
    pairs.iter().map(|p| p.1).collect(),
  ))
}

/// Tanh-sinh nodes on `[-1, 1]` with step chosen so the outermost node sits at
/// `kh = 3`, where the weights have decayed below double precision.
fn tanh_sinh_unit(n: usize) -> (Array1<f64>, Array1<f64>) {
  let half = (n - 1) as f64 / 2.0;
  let h = 3.0 / half;
  let mut x = Array1::<f64>::zeros(n);
  let mut w = Array1::<f64>::zeros(n);
  for i in 0..n {
    let kh = (i as f64 - half) * h;
    let u = FRAC_PI_2 * kh.sinh();
    x[i] = u.tanh();
    w[i] = h * FRAC_PI_2 * kh.cosh() / (u.cosh() * u.cosh());
  }
  // rescaled so constants integrate exactly
  let total = w.sum();
  w.mapv_inplace(|v| 2.0 * v / total);
  (x, w)
}

//! # stocproc
//!
//! Sampling of stationary, complex-valued Gaussian processes `z(t)` on `[0, T]`
//! with a prescribed autocorrelation `α(τ) = ⟨z(t+τ) z*(t)⟩`.
//!
//! $$
//! z(t)=\sum_{k=1}^{K}\sqrt{\lambda_k}\,X_k\,\phi_k(t),\qquad
//! \sup_{s,t}\Big|\sum_k\lambda_k\phi_k(s)\overline{\phi_k(t)}-\alpha(s-t)\Big|\le\varepsilon\,|\alpha(0)|
//! $$
//!
//! ## Modules
//!
//! | Module            | Description                                                                  |
//! |-------------------|------------------------------------------------------------------------------|
//! | [`correlation`]   | Ready-made exponential, Gaussian and sub-ohmic/ohmic correlation families.   |
//! | [`error`]         | Error taxonomy shared by every construction step.                            |
//! | [`fourier`]       | Frequency-domain expansion from a spectral density, equidistant (FFT) or tanh-sinh nodes. |
//! | [`kle`]           | Karhunen-Loève expansion: kernel, eigen solvers, mode selection, splines.    |
//! | [`model`]         | [`StocProc`], the method-agnostic built process, and its diagnostics.        |
//! | [`quadrature`]    | Integration grids (midpoint, trapezoidal, Simpson, Gauss-Legendre, tanh-sinh). |
//! | [`sampler`]       | Coefficient draws, realizations and the parallel sampler.                    |
//! | [`spline`]        | Complex cubic splines used as continuous basis functions.                    |
//! | [`stats`]         | Reconstruction error and empirical estimators for validation.                |
//! | [`traits`]        | Contracts for correlations, spectral densities, solvers and process models.  |
//!
//! ## Parallelism
//!
//! Construction is single-threaded except for the residual checks: mode
//! validation and the Fourier accuracy and interpolation checks run on `rayon`.
//! `sample_par` draws paths in parallel, and tanh-sinh Fourier paths sum their
//! modes over time points in parallel. A built model is immutable and can be
//! shared across threads behind an `Arc`.
//!
//! ## Example Usage
//!
//! ```rust
//! use stocproc::correlation::ExponentialCorrelation;
//! use stocproc::kle::KleConfig;
//! use stocproc::sampler::Noise;
//! use stocproc::StocProc;
//!
//! let alpha = ExponentialCorrelation::new(1.0, 1.0, 0.0);
//! let process = StocProc::new_kle(&alpha, KleConfig::new(5.0, 1e-2))?;
//! let z = stocproc::sample(&process, &[0.0, 1.0, 2.5], Noise::Complex, &mut rand::thread_rng())?;
//! ```
//!
pub mod correlation;
pub mod error;
pub mod fourier;
pub mod kle;
pub mod model;
pub mod quadrature;
pub mod sampler;
pub mod spline;
pub mod stats;
pub mod traits;

pub use error::Result;
pub use error::StocProcError;
pub use fourier::FourierConfig;
pub use fourier::FourierModel;
pub use fourier::FrequencyGrid;
pub use kle::GridSize;
pub use kle::KleConfig;
pub use kle::KleModel;
pub use model::Diagnostics;
pub use model::ExpansionMethod;
pub use model::Method;
pub use model::StocProc;
pub use quadrature::QuadratureRule;
pub use sampler::draw_coefficients;
pub use sampler::sample;
pub use sampler::sample_with;
pub use sampler::Noise;
pub use sampler::Realization;
pub use sampler::StocProcSampler;
pub use sampler::TimeQuery;
pub use traits::Autocorrelation;
pub use traits::HermitianEigenSolver;
pub use traits::Interpolant;
pub use traits::ProcessExt;
pub use traits::ProcessModel;
pub use traits::SpectralDensity;

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use rand::rngs::StdRng;
use rand::SeedableRng;
use stocproc::correlation::ExponentialCorrelation;
use stocproc::correlation::GaussianCorrelation;
use stocproc::kle::EigenSolverKind;
use stocproc::kle::SubspaceIteration;
use stocproc::FourierConfig;
use stocproc::FrequencyGrid;
use stocproc::GridSize;
use stocproc::KleConfig;
use stocproc::Method;
use stocproc::Noise;
use stocproc::ProcessModel;
use stocproc::StocProc;
use stocproc::StocProcSampler;
use stocproc::TimeQuery;

fn bench_build(c: &mut Criterion) {
  let mut group = c.benchmark_group("Build");
  group.measurement_time(Duration::from_secs(5));
  group.warm_up_time(Duration::from_millis(500));
  group.sample_size(10);

  let alpha = ExponentialCorrelation::default();
  for &n in &[129usize, 257] {
    group.bench_with_input(BenchmarkId::new("kle/dense", n), &n, |b, &n| {
      let config = KleConfig {
        grid: GridSize::Fixed(n),
        ..KleConfig::new(5.0, 5e-2)
      };
      b.iter(|| black_box(StocProc::new_kle(&alpha, config).map(|p| p.num_modes())))
    });

    group.bench_with_input(BenchmarkId::new("kle/subspace", n), &n, |b, &n| {
      let config = KleConfig {
        grid: GridSize::Fixed(n),
        solver: EigenSolverKind::Subspace(SubspaceIteration {
          num_modes: 64,
          ..Default::default()
        }),
        ..KleConfig::new(5.0, 5e-2)
      };
      b.iter(|| black_box(StocProc::new_kle(&alpha, config).map(|p| p.num_modes())))
    });
  }

  group.bench_function("fourier", |b| {
    let config = FourierConfig {
      negative_frequencies: true,
      ..FourierConfig::new(5.0, 5e-2)
    };
    b.iter(|| black_box(StocProc::build(&alpha, Method::Fourier(config)).map(|p| p.num_modes())))
  });

  group.bench_function("fourier/tanh-sinh", |b| {
    let config = FourierConfig {
      negative_frequencies: true,
      frequency_grid: FrequencyGrid::TanhSinh,
      ..FourierConfig::new(5.0, 5e-2)
    };
    b.iter(|| black_box(StocProc::build(&alpha, Method::Fourier(config)).map(|p| p.num_modes())))
  });

  group.finish();
}

fn bench_sampling(c: &mut Criterion) {
  let mut group = c.benchmark_group("Sampling");
  group.measurement_time(Duration::from_secs(3));
  group.warm_up_time(Duration::from_millis(500));

  let alpha = GaussianCorrelation::new(1.0, 1.0);
  let kle = StocProc::new_kle(&alpha, KleConfig::new(10.0, 1e-3)).unwrap();
  let fourier = StocProc::build(
    &alpha,
    Method::Fourier(FourierConfig {
      negative_frequencies: true,
      ..FourierConfig::new(10.0, 1e-3)
    }),
  )
  .unwrap();

  for (name, process) in [("kle", kle), ("fourier", fourier)] {
    let process = Arc::new(process);
    for &n in &[100usize, 10_000] {
      let sampler = StocProcSampler::new(
        process.clone(),
        TimeQuery::Uniform {
          start: 0.0,
          stop: 10.0,
          count: n,
        },
        Noise::Complex,
      )
      .unwrap();

      group.bench_with_input(BenchmarkId::new(format!("{name}/sample"), n), &n, |b, _| {
        let mut rng = StdRng::seed_from_u64(0);
        b.iter(|| black_box(sampler.sample_with_rng(&mut rng).unwrap()[0]))
      });
    }

    group.bench_function(format!("{name}/sample_par_seeded/64"), |b| {
      let sampler = StocProcSampler::new(
        process.clone(),
        TimeQuery::Uniform {
          start: 0.0,
          stop: 10.0,
          count: 1_000,
        },
        Noise::Complex,
      )
      .unwrap();
      b.iter(|| black_box(sampler.sample_par_seeded(64, 7).unwrap().len()))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_build, bench_sampling);
criterion_main!(benches);

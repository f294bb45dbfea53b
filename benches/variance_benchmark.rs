use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::distr::{Distribution, Uniform};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Duration;
use varspect::{variance_spectrum, CovarianceEigen, FullSvd, PcaBuilder};

#[derive(Clone)]
struct SpectrumConfig {
    seed: u64,
    spectrum_lengths: Vec<usize>,
    matrix_shapes: Vec<(usize, usize)>,
    measurement_time: u64,
    sample_size: usize,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            spectrum_lengths: vec![16, 256, 4096, 65536],
            matrix_shapes: vec![(200, 13), (500, 50), (1000, 100)],
            measurement_time: 5,
            sample_size: 20,
        }
    }
}

fn random_spectrum(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::try_from(0.0..10.0).unwrap();
    (0..len).map(|_| dist.sample(&mut rng)).collect()
}

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::try_from(-1.0..1.0).unwrap();
    Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut rng))
}

fn bench_variance_spectrum(c: &mut Criterion) {
    let config = SpectrumConfig::default();
    let mut group = c.benchmark_group("variance_spectrum");
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);

    for &len in &config.spectrum_lengths {
        let values = random_spectrum(len, config.seed + len as u64);
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, values| {
            b.iter(|| variance_spectrum(values).unwrap());
        });
    }
    group.finish();
}

fn bench_pca_backends(c: &mut Criterion) {
    let config = SpectrumConfig::default();
    let mut group = c.benchmark_group("pca_fit");
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);

    for &(rows, cols) in &config.matrix_shapes {
        let data = random_matrix(rows, cols, config.seed + (rows * cols) as u64);

        group.bench_with_input(
            BenchmarkId::new("covariance_eigen", format!("{rows}x{cols}")),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut pca = PcaBuilder::new(CovarianceEigen).build();
                    pca.fit(data.view()).unwrap();
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("full_svd", format!("{rows}x{cols}")),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut pca = PcaBuilder::new(FullSvd).build();
                    pca.fit(data.view()).unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_variance_spectrum, bench_pca_backends);
criterion_main!(benches);

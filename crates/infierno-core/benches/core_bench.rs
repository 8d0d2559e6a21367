//! Benchmarks for the hot paths of the module graph: the sinc resampler's
//! per-sample dot product and the Butterworth filter.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use infierno_core::{
    BoxedModule, Filter, FilterKind, Module, Mono, Result, SincResampler, SincTable,
};

/// Endless pseudo-audio source: a cheap pair of detuned saws.
struct Saw {
    phase_a: f32,
    phase_b: f32,
}

impl Module<Mono> for Saw {
    fn next(&mut self, out: &mut Mono) -> Result<bool> {
        self.phase_a += 0.0173;
        self.phase_b += 0.0311;
        if self.phase_a > 1.0 {
            self.phase_a -= 2.0;
        }
        if self.phase_b > 1.0 {
            self.phase_b -= 2.0;
        }
        *out = 0.5 * (self.phase_a + self.phase_b);
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        true
    }
}

fn saw() -> BoxedModule<'static, Mono> {
    Box::new(Saw {
        phase_a: 0.0,
        phase_b: 0.3,
    })
}

fn bench_sinc_resampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("sinc_resampler");
    for window in [3u32, 7] {
        group.bench_function(format!("window_{window}"), |b| {
            let mut resampler = SincResampler::new(saw(), window, 11_025, 44_100).unwrap();
            let mut s = 0.0;
            b.iter(|| {
                resampler.next(&mut s).unwrap();
                black_box(s);
            });
        });
    }
    group.finish();
}

fn bench_sinc_table_build(c: &mut Criterion) {
    c.bench_function("sinc_table_obtain_cached", |b| {
        // First call builds; iterations measure the cache hit path.
        let _ = SincTable::obtain(7, 48_000);
        b.iter(|| black_box(SincTable::obtain(7, 48_000)));
    });
}

fn bench_filter(c: &mut Criterion) {
    c.bench_function("butterworth_low_pass", |b| {
        let mut filter = Filter::new(saw(), FilterKind::LowPass, 0.33).unwrap();
        let mut s = 0.0;
        b.iter(|| {
            filter.next(&mut s).unwrap();
            black_box(s);
        });
    });
}

criterion_group!(
    benches,
    bench_sinc_resampler,
    bench_sinc_table_build,
    bench_filter
);
criterion_main!(benches);

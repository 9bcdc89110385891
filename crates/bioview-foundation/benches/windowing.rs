use bioview_foundation::{compute_window, ViewportRange, WindowConfig, WindowingCalculator};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const TOTAL_COUNT_SAMPLES: &[usize] = &[10_000, 1_000_000, 50_000_000];
const LANE_SAMPLES: &[usize] = &[1, 4, 7];
const VIEWPORT: f64 = 1080.0;

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing_compute");
    for &total in TOTAL_COUNT_SAMPLES {
        group.bench_with_input(BenchmarkId::new("table", total), &total, |b, &total| {
            let calculator = WindowingCalculator::new(total, WindowConfig::default(), 0.0);
            let max = calculator.max_scroll_offset(VIEWPORT);
            let mut offset = 0.0;
            b.iter(|| {
                offset = (offset + 997.0) % max.max(1.0);
                black_box(calculator.compute(black_box(offset), VIEWPORT));
            });
        });
    }
    group.finish();
}

fn bench_grid_lanes(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing_grid");
    for &lanes in LANE_SAMPLES {
        group.bench_with_input(BenchmarkId::new("lanes", lanes), &lanes, |b, &lanes| {
            b.iter(|| {
                black_box(compute_window(
                    black_box(1_000_000),
                    black_box(123_456.0),
                    VIEWPORT,
                    280.0,
                    lanes,
                    2,
                ))
            });
        });
    }
    group.finish();
}

fn bench_chunk_span(c: &mut Criterion) {
    c.bench_function("viewport_chunk_span", |b| {
        let mut first = 0usize;
        b.iter(|| {
            first = (first + 37) % 1_000_000;
            black_box(ViewportRange::new(first, first + 44).chunk_span(black_box(500)))
        });
    });
}

criterion_group!(benches, bench_compute, bench_grid_lanes, bench_chunk_span);
criterion_main!(benches);

//! Benchmarks for overlay synthesis and resampling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pattern_overlays::prelude::*;

const DAY: i64 = 86_400;

/// Deterministic daily bars with a few bowl-shaped dips
fn generate_bars(n: usize) -> Vec<PricePoint> {
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0;
    let dip = ((i % 90) as f64 - 45.0).powi(2) * 0.002;
    let o = price;
    let c = price + change;
    let h = o.max(c) + 1.0;
    let l = o.min(c) - 1.0 + dip;

    bars.push(PricePoint::new(i as i64 * DAY, o, h, l.min(o.min(c)), c).with_volume(1_000));
    price = c;
  }

  bars
}

fn generate_markers(n_bars: usize) -> Vec<Marker> {
  (0..n_bars)
    .step_by(15)
    .map(|i| {
      let t = i as i64 * DAY;
      if i % 2 == 0 {
        Marker::new(t).with_pattern_id((i / 90) as i64)
      } else {
        Marker::new(t)
          .with_range(95.0, 105.0, t - 10 * DAY, t)
          .with_direction(BreakDirection::Bullish)
      }
    })
    .collect()
}

fn chart(n: usize) -> ChartInput {
  let bars = generate_bars(n);
  ChartInput::new(PatternKind::Bowl)
    .with_markers(generate_markers(n))
    .with_prices(bars)
    .with_week52_reference()
}

fn bench_plan(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let input = chart(1000);

  c.bench_function("plan_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.plan(black_box(&input)));
    })
  });
}

fn bench_recompute(c: &mut Criterion) {
  let mut engine = EngineBuilder::new().build().unwrap();
  let input = chart(1000);

  c.bench_function("recompute_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.recompute(black_box(&input)));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();

  let mut group = c.benchmark_group("scaling");

  for size in [250, 1000, 5000].iter() {
    let input = chart(*size);

    group.bench_with_input(BenchmarkId::new("plan", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.plan(black_box(&input)));
      })
    });
  }

  group.finish();
}

fn bench_plan_parallel(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let charts: Vec<ChartInput> = (0..4).map(|_| chart(1000)).collect();
  let instruments: Vec<(&str, &ChartInput)> =
    ["SYM1", "SYM2", "SYM3", "SYM4"].into_iter().zip(charts.iter()).collect();

  c.bench_function("plan_parallel_4_charts", |b| {
    b.iter(|| {
      let _ = black_box(plan_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

fn bench_resample(c: &mut Criterion) {
  let bars = generate_bars(2500);

  c.bench_function("resample_weekly_2500_days", |b| {
    b.iter(|| {
      let _ = black_box(resample_weekly(black_box(&bars), &CalendarZone::Utc));
    })
  });
}

criterion_group!(
  benches,
  bench_plan,
  bench_recompute,
  bench_scaling,
  bench_plan_parallel,
  bench_resample,
);

criterion_main!(benches);

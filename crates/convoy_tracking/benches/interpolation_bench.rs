use std::hint::black_box;

use convoy_routing::{coordinate::Coordinate, meters::Meters, route_plan::RoutePlan};
use convoy_tracking::interpolator::interpolate;
use criterion::{Criterion, criterion_group, criterion_main};
use jiff::SignedDuration;

fn winding_route(points: usize) -> RoutePlan {
    let polyline = (0..points)
        .map(|i| {
            let t = i as f64 / points as f64;
            Coordinate::new(-118.2437 - 4.2 * t, 34.0522 + 3.7 * t + 0.01 * (i as f64).sin())
        })
        .collect();

    RoutePlan::new(polyline, Meters::ZERO, SignedDuration::from_secs(21_600), vec![])
}

fn interpolation_benchmark(c: &mut Criterion) {
    for points in [100, 1_000, 10_000] {
        let plan = winding_route(points);

        c.bench_function(&format!("interpolate ({points} vertices)"), |b| {
            let mut progress = 0.0;
            b.iter(|| {
                progress = (progress + 0.000_37) % 1.0;
                interpolate(black_box(&plan), black_box(progress))
            })
        });
    }
}

criterion_group!(benches, interpolation_benchmark);
criterion_main!(benches);

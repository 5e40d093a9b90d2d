use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use cerebro_scout::intent::detect_heuristic_plan;
use cerebro_scout::resolve::{normalize_name, score_name_similarity};
use cerebro_scout::thresholds::percentile_nearest_rank;

fn bench_normalize(c: &mut Criterion) {
    let raw = "D'Angelo   RUSSELL, Jr. (State University)";
    c.bench_function("normalize_name", |b| {
        b.iter(|| {
            let normalized = normalize_name(black_box(raw));
            black_box(normalized.len());
        })
    });
}

fn bench_similarity(c: &mut Criterion) {
    c.bench_function("score_name_similarity", |b| {
        b.iter(|| {
            let score =
                score_name_similarity(black_box("Jayln Marcus Green"), black_box("Jalen Green"));
            black_box(score);
        })
    });
}

fn bench_percentile(c: &mut Criterion) {
    let values: Vec<f64> = (0..10_000).map(|v| ((v * 31) % 997) as f64 / 7.0).collect();
    c.bench_function("percentile_nearest_rank_10k", |b| {
        b.iter(|| {
            let threshold = percentile_nearest_rank(black_box(&values), 0.90);
            black_box(threshold);
        })
    });
}

fn bench_heuristic_routing(c: &mut Criterion) {
    let messages = [
        "who is the best PG by assists",
        "most effective centers this season",
        "tell me about Jane Doe",
        "top 5 rebounders among power forwards",
    ];
    c.bench_function("detect_heuristic_plan", |b| {
        b.iter(|| {
            for message in &messages {
                black_box(detect_heuristic_plan(black_box(message)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_similarity,
    bench_percentile,
    bench_heuristic_routing
);
criterion_main!(benches);

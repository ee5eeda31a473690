// ABOUTME: Criterion benchmarks for the per-sample detection hot path
// ABOUTME: Measures sample parsing, rule-based scoring and detector updates over a full exam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Criterion benchmarks for the detection hot path.
//!
//! Each live sample is parsed, scored over the buffered history and folded
//! into the detector, so these three steps bound per-session throughput.

#![allow(
    clippy::missing_docs_in_private_items,
    clippy::unwrap_used,
    missing_docs
)]

use cpet_core::models::Sample;
use cpet_detection::{DetectionSession, DetectorConfig, RuleBasedScorer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

/// Ramp protocol: ten seconds per breath, work rate and RER rising together
fn ramp_exam(samples: usize) -> Vec<Sample> {
    (0..samples)
        .map(|i| {
            let t = i as f64 * 10.0;
            let progress = i as f64 / samples as f64;
            Sample::builder(t)
                .vo2(0.4f64.mul_add(progress, 0.8) * 1000.0)
                .vco2(0.5f64.mul_add(progress, 0.7) * 1000.0)
                .ve(60.0f64.mul_add(progress * progress, 20.0))
                .hr(90.0f64.mul_add(progress, 80.0))
                .rer(0.35f64.mul_add(progress, 0.82))
                .work_rate(if i < 6 { 0.0 } else { 250.0 * progress })
                .build()
                .unwrap()
        })
        .collect()
}

fn bench_sample_parsing(c: &mut Criterion) {
    let payload = json!({
        "type": "sample",
        "timestamp": 125.0,
        "vo2": 1850.0,
        "vco2": 1900.0,
        "ve": 62.5,
        "hr": 151,
        "bf": 31,
        "rer": 1.03,
        "power_load": 180,
        "spo2": 97,
        "peto2": 108.2,
        "petco2": 38.9
    });

    c.bench_function("sample_from_json", |b| {
        b.iter(|| Sample::from_json(black_box(&payload)).unwrap());
    });
}

fn bench_rule_based_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_based_scoring");
    for history in [20_usize, 60, 120] {
        let samples = ramp_exam(history);
        group.throughput(Throughput::Elements(history as u64));
        group.bench_with_input(BenchmarkId::from_parameter(history), &samples, |b, samples| {
            b.iter(|| RuleBasedScorer::latest_probability(black_box(samples)));
        });
    }
    group.finish();
}

fn bench_full_exam(c: &mut Criterion) {
    let exam = ramp_exam(90);
    let mut group = c.benchmark_group("detector");
    group.throughput(Throughput::Elements(exam.len() as u64));
    group.bench_function("ingest_score_update_90_samples", |b| {
        b.iter(|| {
            let mut detector = DetectionSession::new(DetectorConfig::default());
            for sample in &exam {
                let warmup = detector.is_warmup(sample);
                detector.ingest(sample.clone());
                if warmup {
                    continue;
                }
                let history = detector.history_snapshot();
                let probability = RuleBasedScorer::latest_probability(&history);
                black_box(detector.update(probability, None, Some(sample.work_rate())));
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sample_parsing,
    bench_rule_based_scoring,
    bench_full_exam
);
criterion_main!(benches);

//! Benchmarks for intent detection and full turns.
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use facility_intents::context::InMemoryContextStore;
use facility_intents::core::config::{DetectionConfig, PipelineConfig};
use facility_intents::detect::{IntentClassifier, IntentDetector};
use facility_intents::pipeline::Pipeline;
use facility_intents::registry::IntentRegistry;
use facility_intents::Utterance;
use std::path::Path;
use std::sync::Arc;

const UTTERANCES: &[(&str, &str)] = &[
    ("ready", "turn off lighting in room 204"),
    ("missing_slot", "turn off lighting"),
    ("conversion", "set temperature in room 204 to 72°F"),
    ("rejected", "sing me a song"),
];

fn catalog() -> Arc<IntentRegistry> {
    let mut registry = IntentRegistry::new();
    registry
        .load_directory(&Path::new(env!("CARGO_MANIFEST_DIR")).join("data/intents"))
        .expect("shipped catalog loads");
    Arc::new(registry)
}

fn bench_detection(c: &mut Criterion) {
    let registry = catalog();
    let detector = IntentDetector::new(DetectionConfig::default());
    let mut group = c.benchmark_group("detect");

    for (label, text) in UTTERANCES {
        group.bench_with_input(BenchmarkId::from_parameter(label), text, |b, text| {
            b.iter(|| black_box(detector.detect(black_box(text), &registry)));
        });
    }

    group.finish();
}

fn bench_process(c: &mut Criterion) {
    let pipeline = Pipeline::new(
        catalog(),
        Arc::new(InMemoryContextStore::new()),
        PipelineConfig::default(),
    );
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let mut group = c.benchmark_group("process");

    for (label, text) in UTTERANCES {
        let utterance = Utterance::new(*text, "bench", now);
        group.bench_with_input(BenchmarkId::from_parameter(label), &utterance, |b, u| {
            b.iter(|| black_box(pipeline.process(black_box(u))));
        });
    }

    // Many sessions at once through the rayon batch path
    for sessions in [16, 256] {
        let batch: Vec<Utterance> = (0..sessions)
            .map(|i| Utterance::new("turn off lighting in room 204", format!("s{}", i), now))
            .collect();
        group.bench_with_input(BenchmarkId::new("batch", sessions), &batch, |b, batch| {
            b.iter(|| black_box(pipeline.process_batch(black_box(batch))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_detection, bench_process);
criterion_main!(benches);

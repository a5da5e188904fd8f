use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dactilo::feature_extractor::FeatureExtractor;
use dactilo::types::{
    FeatureVector, Handedness, Landmark, FEATURE_LEN, HIDDEN_1, HIDDEN_2, NUM_CLASSES,
    NUM_LANDMARKS,
};
use dactilo::InferenceEngine;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn random_engine() -> InferenceEngine {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut layer = |inputs: usize, outputs: usize| {
        let kernel: Vec<Vec<f32>> = (0..inputs)
            .map(|_| (0..outputs).map(|_| rng.gen_range(-0.3..0.3)).collect())
            .collect();
        json!({ "kernel": kernel, "bias": vec![0.0; outputs] })
    };
    let weights = json!({
        "dense": layer(FEATURE_LEN, HIDDEN_1),
        "dense_1": layer(HIDDEN_1, HIDDEN_2),
        "dense_2": layer(HIDDEN_2, NUM_CLASSES),
    });

    let engine = InferenceEngine::new();
    engine.load(&weights.to_string()).unwrap();
    engine
}

fn random_landmarks(rng: &mut impl Rng) -> Vec<Landmark> {
    (0..NUM_LANDMARKS)
        .map(|_| Landmark::new(rng.gen(), rng.gen(), rng.gen_range(-0.1..0.1)))
        .collect()
}

fn benchmark_predict(c: &mut Criterion) {
    let engine = random_engine();
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let features = FeatureExtractor::new()
        .extract(&random_landmarks(&mut rng), Handedness::Right)
        .unwrap();

    c.bench_function("predict_single_frame", |b| {
        b.iter(|| engine.predict(black_box(&features)).unwrap())
    });
}

fn benchmark_predict_batch(c: &mut Criterion) {
    let engine = random_engine();
    let extractor = FeatureExtractor::new();
    let mut rng = rand::rngs::StdRng::seed_from_u64(13);

    // ~1 s de video a 30 fps
    let batch: Vec<FeatureVector> = (0..30)
        .map(|_| {
            extractor
                .extract(&random_landmarks(&mut rng), Handedness::Left)
                .unwrap()
        })
        .collect();

    c.bench_function("predict_batch_30_frames", |b| {
        b.iter(|| engine.predict_batch(black_box(&batch)))
    });
}

criterion_group!(benches, benchmark_predict, benchmark_predict_batch);
criterion_main!(benches);

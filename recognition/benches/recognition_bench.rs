use criterion::{black_box, criterion_group, criterion_main, Criterion};
use facerec_recognition::{EngineConfig, RecognitionEngine, Strategy};
use facerec_spatial::l2_normalize;

fn random_unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    l2_normalize(&mut v);
    v
}

fn make_cluster(centroid: &[f32], n: usize, noise: f32, base_seed: u64) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            let rvec = random_unit_vec(centroid.len(), base_seed.wrapping_add(i as u64 * 997));
            let mut v: Vec<f32> = centroid.iter().zip(&rvec).map(|(c, r)| c + r * noise).collect();
            l2_normalize(&mut v);
            v
        })
        .collect()
}

fn populated_engine(dim: usize, people: usize, faces: usize) -> RecognitionEngine {
    let engine = RecognitionEngine::with_memory_index(EngineConfig {
        dim,
        ..EngineConfig::default()
    });
    for p in 0..people {
        let centroid = random_unit_vec(dim, p as u64 + 1);
        for emb in make_cluster(&centroid, faces, 0.1, (p as u64 + 1) * 1000) {
            let mut identity = engine.new_identity(&emb);
            identity.set_label(&format!("person-{p}"));
            let _ = engine.save_identity(identity);
        }
    }
    engine
}

fn bench_find_identity(c: &mut Criterion) {
    let dim = 128;
    let engine = populated_engine(dim, 50, 10);
    let query = make_cluster(&random_unit_vec(dim, 7), 1, 0.1, 424_242).remove(0);

    for (strategy, threshold) in [
        (Strategy::Cosine, 0.7),
        (Strategy::L2Norm, 0.6),
        (Strategy::TreeVote, 5.0),
        (Strategy::NearestNeighborClassifier, 0.0),
    ] {
        // Train once outside the measurement.
        let _ = engine.find_identity(&query, strategy, threshold);
        c.bench_function(&format!("find_identity_{strategy}_128d_500"), |b| {
            b.iter(|| {
                let _ = black_box(engine.find_identity(black_box(&query), strategy, threshold));
            });
        });
    }
}

fn bench_save_identity(c: &mut Criterion) {
    let dim = 128;
    let faces: Vec<Vec<f32>> = (0..200).map(|i| random_unit_vec(dim, i + 1)).collect();

    c.bench_function("save_identity_128d_200", |b| {
        b.iter(|| {
            let engine = RecognitionEngine::with_memory_index(EngineConfig {
                dim,
                ..EngineConfig::default()
            });
            for (i, emb) in faces.iter().enumerate() {
                let mut identity = engine.new_identity(emb);
                identity.set_label(&format!("person-{}", i % 20));
                let _ = black_box(engine.save_identity(identity));
            }
        });
    });
}

criterion_group!(benches, bench_find_identity, bench_save_identity);
criterion_main!(benches);

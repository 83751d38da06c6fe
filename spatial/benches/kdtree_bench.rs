use criterion::{black_box, criterion_group, criterion_main, Criterion};
use facerec_spatial::{KdTree, SpatialIndex, SpatialStore};

fn random_unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    facerec_spatial::l2_normalize(&mut v);
    v
}

fn bench_insert(c: &mut Criterion) {
    let dim = 128;
    let points: Vec<Vec<f32>> = (0..1000).map(|i| random_unit_vec(dim, i + 1)).collect();

    c.bench_function("kdtree_insert_128d_1000", |b| {
        b.iter(|| {
            let tree = KdTree::new(dim);
            for (i, p) in points.iter().enumerate() {
                let _ = black_box(tree.insert(p, i as u64));
            }
        });
    });
}

fn bench_query(c: &mut Criterion) {
    let dim = 128;
    let tree = KdTree::new(dim);
    for i in 0..5000u64 {
        let _ = tree.insert(&random_unit_vec(dim, i + 1), i);
    }
    let query = random_unit_vec(dim, 999_999);

    c.bench_function("kdtree_knn5_128d_5000", |b| {
        b.iter(|| {
            let _ = black_box(tree.closest_neighbors(black_box(&query), 1.0, 5));
        });
    });
}

fn bench_store_query(c: &mut Criterion) {
    let dim = 128;
    let dir = tempfile::tempdir().unwrap();
    let store = SpatialStore::open(dir.path().join("bench.redb"), dim).unwrap();
    for i in 0..500u64 {
        let _ = store.insert(&random_unit_vec(dim, i + 1), i);
    }
    let query = random_unit_vec(dim, 424_242);

    c.bench_function("spatial_store_knn5_128d_500", |b| {
        b.iter(|| {
            let _ = black_box(store.closest_neighbors(black_box(&query), 1.0, 5));
        });
    });
}

criterion_group!(benches, bench_insert, bench_query, bench_store_query);
criterion_main!(benches);

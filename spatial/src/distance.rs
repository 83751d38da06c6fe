/// Squared Euclidean distance between two vectors.
///
/// Accumulates in f64. Only the common prefix is compared when the
/// lengths differ; callers validate dimensions before calling.
pub fn sq_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum()
}

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Uses f64 intermediate precision.
/// Returns 0.0 for zero vectors or dimension mismatches.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let ai = x as f64;
        let bi = y as f64;
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Clamp to [-1, 1] to handle floating point errors.
    similarity.clamp(-1.0, 1.0) as f32
}

/// Cosine distance, `1 - cosine_similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let s = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= s;
        }
    }
}

/// Smallest squared distance from `query` to any point of the axis-aligned
/// box `[min, max]`.
///
/// Axes where the query lies inside the box contribute nothing; elsewhere
/// the gap to the nearer face is squared and summed.
pub fn box_sq_distance(query: &[f32], min: &[f32], max: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for ((&q, &lo), &hi) in query.iter().zip(min.iter()).zip(max.iter()) {
        let q = q as f64;
        let below = (lo as f64 - q).max(0.0);
        let above = (q - hi as f64).max(0.0);
        sum += below * below + above * above;
    }
    sum
}

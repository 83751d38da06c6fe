use std::collections::VecDeque;

use facerec_spatial::l2_normalize;

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

const UNVISITED: i32 = 0;

/// Groups face embeddings with DBSCAN over cosine distance.
///
/// `eps` is the largest cosine distance (`1 - similarity`) at which two
/// faces count as neighbors; a point with at least `min_samples` neighbors
/// (itself included) seeds or extends a cluster.
///
/// Returns one label per embedding: [`NOISE`] for outliers, clusters
/// numbered from 1 in discovery order.
///
/// Embeddings are scaled to unit length once up front, so every neighbor
/// test in the O(n²) scan is a bare dot product instead of a cosine that
/// recomputes both norms. A zero embedding stays zero and sits at distance
/// 1 from everything.
pub fn cluster(embeddings: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<i32> {
    let normed: Vec<Vec<f32>> = embeddings
        .iter()
        .map(|emb| {
            let mut v = emb.clone();
            l2_normalize(&mut v);
            v
        })
        .collect();

    let n = normed.len();
    let mut labels = vec![UNVISITED; n];
    let mut cluster_id: i32 = 0;

    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }

        let neighbors = range_query(&normed, i, eps);
        if neighbors.len() < min_samples {
            labels[i] = NOISE;
            continue;
        }

        cluster_id += 1;
        labels[i] = cluster_id;

        let mut seeds: VecDeque<usize> = neighbors.into_iter().filter(|&j| j != i).collect();
        while let Some(q) = seeds.pop_front() {
            if labels[q] == NOISE {
                // Border point: joins the cluster but does not expand it.
                labels[q] = cluster_id;
                continue;
            }
            if labels[q] != UNVISITED {
                continue;
            }
            labels[q] = cluster_id;

            let q_neighbors = range_query(&normed, q, eps);
            if q_neighbors.len() >= min_samples {
                seeds.extend(q_neighbors);
            }
        }
    }

    labels
}

/// Number of clusters in a label vector produced by [`cluster`].
pub fn cluster_count(labels: &[i32]) -> usize {
    labels.iter().copied().max().unwrap_or(0).max(0) as usize
}

/// Indices of all unit vectors within `eps` cosine distance of
/// `vectors[idx]`.
fn range_query(vectors: &[Vec<f32>], idx: usize, eps: f32) -> Vec<usize> {
    let q = &vectors[idx];
    vectors
        .iter()
        .enumerate()
        .filter(|(_, v)| 1.0 - dot(q, v) <= eps)
        .map(|(i, _)| i)
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_tight_groups() {
        let faces = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.1, 0.0],
            vec![0.98, 0.15, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.1, 0.99, 0.0],
            vec![0.15, 0.98, 0.0],
        ];

        let labels = cluster(&faces, 0.3, 2);
        assert_eq!(labels.len(), 6);
        assert!(labels[0] > 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert!(labels[3] > 0);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(cluster_count(&labels), 2);
    }

    #[test]
    fn test_lone_face_is_noise() {
        let labels = cluster(&[vec![1.0, 0.0, 0.0]], 0.1, 2);
        assert_eq!(labels, vec![NOISE]);
        assert_eq!(cluster_count(&labels), 0);
    }

    #[test]
    fn test_scale_does_not_matter() {
        // Same direction, different magnitude: cosine sees one face.
        let labels = cluster(&[vec![1.0, 1.0], vec![5.0, 5.0], vec![-3.0, 0.2]], 0.05, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], NOISE);
    }

    #[test]
    fn test_zero_embedding_is_noise() {
        let labels = cluster(&[vec![0.0, 0.0], vec![0.0, 0.0], vec![1.0, 0.0]], 0.5, 2);
        assert_eq!(labels, vec![NOISE, NOISE, NOISE]);
        // Only eps >= 1 reaches a zero embedding.
        let labels = cluster(&[vec![0.0, 0.0], vec![1.0, 0.0]], 1.0, 2);
        assert_eq!(labels, vec![1, 1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(&[], 0.1, 2).is_empty());
    }
}

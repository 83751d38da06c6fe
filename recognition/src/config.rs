use std::path::PathBuf;

use serde::Deserialize;

use crate::classifier::{KnnParams, LinearParams};

/// Configuration for a [`RecognitionEngine`](crate::RecognitionEngine).
///
/// Zero values are replaced by defaults, so a partially filled config (or
/// one deserialized from a short YAML file) is always usable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Embedding dimension. Default: 128.
    pub dim: usize,

    /// Initial squared search radius for tree-vote queries, also the
    /// distance at which a neighbor's vote drops to zero. Default: 1.0.
    pub tree_radius: f64,

    /// Neighbors consulted by the nearest-neighbor classifier. Default: 3.
    pub knn_k: usize,

    /// Regularization of the linear classifier. Default: 1e-4.
    pub svm_lambda: f64,

    /// Training passes of the linear classifier. Default: 50.
    pub svm_epochs: usize,

    /// DBSCAN neighborhood as cosine distance. Default: 0.3.
    pub cluster_eps: f32,

    /// DBSCAN core-point size. Default: 3.
    pub cluster_min_samples: usize,

    /// Where trained classifiers are saved and loaded from. None keeps
    /// them in memory only.
    pub model_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.dim == 0 {
            self.dim = 128;
        }
        if self.tree_radius <= 0.0 {
            self.tree_radius = 1.0;
        }
        if self.knn_k == 0 {
            self.knn_k = 3;
        }
        if self.svm_lambda <= 0.0 {
            self.svm_lambda = 1e-4;
        }
        if self.svm_epochs == 0 {
            self.svm_epochs = 50;
        }
        if self.cluster_eps <= 0.0 {
            self.cluster_eps = 0.3;
        }
        if self.cluster_min_samples == 0 {
            self.cluster_min_samples = 3;
        }
        self
    }

    pub(crate) fn linear_params(&self) -> LinearParams {
        LinearParams {
            lambda: self.svm_lambda,
            epochs: self.svm_epochs,
            ..LinearParams::default()
        }
    }

    pub(crate) fn knn_params(&self) -> KnnParams {
        KnnParams { k: self.knn_k }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_get_defaults() {
        let cfg = EngineConfig::default().with_defaults();
        assert_eq!(cfg.dim, 128);
        assert_eq!(cfg.tree_radius, 1.0);
        assert_eq!(cfg.knn_k, 3);
        assert_eq!(cfg.svm_epochs, 50);
        assert_eq!(cfg.cluster_min_samples, 3);
        assert!(cfg.model_dir.is_none());
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let cfg = EngineConfig {
            dim: 2,
            knn_k: 5,
            ..EngineConfig::default()
        }
        .with_defaults();
        assert_eq!(cfg.dim, 2);
        assert_eq!(cfg.knn_k, 5);
        assert_eq!(cfg.svm_lambda, 1e-4);
    }

    #[test]
    fn test_partial_json() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"dim": 64, "model_dir": "/tmp/models"}"#).unwrap();
        let cfg = cfg.with_defaults();
        assert_eq!(cfg.dim, 64);
        assert_eq!(cfg.tree_radius, 1.0);
        assert_eq!(cfg.model_dir, Some(PathBuf::from("/tmp/models")));
    }
}

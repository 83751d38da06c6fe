use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::{Classifier, TrainingSet};
use crate::RecognitionError;

/// Training parameters for [`LinearClassifier`].
#[derive(Debug, Clone)]
pub struct LinearParams {
    /// Regularization strength.
    pub lambda: f64,
    /// Passes over the training set per class.
    pub epochs: usize,
    /// Seed for the sample order, so training is reproducible.
    pub seed: u64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            lambda: 1e-4,
            epochs: 50,
            seed: 0x5eed,
        }
    }
}

/// One-vs-rest linear SVM trained with Pegasos.
///
/// One hyperplane per label; the prediction is the label whose hyperplane
/// scores the embedding highest. The bias is folded into the weights as a
/// constant trailing feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    labels: Vec<String>,
    dim: usize,
    /// `weights[c]` has `dim + 1` entries; the last is the bias.
    weights: Vec<Vec<f32>>,
}

impl LinearClassifier {
    /// Decision value of every class for `embedding`.
    pub fn scores(&self, embedding: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .map(|w| {
                let dot: f32 = w.iter().zip(embedding).map(|(a, b)| a * b).sum();
                dot + w.get(self.dim).copied().unwrap_or(0.0)
            })
            .collect()
    }
}

impl Classifier for LinearClassifier {
    type Params = LinearParams;

    const FILE_NAME: &'static str = "linear_classifier.json";

    fn train(set: &TrainingSet, params: &LinearParams) -> Result<Self, RecognitionError> {
        let dim = match set.samples.first() {
            Some((_, emb)) => emb.len(),
            None => return Err(RecognitionError::Classifier("nothing to train on".into())),
        };
        if params.lambda <= 0.0 || !params.lambda.is_finite() {
            return Err(RecognitionError::Classifier(format!(
                "lambda must be positive, got {}",
                params.lambda
            )));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut order: Vec<usize> = (0..set.samples.len()).collect();
        let radius = 1.0 / params.lambda.sqrt();
        let mut weights = Vec::with_capacity(set.labels.len());

        for class in 0..set.labels.len() {
            let mut w = vec![0.0f64; dim + 1];
            let mut t = 0u64;
            for _ in 0..params.epochs.max(1) {
                order.shuffle(&mut rng);
                for &i in &order {
                    let (label, x) = &set.samples[i];
                    t += 1;
                    let eta = 1.0 / (params.lambda * t as f64);
                    let y = if *label == class { 1.0 } else { -1.0 };

                    let margin = y * dot_with_bias(&w, x);
                    let shrink = 1.0 - eta * params.lambda;
                    w.iter_mut().for_each(|v| *v *= shrink);
                    if margin < 1.0 {
                        for (wj, xj) in w.iter_mut().zip(x) {
                            *wj += eta * y * f64::from(*xj);
                        }
                        w[dim] += eta * y;
                    }

                    // Project back onto the ball of radius 1/sqrt(lambda).
                    let norm = w.iter().map(|v| v * v).sum::<f64>().sqrt();
                    if norm > radius {
                        let scale = radius / norm;
                        w.iter_mut().for_each(|v| *v *= scale);
                    }
                }
            }
            weights.push(w.into_iter().map(|v| v as f32).collect());
        }

        Ok(Self {
            labels: set.labels.clone(),
            dim,
            weights,
        })
    }

    fn predict(&self, embedding: &[f32]) -> Option<usize> {
        if embedding.len() != self.dim {
            return None;
        }
        self.scores(embedding)
            .into_iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn dot_with_bias(w: &[f64], x: &[f32]) -> f64 {
    let dot: f64 = w[..w.len() - 1].iter().zip(x).map(|(a, b)| a * f64::from(*b)).sum();
    dot + w[w.len() - 1]
}

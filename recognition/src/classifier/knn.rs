use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Classifier, TrainingSet};
use crate::RecognitionError;
use facerec_spatial::sq_distance;

/// Training parameters for [`NearestNeighborClassifier`].
#[derive(Debug, Clone)]
pub struct KnnParams {
    /// Neighbors consulted per prediction.
    pub k: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { k: 3 }
    }
}

/// Majority vote among the `k` nearest stored samples.
///
/// Ties between labels with the same vote count go to the label whose
/// voters are closer in total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestNeighborClassifier {
    labels: Vec<String>,
    k: usize,
    samples: Vec<Vec<f32>>,
    sample_labels: Vec<usize>,
}

impl Classifier for NearestNeighborClassifier {
    type Params = KnnParams;

    const FILE_NAME: &'static str = "knn_classifier.json";

    fn train(set: &TrainingSet, params: &KnnParams) -> Result<Self, RecognitionError> {
        if set.is_empty() {
            return Err(RecognitionError::Classifier("nothing to train on".into()));
        }
        if params.k == 0 {
            return Err(RecognitionError::Classifier("k must be at least 1".into()));
        }
        let (sample_labels, samples): (Vec<usize>, Vec<Vec<f32>>) = set.samples.iter().cloned().unzip();
        Ok(Self {
            labels: set.labels.clone(),
            k: params.k,
            samples,
            sample_labels,
        })
    }

    fn predict(&self, embedding: &[f32]) -> Option<usize> {
        let mut dists: Vec<(f64, usize)> = self
            .samples
            .iter()
            .zip(&self.sample_labels)
            .filter(|(s, _)| s.len() == embedding.len())
            .map(|(s, &label)| (sq_distance(s, embedding), label))
            .collect();
        if dists.is_empty() {
            return None;
        }
        let k = self.k.min(dists.len());
        dists.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));

        // label -> (votes, summed distance)
        let mut votes: HashMap<usize, (usize, f64)> = HashMap::new();
        for &(d, label) in &dists[..k] {
            let v = votes.entry(label).or_insert((0, 0.0));
            v.0 += 1;
            v.1 += d;
        }
        votes
            .into_iter()
            .max_by(|(la, a), (lb, b)| {
                a.0.cmp(&b.0)
                    .then_with(|| b.1.total_cmp(&a.1))
                    .then_with(|| lb.cmp(la))
            })
            .map(|(label, _)| label)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> TrainingSet {
        TrainingSet {
            labels: vec!["alice".into(), "bob".into()],
            samples: vec![
                (0, vec![0.0, 0.0]),
                (0, vec![0.1, 0.0]),
                (0, vec![0.0, 0.1]),
                (1, vec![5.0, 5.0]),
                (1, vec![5.1, 5.0]),
            ],
        }
    }

    #[test]
    fn test_majority_vote() {
        let model = NearestNeighborClassifier::train(&set(), &KnnParams { k: 3 }).unwrap();
        assert_eq!(model.predict_label(&[0.05, 0.05]), Some("alice"));
        assert_eq!(model.predict_label(&[4.9, 5.2]), Some("bob"));
        // Two of the three nearest are bob even though alice is closer overall.
        assert_eq!(model.predict_label(&[3.0, 3.0]), Some("bob"));
    }

    #[test]
    fn test_tie_goes_to_closer_label() {
        let set = TrainingSet {
            labels: vec!["alice".into(), "bob".into()],
            samples: vec![(0, vec![1.0]), (1, vec![3.0])],
        };
        let model = NearestNeighborClassifier::train(&set, &KnnParams { k: 2 }).unwrap();
        assert_eq!(model.predict_label(&[1.5]), Some("alice"));
        assert_eq!(model.predict_label(&[2.6]), Some("bob"));
    }

    #[test]
    fn test_k_larger_than_samples() {
        let model = NearestNeighborClassifier::train(&set(), &KnnParams { k: 50 }).unwrap();
        assert_eq!(model.predict_label(&[5.0, 5.0]), Some("alice"), "3 votes beat 2");
    }

    #[test]
    fn test_bad_input() {
        assert!(NearestNeighborClassifier::train(&TrainingSet::default(), &KnnParams::default()).is_err());
        assert!(NearestNeighborClassifier::train(&set(), &KnnParams { k: 0 }).is_err());
        let model = NearestNeighborClassifier::train(&set(), &KnnParams::default()).unwrap();
        assert_eq!(model.predict(&[1.0, 2.0, 3.0]), None);
    }
}

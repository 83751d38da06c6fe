//! Trainable classifiers over the face library.
//!
//! Each model is trained from every registered embedding and predicts a
//! label index into the label list it was trained on. Models are wrapped
//! in [`Trainable`], which tracks whether a usable model exists and loads
//! or saves it as JSON.

mod knn;
mod linear;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::RecognitionError;
use crate::library::FaceLibrary;

pub use knn::{KnnParams, NearestNeighborClassifier};
pub use linear::{LinearClassifier, LinearParams};

/// Embeddings paired with label indices, ready for training.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    /// Label names; sample label `i` refers to `labels[i]`.
    pub labels: Vec<String>,
    pub samples: Vec<(usize, Vec<f32>)>,
}

impl TrainingSet {
    /// Collects every identity of the library with a parseable embedding
    /// of dimension `dim`. Others are skipped with a warning.
    pub fn from_library(library: &FaceLibrary, dim: usize) -> Self {
        let labels = library.labels().into_iter().map(String::from).collect();
        let mut samples = Vec::with_capacity(library.len());
        for (idx, identity) in library.iter() {
            match identity.embedding() {
                Ok(emb) if emb.len() == dim => samples.push((idx, emb)),
                Ok(emb) => warn!(
                    id = identity.id,
                    got = emb.len(),
                    want = dim,
                    "skipping identity with wrong embedding dimension"
                ),
                Err(e) => warn!(id = identity.id, error = %e, "skipping identity"),
            }
        }
        Self { labels, samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A model that can be trained on a [`TrainingSet`] and persisted.
pub trait Classifier: Serialize + DeserializeOwned + Sized {
    type Params;

    /// File name the model is stored under inside the model directory.
    const FILE_NAME: &'static str;

    fn train(set: &TrainingSet, params: &Self::Params) -> Result<Self, RecognitionError>;

    /// Predicted label index, or None when the model cannot decide.
    fn predict(&self, embedding: &[f32]) -> Option<usize>;

    /// Label names the model was trained on.
    fn labels(&self) -> &[String];

    /// Predicted label name. Indices outside the trained label list yield
    /// None instead of panicking.
    fn predict_label(&self, embedding: &[f32]) -> Option<&str> {
        let idx = self.predict(embedding)?;
        self.labels().get(idx).map(String::as_str)
    }
}

/// Whether a classifier currently holds a usable model.
#[derive(Debug)]
pub enum ClassifierState<M> {
    Untrained,
    Trained(M),
}

/// A classifier together with its training state and parameters.
///
/// Trains lazily: the first [`Trainable::ensure_trained`] after creation or
/// after [`Trainable::invalidate`] rebuilds the model from the library.
#[derive(Debug)]
pub struct Trainable<M: Classifier> {
    state: ClassifierState<M>,
    params: M::Params,
}

impl<M: Classifier> Trainable<M> {
    pub fn new(params: M::Params) -> Self {
        Self {
            state: ClassifierState::Untrained,
            params,
        }
    }

    /// Restores a saved model from `dir` if one is there.
    ///
    /// A missing or unreadable file leaves the classifier untrained.
    pub fn load(dir: &Path, params: M::Params) -> Self {
        let path = dir.join(M::FILE_NAME);
        let state = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<M>(&bytes) {
                Ok(model) => {
                    debug!(path = %path.display(), "classifier model loaded");
                    ClassifierState::Trained(model)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable classifier model");
                    ClassifierState::Untrained
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => ClassifierState::Untrained,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read classifier model");
                ClassifierState::Untrained
            }
        };
        Self { state, params }
    }

    pub fn state(&self) -> &ClassifierState<M> {
        &self.state
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ClassifierState::Trained(_))
    }

    /// Drops the current model; the next use retrains.
    pub fn invalidate(&mut self) {
        self.state = ClassifierState::Untrained;
    }

    /// Returns the trained model, training it from `library` first if needed.
    pub fn ensure_trained(
        &mut self,
        library: &FaceLibrary,
        dim: usize,
    ) -> Result<&M, RecognitionError> {
        if let ClassifierState::Untrained = self.state {
            let set = library.training_set(dim);
            if set.is_empty() {
                return Err(RecognitionError::Classifier("nothing to train on".into()));
            }
            let model = M::train(&set, &self.params)?;
            info!(
                model = M::FILE_NAME,
                samples = set.samples.len(),
                labels = set.labels.len(),
                "classifier trained"
            );
            self.state = ClassifierState::Trained(model);
        }
        match &self.state {
            ClassifierState::Trained(model) => Ok(model),
            ClassifierState::Untrained => Err(RecognitionError::Classifier("untrained".into())),
        }
    }

    /// Writes the model to `dir`. Returns false if there was nothing to save.
    pub fn save(&self, dir: &Path) -> Result<bool, RecognitionError> {
        let model = match &self.state {
            ClassifierState::Trained(model) => model,
            ClassifierState::Untrained => return Ok(false),
        };
        fs::create_dir_all(dir).map_err(|e| RecognitionError::Io(e.to_string()))?;
        let data = serde_json::to_vec(model).map_err(|e| RecognitionError::Io(e.to_string()))?;
        fs::write(dir.join(M::FILE_NAME), data).map_err(|e| RecognitionError::Io(e.to_string()))?;
        Ok(true)
    }

    /// Deletes the saved model in `dir`, if any.
    pub fn remove_saved(dir: &Path) -> Result<(), RecognitionError> {
        match fs::remove_file(dir.join(M::FILE_NAME)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecognitionError::Io(e.to_string())),
        }
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use facerec_spatial::{KdTree, SpatialIndex, cosine_similarity, l2_normalize, sq_distance};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::RecognitionError;
use crate::classifier::{
    Classifier, ClassifierState, LinearClassifier, NearestNeighborClassifier, Trainable,
};
use crate::config::EngineConfig;
use crate::dbscan;
use crate::extractor::{ExtractorHandle, FaceImage};
use crate::identity::Identity;
use crate::library::FaceLibrary;

/// How [`RecognitionEngine::find_identity`] decides on a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Highest cosine similarity, matched if it exceeds the threshold.
    Cosine,
    /// Smallest squared Euclidean distance, matched if below the threshold.
    L2,
    /// Like [`Strategy::L2`] on unit-normalized embeddings.
    L2Norm,
    /// Weighted vote of the spatial index's nearest neighbors; the
    /// threshold is the number of neighbors.
    TreeVote,
    /// Trained one-vs-rest linear SVM; the threshold is ignored.
    LinearClassifier,
    /// Trained k-nearest-neighbor vote; the threshold is ignored.
    NearestNeighborClassifier,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Cosine,
        Strategy::L2,
        Strategy::L2Norm,
        Strategy::TreeVote,
        Strategy::LinearClassifier,
        Strategy::NearestNeighborClassifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cosine => "cosine",
            Strategy::L2 => "l2",
            Strategy::L2Norm => "l2norm",
            Strategy::TreeVote => "tree",
            Strategy::LinearClassifier => "svm",
            Strategy::NearestNeighborClassifier => "knn",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" | "cos" => Ok(Strategy::Cosine),
            "l2" => Ok(Strategy::L2),
            "l2norm" | "l2-norm" => Ok(Strategy::L2Norm),
            "tree" | "tree-vote" | "treevote" => Ok(Strategy::TreeVote),
            "svm" | "linear" => Ok(Strategy::LinearClassifier),
            "knn" | "nearest-neighbor" => Ok(Strategy::NearestNeighborClassifier),
            other => Err(format!(
                "unknown strategy {other:?} (expected cosine, l2, l2norm, tree, svm or knn)"
            )),
        }
    }
}

/// A saved embedding, parsed once at registration.
struct GalleryEntry {
    id: u64,
    embedding: Vec<f32>,
    normalized: Vec<f32>,
}

struct EngineInner {
    library: FaceLibrary,
    gallery: Vec<GalleryEntry>,
    next_id: u64,
    linear: Trainable<LinearClassifier>,
    knn: Trainable<NearestNeighborClassifier>,
}

/// Maps face embeddings to registered identities.
///
/// Saved identities go into a [`FaceLibrary`] and, keyed by identity id,
/// into a [`SpatialIndex`]. Lookups either scan the library directly, vote
/// over the index's nearest neighbors, or ask one of two classifiers that
/// are retrained lazily after every registration.
///
/// Thread-safe: all methods take `&self`. Trained classifiers are written
/// to the configured model directory by [`RecognitionEngine::persist`] and
/// on drop, and picked up again by the next engine using that directory.
pub struct RecognitionEngine {
    cfg: EngineConfig,
    index: Box<dyn SpatialIndex>,
    inner: RwLock<EngineInner>,
}

impl RecognitionEngine {
    /// Creates an engine over `index`, whose dimension must equal the
    /// configured one. Saved classifiers in `cfg.model_dir` are loaded.
    ///
    /// Ids continue after the largest label already in the index, so a
    /// reopened store never hands an old row's id to a new identity.
    pub fn new(cfg: EngineConfig, index: Box<dyn SpatialIndex>) -> Result<Self, RecognitionError> {
        let cfg = cfg.with_defaults();
        if index.dim() != cfg.dim {
            return Err(RecognitionError::DimensionMismatch {
                expected: cfg.dim,
                got: index.dim(),
            });
        }
        let next_id = match index.max_label()? {
            Some(max) => max.checked_add(1).ok_or(RecognitionError::IdOverflow(max))?,
            None => 1,
        };
        Ok(Self::assemble(cfg, index, next_id))
    }

    /// Creates an engine backed by an in-memory [`KdTree`].
    pub fn with_memory_index(cfg: EngineConfig) -> Self {
        let cfg = cfg.with_defaults();
        let index = Box::new(KdTree::new(cfg.dim));
        Self::assemble(cfg, index, 1)
    }

    fn assemble(cfg: EngineConfig, index: Box<dyn SpatialIndex>, next_id: u64) -> Self {
        let (linear, knn) = match &cfg.model_dir {
            Some(dir) => (
                Trainable::load(dir, cfg.linear_params()),
                Trainable::load(dir, cfg.knn_params()),
            ),
            None => (
                Trainable::new(cfg.linear_params()),
                Trainable::new(cfg.knn_params()),
            ),
        };
        debug!(
            dim = cfg.dim,
            next_id,
            linear_trained = linear.is_trained(),
            knn_trained = knn.is_trained(),
            "recognition engine created"
        );

        Self {
            index,
            inner: RwLock::new(EngineInner {
                library: FaceLibrary::new(),
                gallery: Vec::new(),
                next_id,
                linear,
                knn,
            }),
            cfg,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn dim(&self) -> usize {
        self.cfg.dim
    }

    /// Looks up the identity matching `embedding`.
    ///
    /// Returns None when nothing matches: empty library, a score on the
    /// wrong side of `threshold`, a wrong-dimension embedding (logged), or
    /// a classifier that cannot be trained or predicts an unknown label.
    pub fn find_identity(
        &self,
        embedding: &[f32],
        strategy: Strategy,
        threshold: f64,
    ) -> Option<Identity> {
        if embedding.len() != self.cfg.dim {
            warn!(
                got = embedding.len(),
                want = self.cfg.dim,
                "find_identity: dimension mismatch"
            );
            return None;
        }

        match strategy {
            Strategy::Cosine => self.find_by_cosine(embedding, threshold),
            Strategy::L2 => self.find_by_l2(embedding, threshold, false),
            Strategy::L2Norm => self.find_by_l2(embedding, threshold, true),
            Strategy::TreeVote => self.find_by_tree_vote(embedding, threshold),
            Strategy::LinearClassifier => self.find_by_classifier::<LinearClassifier>(embedding),
            Strategy::NearestNeighborClassifier => {
                self.find_by_classifier::<NearestNeighborClassifier>(embedding)
            }
        }
    }

    /// Predicts with a trained model under the read lock. Only an untrained
    /// model takes the write lock, to train it first.
    fn find_by_classifier<M: ClassifierSlot>(&self, embedding: &[f32]) -> Option<Identity> {
        {
            let inner = self.inner.read();
            if let ClassifierState::Trained(model) = M::slot(&inner).state() {
                return representative(&inner.library, model, embedding);
            }
        }

        let mut inner = self.inner.write();
        let (trainable, library) = M::slot_mut(&mut inner);
        // Another caller may have trained it between the two locks;
        // ensure_trained then returns the existing model.
        let model = match trainable.ensure_trained(library, self.cfg.dim) {
            Ok(model) => model,
            Err(e) => {
                debug!(error = %e, classifier = M::FILE_NAME, "classifier unavailable");
                return None;
            }
        };
        representative(library, model, embedding)
    }

    /// Extracts the embedding of `image` and looks it up.
    pub fn find_identity_for_face(
        &self,
        extractor: &ExtractorHandle,
        image: &FaceImage,
        strategy: Strategy,
        threshold: f64,
    ) -> Option<Identity> {
        match extractor.extract(image) {
            Ok(embedding) => self.find_identity(&embedding, strategy, threshold),
            Err(e) => {
                warn!(error = %e, "find_identity_for_face: extraction failed");
                None
            }
        }
    }

    fn find_by_cosine(&self, embedding: &[f32], threshold: f64) -> Option<Identity> {
        let inner = self.inner.read();
        let mut best: Option<(u64, f32)> = None;
        for entry in &inner.gallery {
            let sim = cosine_similarity(embedding, &entry.embedding);
            if best.is_none_or(|(_, b)| sim > b) {
                best = Some((entry.id, sim));
            }
        }
        let (id, sim) = best?;
        if f64::from(sim) > threshold {
            inner.library.by_id(id).cloned()
        } else {
            None
        }
    }

    fn find_by_l2(&self, embedding: &[f32], threshold: f64, normalize: bool) -> Option<Identity> {
        let query = if normalize {
            let mut q = embedding.to_vec();
            l2_normalize(&mut q);
            q
        } else {
            embedding.to_vec()
        };

        let inner = self.inner.read();
        let mut best: Option<(u64, f64)> = None;
        for entry in &inner.gallery {
            let candidate = if normalize {
                &entry.normalized
            } else {
                &entry.embedding
            };
            let d = sq_distance(&query, candidate);
            if best.is_none_or(|(_, b)| d < b) {
                best = Some((entry.id, d));
            }
        }
        let (id, d) = best?;
        if d < threshold {
            inner.library.by_id(id).cloned()
        } else {
            None
        }
    }

    fn find_by_tree_vote(&self, embedding: &[f32], threshold: f64) -> Option<Identity> {
        if threshold.is_nan() || threshold < 1.0 {
            return None;
        }
        let k = threshold as usize;
        let radius = self.cfg.tree_radius;

        let neighbors = match self.index.closest_neighbors(embedding, radius, k) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "tree vote: index query failed");
                return None;
            }
        };

        let inner = self.inner.read();
        // label index -> score
        let mut scores: BTreeMap<usize, f64> = BTreeMap::new();
        for n in neighbors.iter() {
            let Some(label) = inner.library.label_index_of(n.label) else {
                debug!(id = n.label, "tree vote: neighbor not in library");
                continue;
            };
            let normalized = (n.sq_distance / radius).clamp(0.0, 1.0);
            *scores.entry(label).or_insert(0.0) += 1.0 - normalized;
        }

        let mut best: Option<(usize, f64)> = None;
        for (label, score) in scores {
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((label, score));
            }
        }
        let (label, _) = best?;
        let label = inner.library.label_at(label)?;
        inner.library.first(label).cloned()
    }

    /// An unsaved identity carrying `embedding`.
    pub fn new_identity(&self, embedding: &[f32]) -> Identity {
        Identity::with_embedding(embedding)
    }

    /// Extracts the embedding of `image` into an unsaved identity.
    pub fn new_identity_for_face(
        &self,
        extractor: &ExtractorHandle,
        image: &FaceImage,
    ) -> Result<Identity, RecognitionError> {
        let embedding = extractor.extract(image)?;
        Ok(self.new_identity(&embedding))
    }

    /// Registers `identity` under its `fullName` label.
    ///
    /// Assigns the next id if the identity has none, inserts the embedding
    /// into the spatial index and appends the identity to the library.
    /// Classifiers are invalidated and retrain on next use. Returns the
    /// saved identity.
    pub fn save_identity(&self, identity: Identity) -> Result<Identity, RecognitionError> {
        let label = match identity.label() {
            Some(l) => l.to_string(),
            None => {
                warn!(id = identity.id, "save_identity: identity has no label");
                return Err(RecognitionError::MissingLabel);
            }
        };
        let embedding = identity.embedding()?;
        if embedding.len() != self.cfg.dim {
            warn!(
                got = embedding.len(),
                want = self.cfg.dim,
                "save_identity: dimension mismatch"
            );
            return Err(RecognitionError::DimensionMismatch {
                expected: self.cfg.dim,
                got: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(RecognitionError::InvalidEmbedding(
                "embedding contains non-finite values".into(),
            ));
        }

        let mut inner = self.inner.write();
        let mut identity = identity;
        if identity.id == 0 {
            identity.id = inner.next_id;
        } else if inner.library.by_id(identity.id).is_some() {
            return Err(RecognitionError::DuplicateIdentity(identity.id));
        }
        let next_id = identity
            .id
            .checked_add(1)
            .ok_or(RecognitionError::IdOverflow(identity.id))?;

        self.index.insert(&embedding, identity.id)?;

        inner.next_id = inner.next_id.max(next_id);
        let mut normalized = embedding.clone();
        l2_normalize(&mut normalized);
        inner.gallery.push(GalleryEntry {
            id: identity.id,
            embedding,
            normalized,
        });
        inner.library.push(&label, identity.clone());
        inner.linear.invalidate();
        inner.knn.invalidate();

        debug!(id = identity.id, label = %label, "identity saved");
        Ok(identity)
    }

    /// The saved identity with the given id.
    pub fn identity(&self, id: u64) -> Option<Identity> {
        self.inner.read().library.by_id(id).cloned()
    }

    /// Every saved identity, label by label.
    pub fn all_identities(&self) -> Vec<Identity> {
        self.inner
            .read()
            .library
            .iter()
            .map(|(_, identity)| identity.clone())
            .collect()
    }

    /// First saved identity whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<Identity> {
        self.inner.read().library.find_by_attribute(name, value).cloned()
    }

    /// Best match for a set of attributes. See
    /// [`FaceLibrary::find_by_attributes`] for the order they are tried in.
    pub fn find_by_attributes(&self, attributes: &BTreeMap<String, String>) -> Option<Identity> {
        self.inner.read().library.find_by_attributes(attributes).cloned()
    }

    /// Merges `attributes` into the saved identity `id` and returns the
    /// updated identity.
    ///
    /// `fullName` and `faceEmbedding` may be restated but not changed.
    pub fn add_identity_attributes(
        &self,
        id: u64,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Identity, RecognitionError> {
        let mut inner = self.inner.write();
        let identity = inner.library.add_attributes(id, attributes)?.clone();
        debug!(id, count = attributes.len(), "identity attributes added");
        Ok(identity)
    }

    pub fn add_identity_attribute(
        &self,
        id: u64,
        name: &str,
        value: &str,
    ) -> Result<Identity, RecognitionError> {
        let attributes = BTreeMap::from([(name.to_string(), value.to_string())]);
        self.add_identity_attributes(id, &attributes)
    }

    /// Replaces the attributes of the saved identity `id`, keeping its
    /// `fullName` and `faceEmbedding`.
    pub fn set_identity_attributes(
        &self,
        id: u64,
        attributes: BTreeMap<String, String>,
    ) -> Result<Identity, RecognitionError> {
        let mut inner = self.inner.write();
        let identity = inner.library.set_attributes(id, attributes)?.clone();
        debug!(id, "identity attributes replaced");
        Ok(identity)
    }

    /// Registered labels in first-registration order.
    pub fn labels(&self) -> Vec<String> {
        self.inner
            .read()
            .library
            .labels()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Number of saved identities.
    pub fn len(&self) -> usize {
        self.inner.read().library.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups embeddings with DBSCAN using the configured parameters.
    /// See [`dbscan::cluster`].
    pub fn cluster(&self, embeddings: &[Vec<f32>]) -> Vec<i32> {
        dbscan::cluster(
            embeddings,
            self.cfg.cluster_eps,
            self.cfg.cluster_min_samples,
        )
    }

    /// Forgets both trained classifiers, including their saved models.
    pub fn clear_training(&self) -> Result<(), RecognitionError> {
        let mut inner = self.inner.write();
        inner.linear.invalidate();
        inner.knn.invalidate();
        if let Some(dir) = &self.cfg.model_dir {
            Trainable::<LinearClassifier>::remove_saved(dir)?;
            Trainable::<NearestNeighborClassifier>::remove_saved(dir)?;
        }
        info!("classifier training cleared");
        Ok(())
    }

    /// Writes trained classifiers to the model directory, if one is set.
    pub fn persist(&self) -> Result<(), RecognitionError> {
        let inner = self.inner.read();
        persist_models(&self.cfg, &inner)
    }
}

impl Drop for RecognitionEngine {
    fn drop(&mut self) {
        if let Err(e) = persist_models(&self.cfg, self.inner.get_mut()) {
            warn!(error = %e, "failed to persist classifiers");
        }
    }
}

fn persist_models(cfg: &EngineConfig, inner: &EngineInner) -> Result<(), RecognitionError> {
    let Some(dir) = &cfg.model_dir else {
        return Ok(());
    };
    let linear = inner.linear.save(dir)?;
    let knn = inner.knn.save(dir)?;
    if linear || knn {
        debug!(dir = %dir.display(), linear, knn, "classifiers persisted");
    }
    Ok(())
}

/// Where a classifier lives inside the engine state.
trait ClassifierSlot: Classifier {
    fn slot(inner: &EngineInner) -> &Trainable<Self>;
    fn slot_mut(inner: &mut EngineInner) -> (&mut Trainable<Self>, &FaceLibrary);
}

impl ClassifierSlot for LinearClassifier {
    fn slot(inner: &EngineInner) -> &Trainable<Self> {
        &inner.linear
    }

    fn slot_mut(inner: &mut EngineInner) -> (&mut Trainable<Self>, &FaceLibrary) {
        (&mut inner.linear, &inner.library)
    }
}

impl ClassifierSlot for NearestNeighborClassifier {
    fn slot(inner: &EngineInner) -> &Trainable<Self> {
        &inner.knn
    }

    fn slot_mut(inner: &mut EngineInner) -> (&mut Trainable<Self>, &FaceLibrary) {
        (&mut inner.knn, &inner.library)
    }
}

/// Maps a classifier's prediction back to the label's first identity.
fn representative<M: Classifier>(
    library: &FaceLibrary,
    model: &M,
    embedding: &[f32],
) -> Option<Identity> {
    let label = model.predict_label(embedding)?;
    library.first(label).cloned()
}

//! Face identity recognition over precomputed embeddings.
//!
//! [`RecognitionEngine`] keeps a [`FaceLibrary`] of labeled identities and a
//! [`SpatialIndex`](facerec_spatial::SpatialIndex) over their embeddings, and
//! answers "who is this?" with one of several [`Strategy`] values: direct
//! cosine or L2 comparison, a distance-weighted vote over the index's
//! nearest neighbors, or a lazily trained classifier.
//!
//! Embeddings come from an external model behind [`FaceExtractor`]; this
//! crate never decodes images or runs inference itself.
//!
//! # Usage
//!
//! ```
//! use facerec_recognition::{EngineConfig, RecognitionEngine, Strategy};
//!
//! let engine = RecognitionEngine::with_memory_index(EngineConfig {
//!     dim: 2,
//!     ..EngineConfig::default()
//! });
//!
//! let mut alice = engine.new_identity(&[1.0, 0.0]);
//! alice.set_label("alice");
//! engine.save_identity(alice).unwrap();
//!
//! let found = engine.find_identity(&[0.9, 0.1], Strategy::Cosine, 0.8);
//! assert_eq!(found.unwrap().label(), Some("alice"));
//!
//! // Unknown faces are None, not errors.
//! assert!(engine.find_identity(&[0.0, 1.0], Strategy::Cosine, 0.8).is_none());
//! ```

pub mod classifier;
mod config;
pub mod dbscan;
mod engine;
mod error;
mod extractor;
mod identity;
mod library;

pub use config::EngineConfig;
pub use engine::{RecognitionEngine, Strategy};
pub use error::RecognitionError;
pub use extractor::{ExtractorHandle, FaceExtractor, FaceImage};
pub use identity::{FACE_EMBEDDING, FULL_NAME, Identity, decode_embedding, encode_embedding};
pub use library::FaceLibrary;

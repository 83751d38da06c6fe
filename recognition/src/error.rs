use facerec_spatial::SpatialError;
use thiserror::Error;

/// Errors returned by recognition operations.
///
/// An unknown face is not an error: lookups report it as `None`.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("identity has no fullName label")]
    MissingLabel,

    #[error("identity {0} is already registered")]
    DuplicateIdentity(u64),

    #[error("no saved identity with id {0}")]
    UnknownIdentity(u64),

    #[error("identity id {0} leaves no room for the next id")]
    IdOverflow(u64),

    #[error("attribute {0} cannot change once the identity is saved")]
    ImmutableAttribute(String),

    #[error("identity has no faceEmbedding attribute")]
    MissingEmbedding,

    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("index error: {0}")]
    Index(#[from] SpatialError),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("extractor error: {0}")]
    Extractor(String),
}

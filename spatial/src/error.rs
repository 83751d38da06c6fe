use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpatialError {
    #[error("spatial: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("spatial: storage error: {0}")]
    Storage(String),

    #[error("spatial: invalid format: {0}")]
    InvalidFormat(String),

    #[error("spatial: corrupt tree: {0}")]
    Corrupt(String),
}

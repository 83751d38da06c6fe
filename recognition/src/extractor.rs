//! Boundary to the external embedding model.

use parking_lot::Mutex;

use crate::RecognitionError;

/// An already detected, cropped and preprocessed face, as packed RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceImage {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major RGB.
    pub pixels: Vec<u8>,
}

impl FaceImage {
    /// Wraps an RGB buffer, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RecognitionError> {
        let want = width as usize * height as usize * 3;
        if width == 0 || height == 0 || pixels.len() != want {
            return Err(RecognitionError::Extractor(format!(
                "{width}x{height} RGB image needs {want} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

/// Turns a face image into an embedding.
///
/// Implementations wrap a neural network and need not be reentrant:
/// [`ExtractorHandle`] serializes every call.
pub trait FaceExtractor: Send {
    /// Computes the embedding of `image`.
    fn extract(&mut self, image: &FaceImage) -> Result<Vec<f32>, RecognitionError>;

    /// Length of the produced embeddings (e.g. 128).
    fn dimension(&self) -> usize;
}

/// Exclusive access to one [`FaceExtractor`].
///
/// Pass it to whichever component needs embeddings; calls from several
/// threads queue on the inner lock.
pub struct ExtractorHandle {
    inner: Mutex<Box<dyn FaceExtractor>>,
    dim: usize,
}

impl ExtractorHandle {
    pub fn new(extractor: Box<dyn FaceExtractor>) -> Self {
        let dim = extractor.dimension();
        Self {
            inner: Mutex::new(extractor),
            dim,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Runs the extractor and checks the embedding length.
    pub fn extract(&self, image: &FaceImage) -> Result<Vec<f32>, RecognitionError> {
        let embedding = self.inner.lock().extract(image)?;
        if embedding.len() != self.dim {
            return Err(RecognitionError::DimensionMismatch {
                expected: self.dim,
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

impl std::fmt::Debug for ExtractorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorHandle")
            .field("dim", &self.dim)
            .finish()
    }
}

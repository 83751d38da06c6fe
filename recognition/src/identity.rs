use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::RecognitionError;

/// Attribute holding the embedding, serialized as a JSON array of floats.
pub const FACE_EMBEDDING: &str = "faceEmbedding";

/// Attribute holding the label identities are grouped by.
pub const FULL_NAME: &str = "fullName";

/// A known or provisional person.
///
/// `id` is 0 until the identity is saved. Attributes are free-form; the
/// engine only reads [`FACE_EMBEDDING`] and [`FULL_NAME`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub attributes: BTreeMap<String, String>,
}

impl Identity {
    /// An unsaved identity carrying only the serialized embedding.
    pub fn with_embedding(embedding: &[f32]) -> Self {
        let mut identity = Self::default();
        identity.set_attribute(FACE_EMBEDDING, &encode_embedding(embedding));
        identity
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_string(), value.to_string());
    }

    /// Sets the [`FULL_NAME`] label.
    pub fn set_label(&mut self, label: &str) {
        self.set_attribute(FULL_NAME, label);
    }

    /// The [`FULL_NAME`] label, if present and non-empty.
    pub fn label(&self) -> Option<&str> {
        self.attribute(FULL_NAME).filter(|s| !s.is_empty())
    }

    /// True once the identity has been assigned an id.
    pub fn is_saved(&self) -> bool {
        self.id != 0
    }

    /// Parses the [`FACE_EMBEDDING`] attribute.
    pub fn embedding(&self) -> Result<Vec<f32>, RecognitionError> {
        let raw = self
            .attribute(FACE_EMBEDDING)
            .ok_or(RecognitionError::MissingEmbedding)?;
        decode_embedding(raw)
    }
}

/// Serializes an embedding as a JSON array, e.g. `[0.1,-0.2,0.3]`.
pub fn encode_embedding(embedding: &[f32]) -> String {
    // A float slice always serializes; non-finite values become null and
    // are rejected on decode.
    serde_json::to_string(embedding).unwrap_or_else(|_| String::from("[]"))
}

/// Parses an embedding produced by [`encode_embedding`].
pub fn decode_embedding(raw: &str) -> Result<Vec<f32>, RecognitionError> {
    serde_json::from_str(raw).map_err(|e| RecognitionError::InvalidEmbedding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_is_unsaved_and_unlabeled() {
        let identity = Identity::with_embedding(&[0.5, -1.25]);
        assert_eq!(identity.id, 0);
        assert!(!identity.is_saved());
        assert!(identity.label().is_none());
        assert_eq!(identity.attribute(FACE_EMBEDDING), Some("[0.5,-1.25]"));
        assert_eq!(identity.embedding().unwrap(), vec![0.5, -1.25]);
    }

    #[test]
    fn test_empty_label_counts_as_missing() {
        let mut identity = Identity::default();
        identity.set_label("");
        assert!(identity.label().is_none());
        identity.set_label("alice");
        assert_eq!(identity.label(), Some("alice"));
    }

    #[test]
    fn test_bad_embeddings_are_rejected() {
        assert!(matches!(
            Identity::default().embedding(),
            Err(RecognitionError::MissingEmbedding)
        ));

        let mut identity = Identity::default();
        identity.set_attribute(FACE_EMBEDDING, "[1.0, \"x\"]");
        assert!(matches!(
            identity.embedding(),
            Err(RecognitionError::InvalidEmbedding(_))
        ));
    }
}

use std::collections::{BTreeMap, HashMap};

use crate::RecognitionError;
use crate::classifier::TrainingSet;
use crate::identity::{FACE_EMBEDDING, FULL_NAME, Identity};

/// Attributes searched first, in this order, by
/// [`FaceLibrary::find_by_attributes`].
const UUID: &str = "uuid";
const NAME: &str = "name";

/// Attributes the library and the spatial index are keyed on.
const FIXED: [&str; 2] = [FULL_NAME, FACE_EMBEDDING];

/// Label-indexed collection of registered identities.
///
/// Labels keep first-registration order and identities keep append order.
/// Nothing is ever removed or reordered, so a label index stays valid for
/// the lifetime of the library.
#[derive(Debug, Default)]
pub struct FaceLibrary {
    groups: Vec<LabelGroup>,
    by_label: HashMap<String, usize>,
    /// id -> (label index, position within the group)
    by_id: HashMap<u64, (usize, usize)>,
    count: usize,
}

#[derive(Debug)]
struct LabelGroup {
    label: String,
    identities: Vec<Identity>,
}

impl FaceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `identity` under `label`. Returns the label's index.
    pub fn push(&mut self, label: &str, identity: Identity) -> usize {
        let idx = match self.by_label.get(label) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                self.groups.push(LabelGroup {
                    label: label.to_string(),
                    identities: Vec::new(),
                });
                self.by_label.insert(label.to_string(), idx);
                idx
            }
        };
        let group = &mut self.groups[idx];
        self.by_id.insert(identity.id, (idx, group.identities.len()));
        group.identities.push(identity);
        self.count += 1;
        idx
    }

    /// Labels in first-registration order.
    pub fn labels(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.label.as_str()).collect()
    }

    pub fn label_count(&self) -> usize {
        self.groups.len()
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn label_at(&self, idx: usize) -> Option<&str> {
        self.groups.get(idx).map(|g| g.label.as_str())
    }

    /// Identities registered under `label`, in append order.
    pub fn identities(&self, label: &str) -> &[Identity] {
        match self.label_index(label) {
            Some(idx) => &self.groups[idx].identities,
            None => &[],
        }
    }

    /// The representative (first registered) identity of a label.
    pub fn first(&self, label: &str) -> Option<&Identity> {
        self.identities(label).first()
    }

    pub fn by_id(&self, id: u64) -> Option<&Identity> {
        self.by_id
            .get(&id)
            .map(|&(g, i)| &self.groups[g].identities[i])
    }

    fn by_id_mut(&mut self, id: u64) -> Result<&mut Identity, RecognitionError> {
        let &(g, i) = self
            .by_id
            .get(&id)
            .ok_or(RecognitionError::UnknownIdentity(id))?;
        Ok(&mut self.groups[g].identities[i])
    }

    /// Merges `attributes` into a saved identity, overwriting values of
    /// names it already has.
    ///
    /// The label and the embedding are fixed once saved: passing either
    /// with a different value fails with
    /// [`RecognitionError::ImmutableAttribute`] and changes nothing.
    pub fn add_attributes(
        &mut self,
        id: u64,
        attributes: &BTreeMap<String, String>,
    ) -> Result<&Identity, RecognitionError> {
        let identity = self.by_id_mut(id)?;
        check_fixed(identity, attributes)?;
        identity
            .attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(identity)
    }

    /// Replaces a saved identity's attributes. The label and the embedding
    /// are carried over when `attributes` leaves them out.
    pub fn set_attributes(
        &mut self,
        id: u64,
        mut attributes: BTreeMap<String, String>,
    ) -> Result<&Identity, RecognitionError> {
        let identity = self.by_id_mut(id)?;
        check_fixed(identity, &attributes)?;
        for name in FIXED {
            if let Some(value) = identity.attributes.get(name) {
                attributes
                    .entry(name.to_string())
                    .or_insert_with(|| value.clone());
            }
        }
        identity.attributes = attributes;
        Ok(identity)
    }

    /// Label index of the identity with the given id.
    pub fn label_index_of(&self, id: u64) -> Option<usize> {
        self.by_id.get(&id).map(|&(g, _)| g)
    }

    /// All identities with their label index, label by label.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Identity)> + '_ {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(idx, g)| g.identities.iter().map(move |identity| (idx, identity)))
    }

    /// First identity whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<&Identity> {
        self.iter()
            .map(|(_, identity)| identity)
            .find(|identity| identity.attribute(name) == Some(value))
    }

    /// Best match for a set of attributes.
    ///
    /// A `uuid` decides alone: if given, only an identity with that uuid
    /// matches. Otherwise `fullName`, then `name`, then the remaining
    /// attributes in name order are tried one at a time, and the first
    /// that matches some identity wins.
    pub fn find_by_attributes(&self, attributes: &BTreeMap<String, String>) -> Option<&Identity> {
        if let Some(uuid) = attributes.get(UUID) {
            return self.find_by_attribute(UUID, uuid);
        }
        for name in [FULL_NAME, NAME] {
            if let Some(found) = attributes
                .get(name)
                .and_then(|value| self.find_by_attribute(name, value))
            {
                return Some(found);
            }
        }
        attributes
            .iter()
            .filter(|(name, _)| name.as_str() != FULL_NAME && name.as_str() != NAME)
            .find_map(|(name, value)| self.find_by_attribute(name, value))
    }

    /// Every embedding of dimension `dim` with its label index.
    pub fn training_set(&self, dim: usize) -> TrainingSet {
        TrainingSet::from_library(self, dim)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

fn check_fixed(
    identity: &Identity,
    attributes: &BTreeMap<String, String>,
) -> Result<(), RecognitionError> {
    for name in FIXED {
        if let Some(value) = attributes.get(name) {
            if identity.attribute(name) != Some(value.as_str()) {
                return Err(RecognitionError::ImmutableAttribute(name.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: u64, name: &str) -> Identity {
        let mut identity = Identity::with_embedding(&[id as f32]);
        identity.id = id;
        identity.set_label(name);
        identity
    }

    #[test]
    fn test_groups_keep_registration_order() {
        let mut lib = FaceLibrary::new();
        assert_eq!(lib.push("bob", person(1, "bob")), 0);
        assert_eq!(lib.push("alice", person(2, "alice")), 1);
        assert_eq!(lib.push("bob", person(3, "bob")), 0);

        assert_eq!(lib.labels(), vec!["bob", "alice"]);
        assert_eq!(lib.len(), 3);
        assert_eq!(lib.label_count(), 2);
        assert_eq!(lib.first("bob").unwrap().id, 1);
        let bobs: Vec<u64> = lib.identities("bob").iter().map(|i| i.id).collect();
        assert_eq!(bobs, vec![1, 3]);
        assert!(lib.identities("carol").is_empty());
    }

    #[test]
    fn test_lookups() {
        let mut lib = FaceLibrary::new();
        lib.push("alice", person(7, "alice"));
        lib.push("bob", person(9, "bob"));

        assert_eq!(lib.by_id(9).unwrap().label(), Some("bob"));
        assert!(lib.by_id(8).is_none());
        assert_eq!(lib.label_index_of(7), Some(0));
        assert_eq!(lib.label_at(1), Some("bob"));
        assert!(lib.label_at(2).is_none());
        assert_eq!(lib.find_by_attribute("fullName", "bob").unwrap().id, 9);
        assert!(lib.find_by_attribute("fullName", "carol").is_none());

        let order: Vec<(usize, u64)> = lib.iter().map(|(l, i)| (l, i.id)).collect();
        assert_eq!(order, vec![(0, 7), (1, 9)]);
    }

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_add_attributes_merges() {
        let mut lib = FaceLibrary::new();
        lib.push("alice", person(7, "alice"));

        let updated = lib
            .add_attributes(7, &attrs(&[("city", "Oslo"), ("uuid", "a-1")]))
            .unwrap();
        assert_eq!(updated.attribute("city"), Some("Oslo"));
        assert_eq!(updated.label(), Some("alice"));

        lib.add_attributes(7, &attrs(&[("city", "Bergen")])).unwrap();
        let alice = lib.by_id(7).unwrap();
        assert_eq!(alice.attribute("city"), Some("Bergen"));
        assert_eq!(alice.attribute("uuid"), Some("a-1"));

        // Restating the current label is allowed.
        assert!(lib.add_attributes(7, &attrs(&[("fullName", "alice")])).is_ok());
        assert!(matches!(
            lib.add_attributes(8, &attrs(&[("city", "Oslo")])),
            Err(RecognitionError::UnknownIdentity(8))
        ));
    }

    #[test]
    fn test_label_and_embedding_are_fixed() {
        let mut lib = FaceLibrary::new();
        lib.push("alice", person(7, "alice"));

        assert!(matches!(
            lib.add_attributes(7, &attrs(&[("city", "Oslo"), ("fullName", "bob")])),
            Err(RecognitionError::ImmutableAttribute(name)) if name == "fullName"
        ));
        assert!(matches!(
            lib.set_attributes(7, attrs(&[("faceEmbedding", "[1.0]")])),
            Err(RecognitionError::ImmutableAttribute(name)) if name == "faceEmbedding"
        ));
        let alice = lib.by_id(7).unwrap();
        assert!(alice.attribute("city").is_none(), "rejected update applies nothing");
        assert_eq!(lib.identities("alice").len(), 1);
        assert!(lib.identities("bob").is_empty());
    }

    #[test]
    fn test_set_attributes_replaces_but_keeps_label() {
        let mut lib = FaceLibrary::new();
        let mut alice = person(7, "alice");
        alice.set_attribute("city", "Oslo");
        lib.push("alice", alice);

        let updated = lib.set_attributes(7, attrs(&[("nick", "al")])).unwrap();
        assert_eq!(updated.attribute("nick"), Some("al"));
        assert!(updated.attribute("city").is_none());
        assert_eq!(updated.label(), Some("alice"));
        assert_eq!(updated.embedding().unwrap(), vec![7.0]);
    }

    #[test]
    fn test_find_by_attributes_priority() {
        let mut lib = FaceLibrary::new();
        let mut alice = person(1, "alice");
        alice.set_attribute("uuid", "u-1");
        alice.set_attribute("name", "al");
        lib.push("alice", alice);
        let mut bob = person(2, "bob");
        bob.set_attribute("name", "bobby");
        bob.set_attribute("city", "Oslo");
        lib.push("bob", bob);

        // fullName beats name and the rest.
        let query = attrs(&[("fullName", "bob"), ("name", "al")]);
        assert_eq!(lib.find_by_attributes(&query).unwrap().id, 2);
        // An unmatched fullName falls through to name.
        let query = attrs(&[("fullName", "carol"), ("name", "al")]);
        assert_eq!(lib.find_by_attributes(&query).unwrap().id, 1);
        // Then any other attribute.
        let query = attrs(&[("fullName", "carol"), ("city", "Oslo")]);
        assert_eq!(lib.find_by_attributes(&query).unwrap().id, 2);

        // A uuid decides alone, even when it matches nobody.
        let query = attrs(&[("uuid", "u-1"), ("fullName", "bob")]);
        assert_eq!(lib.find_by_attributes(&query).unwrap().id, 1);
        let query = attrs(&[("uuid", "u-9"), ("fullName", "bob")]);
        assert!(lib.find_by_attributes(&query).is_none());

        assert!(lib.find_by_attributes(&BTreeMap::new()).is_none());
    }
}

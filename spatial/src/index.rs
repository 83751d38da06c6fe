use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::SpatialError;
use crate::node::NodeId;

/// Neighbor is a single result from a k-nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Label stored with the matched node.
    pub label: u64,

    /// Squared Euclidean distance between the query and the node.
    pub sq_distance: f64,
}

/// Bucket key: a squared distance with a total order.
#[derive(Debug, Clone, Copy)]
struct SqDist(f64);

impl Ord for SqDist {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl PartialOrd for SqDist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for SqDist {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for SqDist {}

/// Result of a k-NN query: labels bucketed by squared distance, plus the
/// search radius as it stood when the traversal finished.
///
/// Nodes at exactly the same distance share a bucket and keep arrival order.
#[derive(Debug, Clone)]
pub struct Neighbors {
    buckets: BTreeMap<SqDist, Vec<u64>>,
    count: usize,
    sq_range: f64,
}

impl Neighbors {
    pub(crate) fn new(sq_range: f64) -> Self {
        Self {
            buckets: BTreeMap::new(),
            count: 0,
            sq_range,
        }
    }

    /// Offers a visited node to the collection.
    ///
    /// Nodes outside the current radius are ignored. When the collection
    /// grows past `k`, one member of the farthest bucket is dropped and the
    /// radius shrinks to the farthest retained distance.
    pub(crate) fn offer(&mut self, label: u64, sq_distance: f64, k: usize) {
        if sq_distance > self.sq_range {
            return;
        }
        self.buckets.entry(SqDist(sq_distance)).or_default().push(label);
        self.count += 1;

        if self.count > k {
            if let Some(mut farthest) = self.buckets.last_entry() {
                if farthest.get().len() == 1 {
                    farthest.remove();
                } else {
                    farthest.get_mut().pop();
                }
                self.count -= 1;
            }
            if let Some((d, _)) = self.buckets.last_key_value() {
                self.sq_range = d.0;
            }
        }
    }

    /// Current search radius (squared).
    pub fn sq_range(&self) -> f64 {
        self.sq_range
    }

    /// Number of retained neighbors.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Neighbors in non-decreasing distance order.
    pub fn iter(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.buckets.iter().flat_map(|(d, labels)| {
            labels.iter().map(move |&label| Neighbor {
                label,
                sq_distance: d.0,
            })
        })
    }

    /// Distance buckets in ascending order.
    pub fn buckets(&self) -> impl Iterator<Item = (f64, &[u64])> + '_ {
        self.buckets.iter().map(|(d, labels)| (d.0, labels.as_slice()))
    }

    /// The closest neighbor, if any.
    pub fn nearest(&self) -> Option<Neighbor> {
        self.iter().next()
    }

    pub fn to_vec(&self) -> Vec<Neighbor> {
        self.iter().collect()
    }
}

/// SpatialIndex is the capability shared by every KD-tree backend:
/// insert a labeled point and answer bounded k-nearest-neighbor queries.
///
/// Callers holding a `Box<dyn SpatialIndex>` cannot tell the in-memory
/// tree from the persisted store apart, except by latency.
pub trait SpatialIndex: Send + Sync {
    /// Dimension every position and query must have.
    fn dim(&self) -> usize;

    /// Inserts `position` tagged with `label`. Returns the new node's id.
    fn insert(&self, position: &[f32], label: u64) -> Result<NodeId, SpatialError>;

    /// Returns up to `k` nodes closest to `query` whose squared distance
    /// does not exceed `sq_range`.
    ///
    /// Pass `f64::INFINITY` for an unbounded search.
    fn closest_neighbors(
        &self,
        query: &[f32],
        sq_range: f64,
        k: usize,
    ) -> Result<Neighbors, SpatialError>;

    /// Largest label inserted so far, or None while the index is empty.
    ///
    /// Callers that hand out labels use this to resume numbering over a
    /// reopened index without reusing labels already stored in it.
    fn max_label(&self) -> Result<Option<u64>, SpatialError>;

    /// Number of nodes in the index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn check_dim(got: usize, want: usize) -> Result<(), SpatialError> {
    if got != want {
        return Err(SpatialError::DimensionMismatch { got, want });
    }
    Ok(())
}

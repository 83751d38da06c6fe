use parking_lot::RwLock;

use crate::error::SpatialError;
use crate::index::{check_dim, Neighbors, SpatialIndex};
use crate::node::{KdNode, NO_NODE, NodeId, ROOT, Side};
use crate::search::{self, NodeSource};

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

pub(crate) struct KdTreeInner {
    dim: usize,
    /// Node with id `n` lives at `nodes[n - 1]`.
    nodes: Vec<KdNode>,
}

impl KdTreeInner {
    fn get(&self, id: NodeId) -> Option<&KdNode> {
        if id == NO_NODE {
            return None;
        }
        self.nodes.get((id - 1) as usize)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut KdNode> {
        if id == NO_NODE {
            return None;
        }
        self.nodes.get_mut((id - 1) as usize)
    }

    /// Walks from the root to the node that will parent `pos`, growing the
    /// bounding box of every node on the way.
    fn find_parent(&mut self, pos: &[f32]) -> Result<(NodeId, Side), SpatialError> {
        let mut cur = ROOT;
        loop {
            let node = self
                .get_mut(cur)
                .ok_or_else(|| SpatialError::Corrupt(format!("dangling link to node {cur}")))?;
            node.expand(pos);
            let side = node.side_for(pos);
            let next = node.child(side);
            if next == NO_NODE {
                return Ok((cur, side));
            }
            cur = next;
        }
    }
}

impl NodeSource for KdTreeInner {
    type Ref<'a>
        = &'a KdNode
    where
        Self: 'a;

    fn fetch(&self, id: NodeId) -> Result<Option<Self::Ref<'_>>, SpatialError> {
        Ok(self.get(id))
    }
}

// ---------------------------------------------------------------------------
// KdTree
// ---------------------------------------------------------------------------

/// KdTree is an unbalanced, axis-cycling KD-tree held in memory,
/// implementing [`SpatialIndex`].
///
/// Nodes live in an arena and refer to each other by [`NodeId`], so the
/// tree has no ownership cycles and drops in one pass. The split axis of a
/// node is its parent's plus one, modulo the dimension; the root splits on
/// axis 0. There is no rebalancing: sorted insertion degrades to a list.
///
/// All methods are safe for concurrent use (via RwLock).
pub struct KdTree {
    inner: RwLock<KdTreeInner>,
}

impl KdTree {
    /// Creates an empty tree over `dim`-dimensional points.
    /// Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "spatial: KdTree dim must be positive");
        Self {
            inner: RwLock::new(KdTreeInner {
                dim,
                nodes: Vec::new(),
            }),
        }
    }

    /// Snapshot of a node, or None if `id` is not in the tree.
    pub fn node(&self, id: NodeId) -> Option<KdNode> {
        self.inner.read().get(id).cloned()
    }

    /// Ids from the parent of `id` up to the root, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut cur = inner.get(id).map_or(NO_NODE, |n| n.parent);
        while let Some(node) = inner.get(cur) {
            out.push(cur);
            cur = node.parent;
        }
        out
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let inner = self.inner.read();
        let mut best = 0;
        let mut stack = vec![(ROOT, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            if let Some(node) = inner.get(id) {
                best = best.max(depth);
                stack.push((node.left, depth + 1));
                stack.push((node.right, depth + 1));
            }
        }
        best
    }
}

impl SpatialIndex for KdTree {
    fn dim(&self) -> usize {
        self.inner.read().dim
    }

    fn insert(&self, position: &[f32], label: u64) -> Result<NodeId, SpatialError> {
        let mut inner = self.inner.write();
        check_dim(position.len(), inner.dim)?;

        if inner.nodes.is_empty() {
            inner.nodes.push(KdNode::leaf(ROOT, label, 0, position, NO_NODE));
            return Ok(ROOT);
        }

        let (parent_id, side) = inner.find_parent(position)?;
        let id = inner.nodes.len() as NodeId + 1;
        let dim = inner.dim;

        let parent = inner
            .get_mut(parent_id)
            .ok_or_else(|| SpatialError::Corrupt(format!("missing parent {parent_id}")))?;
        let split_axis = (parent.split_axis + 1) % dim;
        parent.set_child(side, id);

        inner
            .nodes
            .push(KdNode::leaf(id, label, split_axis, position, parent_id));
        Ok(id)
    }

    fn closest_neighbors(
        &self,
        query: &[f32],
        sq_range: f64,
        k: usize,
    ) -> Result<Neighbors, SpatialError> {
        let inner = self.inner.read();
        check_dim(query.len(), inner.dim)?;
        search::closest_neighbors(&*inner, query, sq_range, k)
    }

    fn max_label(&self) -> Result<Option<u64>, SpatialError> {
        Ok(self.inner.read().nodes.iter().map(|n| n.label).max())
    }

    fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }
}

use crate::distance::box_sq_distance;

/// Identifier of a tree node. 1-based; [`NO_NODE`] marks an absent link.
///
/// Both backends hand out the same ids for the same insertion sequence:
/// the root is always 1.
pub type NodeId = u64;

/// Absent parent/child link.
pub const NO_NODE: NodeId = 0;

/// Id of the root node once the tree is non-empty.
pub const ROOT: NodeId = 1;

/// Which child link an insertion descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A KD-tree node, shared by the in-memory tree and the persisted store.
///
/// `min_range`/`max_range` bound every position in the subtree rooted here,
/// the node itself included.
#[derive(Debug, Clone, PartialEq)]
pub struct KdNode {
    pub id: NodeId,
    pub label: u64,
    pub split_axis: usize,
    pub position: Vec<f32>,
    pub min_range: Vec<f32>,
    pub max_range: Vec<f32>,
    pub parent: NodeId,
    pub left: NodeId,
    pub right: NodeId,
}

impl KdNode {
    /// A childless node whose bounding box is just its own position.
    pub fn leaf(id: NodeId, label: u64, split_axis: usize, position: &[f32], parent: NodeId) -> Self {
        Self {
            id,
            label,
            split_axis,
            position: position.to_vec(),
            min_range: position.to_vec(),
            max_range: position.to_vec(),
            parent,
            left: NO_NODE,
            right: NO_NODE,
        }
    }

    /// Grows the bounding box so it contains `pos`.
    pub fn expand(&mut self, pos: &[f32]) {
        for (i, &p) in pos.iter().enumerate() {
            if p < self.min_range[i] {
                self.min_range[i] = p;
            }
            if p > self.max_range[i] {
                self.max_range[i] = p;
            }
        }
    }

    /// Child side a point with this position belongs to.
    /// Ties on the split coordinate go right.
    pub fn side_for(&self, pos: &[f32]) -> Side {
        let axis = self.split_axis;
        if pos[axis] >= self.position[axis] {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn child(&self, side: Side) -> NodeId {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn set_child(&mut self, side: Side, id: NodeId) {
        match side {
            Side::Left => self.left = id,
            Side::Right => self.right = id,
        }
    }

    /// Lower bound on the squared distance from `query` to anything in
    /// this subtree.
    pub fn box_sq_distance(&self, query: &[f32]) -> f64 {
        box_sq_distance(query, &self.min_range, &self.max_range)
    }

    /// True when the bounding box contains `pos` on every axis.
    pub fn box_contains(&self, pos: &[f32]) -> bool {
        pos.iter()
            .enumerate()
            .all(|(i, &p)| self.min_range[i] <= p && p <= self.max_range[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_box_is_degenerate() {
        let n = KdNode::leaf(ROOT, 7, 0, &[1.0, 2.0], NO_NODE);
        assert_eq!(n.min_range, vec![1.0, 2.0]);
        assert_eq!(n.max_range, vec![1.0, 2.0]);
        assert_eq!(n.box_sq_distance(&[1.0, 2.0]), 0.0);
        assert_eq!(n.left, NO_NODE);
        assert_eq!(n.right, NO_NODE);
    }

    #[test]
    fn test_expand_covers_new_points() {
        let mut n = KdNode::leaf(ROOT, 0, 0, &[0.0, 0.0], NO_NODE);
        n.expand(&[-1.0, 3.0]);
        n.expand(&[2.0, -4.0]);
        assert_eq!(n.min_range, vec![-1.0, -4.0]);
        assert_eq!(n.max_range, vec![2.0, 3.0]);
        assert!(n.box_contains(&[0.5, 0.5]));
        assert!(!n.box_contains(&[3.0, 0.0]));
    }

    #[test]
    fn test_ties_go_right() {
        let n = KdNode::leaf(ROOT, 0, 1, &[0.0, 5.0], NO_NODE);
        assert_eq!(n.side_for(&[9.0, 5.0]), Side::Right);
        assert_eq!(n.side_for(&[9.0, 4.9]), Side::Left);
    }
}

use std::ops::Deref;

use crate::distance::sq_distance;
use crate::error::SpatialError;
use crate::index::Neighbors;
use crate::node::{KdNode, NO_NODE, NodeId, ROOT};

/// Random access to tree nodes by id, for the shared k-NN traversal.
pub(crate) trait NodeSource {
    type Ref<'a>: Deref<Target = KdNode>
    where
        Self: 'a;

    /// Fetches a node. `Ok(None)` means the id does not exist.
    fn fetch(&self, id: NodeId) -> Result<Option<Self::Ref<'_>>, SpatialError>;
}

/// Branch-and-bound k-NN traversal from the root.
///
/// Depth-first with an explicit stack. At each node the nearer child box
/// is visited first; the farther one only if its box distance is still
/// below the radius once the nearer subtree is finished.
pub(crate) fn closest_neighbors<S: NodeSource>(
    source: &S,
    query: &[f32],
    sq_range: f64,
    k: usize,
) -> Result<Neighbors, SpatialError> {
    let mut result = Neighbors::new(sq_range);
    if k == 0 {
        return Ok(result);
    }

    let root = match source.fetch(ROOT)? {
        Some(root) => root,
        None => return Ok(result),
    };
    let root_box = root.box_sq_distance(query);
    drop(root);

    // (node id, lower bound on distance into its subtree)
    let mut stack: Vec<(NodeId, f64)> = vec![(ROOT, root_box)];

    while let Some((id, box_dist)) = stack.pop() {
        if id != ROOT && box_dist >= result.sq_range() {
            continue;
        }

        let node = source
            .fetch(id)?
            .ok_or_else(|| SpatialError::Corrupt(format!("dangling link to node {id}")))?;

        result.offer(node.label, sq_distance(query, &node.position), k);

        let left = child_box_distance(source, node.left, query)?;
        let right = child_box_distance(source, node.right, query)?;
        drop(node);

        let (near, far) = if left.1 < right.1 {
            (left, right)
        } else {
            (right, left)
        };

        if near.1 < result.sq_range() {
            // Pushed first, popped last: re-checked against the radius the
            // nearer subtree leaves behind.
            if far.0 != NO_NODE {
                stack.push(far);
            }
            stack.push(near);
        }
    }

    Ok(result)
}

fn child_box_distance<S: NodeSource>(
    source: &S,
    child: NodeId,
    query: &[f32],
) -> Result<(NodeId, f64), SpatialError> {
    if child == NO_NODE {
        return Ok((NO_NODE, f64::INFINITY));
    }
    match source.fetch(child)? {
        Some(node) => Ok((child, node.box_sq_distance(query))),
        None => Err(SpatialError::Corrupt(format!(
            "dangling link to node {child}"
        ))),
    }
}

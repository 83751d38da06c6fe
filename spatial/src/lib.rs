//! Nearest-neighbor indexing over fixed-dimension face embeddings.
//!
//! Two interchangeable backends implement [`SpatialIndex`]:
//!
//! - [`KdTree`]: in-memory arena, fastest, lost on restart.
//! - [`SpatialStore`]: the same tree persisted row-per-node in redb.
//!
//! Both are unbalanced, axis-cycling KD-trees whose nodes carry the bounding
//! box of their subtree, so k-NN queries can prune whole subtrees
//! (branch-and-bound). Fed the same insertions, both produce the same node
//! ids, the same tree shape and the same query answers.
//!
//! # Usage
//!
//! ```
//! use facerec_spatial::{KdTree, SpatialIndex};
//!
//! let tree = KdTree::new(2);
//! tree.insert(&[0.0, 0.0], 1).unwrap();
//! tree.insert(&[10.0, 0.0], 2).unwrap();
//!
//! let neighbors = tree.closest_neighbors(&[1.0, 1.0], f64::INFINITY, 1).unwrap();
//! assert_eq!(neighbors.nearest().unwrap().label, 1);
//! ```

pub mod codec;
pub mod distance;
mod error;
mod index;
mod kdtree;
mod node;
mod search;
mod store;

pub use distance::{box_sq_distance, cosine_distance, cosine_similarity, l2_normalize, sq_distance};
pub use error::SpatialError;
pub use index::{Neighbor, Neighbors, SpatialIndex};
pub use kdtree::KdTree;
pub use node::{KdNode, NO_NODE, NodeId, ROOT, Side};
pub use store::SpatialStore;

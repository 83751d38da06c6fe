//! Redb-backed persistent KD-tree.

use std::fmt::Display;
use std::path::Path;

use redb::{
    Database, ReadOnlyTable, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
};
use tracing::{debug, warn};

use crate::codec::{decode_row, encode_row};
use crate::error::SpatialError;
use crate::index::{check_dim, Neighbors, SpatialIndex};
use crate::node::{KdNode, NO_NODE, NodeId, ROOT, Side};
use crate::search::{self, NodeSource};

/// One row per tree node, keyed by node id.
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("kd_nodes");

/// Store-level counters.
const META: TableDefinition<&str, u64> = TableDefinition::new("kd_meta");

const META_DIM: &str = "dim";
const META_NEXT_ID: &str = "next_id";
const META_MAX_LABEL: &str = "max_label";

fn storage<E: Display>(e: E) -> SpatialError {
    SpatialError::Storage(e.to_string())
}

/// A persistent KD-tree backed by redb, implementing [`SpatialIndex`].
///
/// Same tree, same answers as [`KdTree`](crate::KdTree); nodes are rows
/// addressed by id instead of arena slots. Every step of an insertion or a
/// query is a point lookup, so latency grows with the number of nodes
/// visited. Each insertion is one write transaction: it either lands with
/// all ancestor ranges updated or not at all.
pub struct SpatialStore {
    db: Database,
    dim: usize,
}

impl SpatialStore {
    /// Open or create a store at the given path.
    ///
    /// The dimension is recorded on first open; reopening with another
    /// dimension fails with [`SpatialError::DimensionMismatch`].
    pub fn open<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self, SpatialError> {
        if dim == 0 {
            return Err(SpatialError::DimensionMismatch { got: 0, want: 1 });
        }
        let db = Database::create(path.as_ref()).map_err(storage)?;

        let tx = db.begin_write().map_err(storage)?;
        {
            let _ = tx.open_table(NODES).map_err(storage)?;
            let mut meta = tx.open_table(META).map_err(storage)?;
            let stored = meta.get(META_DIM).map_err(storage)?.map(|v| v.value());
            match stored {
                Some(d) if d as usize != dim => {
                    return Err(SpatialError::DimensionMismatch {
                        got: dim,
                        want: d as usize,
                    });
                }
                Some(_) => {}
                None => {
                    meta.insert(META_DIM, dim as u64).map_err(storage)?;
                }
            }
        }
        tx.commit().map_err(storage)?;

        debug!(path = %path.as_ref().display(), dim, "spatial store opened");
        Ok(Self { db, dim })
    }

    /// Decoded row for `id`, or None if there is no such row.
    pub fn row(&self, id: NodeId) -> Result<Option<KdNode>, SpatialError> {
        let reader = self.reader()?;
        Ok(reader.fetch(id)?.map(|b| *b))
    }

    fn reader(&self) -> Result<RowReader, SpatialError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(NODES).map_err(storage)?;
        Ok(RowReader {
            table,
            dim: self.dim,
        })
    }

    /// Number of rows, reporting storage failures that
    /// [`len`](SpatialIndex::len) only logs.
    pub fn count(&self) -> Result<u64, SpatialError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(NODES).map_err(storage)?;
        table.len().map_err(storage)
    }
}

/// Descends from the root to the row that will parent `pos`, rewriting the
/// range columns of every row on the way.
///
/// Returns None when the tree has no root yet.
fn find_parent(
    nodes: &mut Table<'_, u64, &'static [u8]>,
    pos: &[f32],
    dim: usize,
) -> Result<Option<(KdNode, Side)>, SpatialError> {
    let mut cur = ROOT;
    loop {
        let mut row = match nodes.get(cur).map_err(storage)? {
            Some(v) => decode_row(cur, v.value(), dim)?,
            None if cur == ROOT => return Ok(None),
            None => {
                return Err(SpatialError::Corrupt(format!(
                    "dangling link to node {cur}"
                )));
            }
        };

        row.expand(pos);
        nodes
            .insert(cur, encode_row(&row).as_slice())
            .map_err(storage)?;

        let side = row.side_for(pos);
        let next = row.child(side);
        if next == NO_NODE {
            return Ok(Some((row, side)));
        }
        cur = next;
    }
}

impl SpatialIndex for SpatialStore {
    fn dim(&self) -> usize {
        self.dim
    }

    fn insert(&self, position: &[f32], label: u64) -> Result<NodeId, SpatialError> {
        check_dim(position.len(), self.dim)?;

        let tx = self.db.begin_write().map_err(storage)?;
        let id = {
            let mut nodes = tx.open_table(NODES).map_err(storage)?;
            let mut meta = tx.open_table(META).map_err(storage)?;
            let next_id = meta
                .get(META_NEXT_ID)
                .map_err(storage)?
                .map_or(ROOT, |v| v.value());

            let id = match find_parent(&mut nodes, position, self.dim)? {
                None => {
                    let root = KdNode::leaf(ROOT, label, 0, position, NO_NODE);
                    nodes
                        .insert(ROOT, encode_row(&root).as_slice())
                        .map_err(storage)?;
                    ROOT
                }
                Some((mut parent, side)) => {
                    let id = next_id.max(ROOT + 1);
                    let split_axis = (parent.split_axis + 1) % self.dim;
                    let node = KdNode::leaf(id, label, split_axis, position, parent.id);
                    nodes
                        .insert(id, encode_row(&node).as_slice())
                        .map_err(storage)?;

                    parent.set_child(side, id);
                    nodes
                        .insert(parent.id, encode_row(&parent).as_slice())
                        .map_err(storage)?;
                    id
                }
            };

            meta.insert(META_NEXT_ID, id + 1).map_err(storage)?;
            let max_label = meta
                .get(META_MAX_LABEL)
                .map_err(storage)?
                .map(|v| v.value());
            if max_label.is_none_or(|m| label > m) {
                meta.insert(META_MAX_LABEL, label).map_err(storage)?;
            }
            id
        };
        tx.commit().map_err(storage)?;
        Ok(id)
    }

    fn closest_neighbors(
        &self,
        query: &[f32],
        sq_range: f64,
        k: usize,
    ) -> Result<Neighbors, SpatialError> {
        check_dim(query.len(), self.dim)?;
        let reader = self.reader()?;
        search::closest_neighbors(&reader, query, sq_range, k)
    }

    fn max_label(&self) -> Result<Option<u64>, SpatialError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let meta = tx.open_table(META).map_err(storage)?;
        let max_label = meta
            .get(META_MAX_LABEL)
            .map_err(storage)?
            .map(|v| v.value());
        Ok(max_label)
    }

    fn len(&self) -> usize {
        match self.count() {
            Ok(n) => n as usize,
            Err(e) => {
                warn!(error = %e, "spatial store: count failed");
                0
            }
        }
    }
}

/// Row access inside one read transaction.
struct RowReader {
    table: ReadOnlyTable<u64, &'static [u8]>,
    dim: usize,
}

impl NodeSource for RowReader {
    type Ref<'a>
        = Box<KdNode>
    where
        Self: 'a;

    fn fetch(&self, id: NodeId) -> Result<Option<Self::Ref<'_>>, SpatialError> {
        if id == NO_NODE {
            return Ok(None);
        }
        match self.table.get(id).map_err(storage)? {
            Some(v) => Ok(Some(Box::new(decode_row(id, v.value(), self.dim)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    use super::*;
    use crate::KdTree;

    fn rand_points(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|_| (0..dim).map(|_| rng.r#gen::<f32>() * 2.0 - 1.0).collect())
            .collect()
    }

    #[test]
    fn test_store_root_is_row_one() {
        let dir = tempdir().unwrap();
        let store = SpatialStore::open(dir.path().join("tree.redb"), 2).unwrap();
        assert!(store.is_empty());

        assert_eq!(store.insert(&[0.0, 0.0], 10).unwrap(), ROOT);
        let second = store.insert(&[1.0, 1.0], 11).unwrap();
        assert_eq!(second, 2);

        let root = store.row(ROOT).unwrap().unwrap();
        assert_eq!(root.split_axis, 0);
        assert_eq!(root.right, second);
        assert_eq!(root.left, NO_NODE);
        assert_eq!(root.max_range, vec![1.0, 1.0]);

        let child = store.row(second).unwrap().unwrap();
        assert_eq!(child.parent, ROOT);
        assert_eq!(child.split_axis, 1);
        assert_eq!(store.len(), 2);
        assert!(store.row(99).unwrap().is_none());
    }

    #[test]
    fn test_store_matches_kdtree_row_for_row() {
        let mut rng = StdRng::seed_from_u64(17);
        let points = rand_points(&mut rng, 120, 4);
        let dir = tempdir().unwrap();
        let store = SpatialStore::open(dir.path().join("tree.redb"), 4).unwrap();
        let tree = KdTree::new(4);

        for (i, p) in points.iter().enumerate() {
            let a = store.insert(p, i as u64).unwrap();
            let b = tree.insert(p, i as u64).unwrap();
            assert_eq!(a, b);
        }
        for id in 1..=points.len() as NodeId {
            assert_eq!(store.row(id).unwrap(), tree.node(id), "node {id}");
        }
    }

    #[test]
    fn test_store_cross_backend_agreement() {
        let mut rng = StdRng::seed_from_u64(23);
        let points = rand_points(&mut rng, 80, 8);
        let dir = tempdir().unwrap();
        let store = SpatialStore::open(dir.path().join("tree.redb"), 8).unwrap();
        let tree = KdTree::new(8);
        for (i, p) in points.iter().enumerate() {
            store.insert(p, i as u64).unwrap();
            tree.insert(p, i as u64).unwrap();
        }

        for q in rand_points(&mut rng, 20, 8) {
            let a = store.closest_neighbors(&q, f64::INFINITY, 5).unwrap();
            let b = tree.closest_neighbors(&q, f64::INFINITY, 5).unwrap();
            assert_eq!(a.to_vec(), b.to_vec());
            assert_eq!(a.sq_range(), b.sq_range());
        }
        for (i, p) in points.iter().enumerate() {
            let a = store.closest_neighbors(p, f64::INFINITY, 1).unwrap();
            assert_eq!(a.nearest().unwrap().label, i as u64);
        }
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.redb");
        {
            let store = SpatialStore::open(&path, 3).unwrap();
            store.insert(&[0.0, 0.0, 0.0], 1).unwrap();
            store.insert(&[5.0, 5.0, 5.0], 2).unwrap();
        }

        let store = SpatialStore::open(&path, 3).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.max_label().unwrap(), Some(2));
        let id = store.insert(&[4.0, 4.0, 4.0], 3).unwrap();
        assert_eq!(id, 3);
        assert_eq!(store.max_label().unwrap(), Some(3));

        let n = store.closest_neighbors(&[4.1, 4.1, 4.1], f64::INFINITY, 1).unwrap();
        assert_eq!(n.nearest().unwrap().label, 3);
    }

    #[test]
    fn test_store_count_and_max_label() {
        let dir = tempdir().unwrap();
        let store = SpatialStore::open(dir.path().join("tree.redb"), 2).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.max_label().unwrap(), None);

        store.insert(&[0.0, 0.0], 40).unwrap();
        store.insert(&[1.0, 0.0], 5).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.count().unwrap() as usize, store.len());
        assert_eq!(store.max_label().unwrap(), Some(40), "smaller label keeps the max");

        // A rejected insert leaves both untouched.
        assert!(store.insert(&[1.0], 99).is_err());
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.max_label().unwrap(), Some(40));
    }

    #[test]
    fn test_store_dimension_checks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.redb");
        let store = SpatialStore::open(&path, 3).unwrap();
        assert!(matches!(
            store.insert(&[1.0, 2.0], 0),
            Err(SpatialError::DimensionMismatch { got: 2, want: 3 })
        ));
        assert!(store.closest_neighbors(&[1.0], 1.0, 1).is_err());
        assert_eq!(store.len(), 0);
        drop(store);

        assert!(matches!(
            SpatialStore::open(&path, 4),
            Err(SpatialError::DimensionMismatch { got: 4, want: 3 })
        ));
    }

    #[test]
    fn test_store_empty_and_k_zero() {
        let dir = tempdir().unwrap();
        let store = SpatialStore::open(dir.path().join("tree.redb"), 2).unwrap();
        let n = store.closest_neighbors(&[0.0, 0.0], 2.5, 4).unwrap();
        assert!(n.is_empty());
        assert_eq!(n.sq_range(), 2.5);

        store.insert(&[0.0, 0.0], 1).unwrap();
        assert!(store.closest_neighbors(&[0.0, 0.0], 2.5, 0).unwrap().is_empty());
    }
}

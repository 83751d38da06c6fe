use crate::error::SpatialError;
use crate::node::{KdNode, NodeId};

/// Bytes in the fixed row header: label, split_axis, parent, left, right.
const ROW_HEADER_LEN: usize = 8 + 4 + 8 + 8 + 8;

/// Encodes a vector as a blob of little-endian f32 values.
pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for &x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decodes a blob produced by [`encode_vector`], checking it holds exactly
/// `dim` values.
pub fn decode_vector(bytes: &[u8], dim: usize) -> Result<Vec<f32>, SpatialError> {
    if bytes.len() != dim * 4 {
        return Err(SpatialError::InvalidFormat(format!(
            "vector blob is {} bytes, want {}",
            bytes.len(),
            dim * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encodes a node as a persisted row.
///
/// ```text
/// [8B label] [4B split_axis] [8B parent] [8B left] [8B right]
/// [dim x 4B position] [dim x 4B max_range] [dim x 4B min_range]
/// ```
///
/// All multi-byte values are little-endian. The node id is the row key and
/// is not repeated in the value.
pub fn encode_row(node: &KdNode) -> Vec<u8> {
    let dim = node.position.len();
    let mut out = Vec::with_capacity(ROW_HEADER_LEN + 3 * dim * 4);
    out.extend_from_slice(&node.label.to_le_bytes());
    out.extend_from_slice(&(node.split_axis as u32).to_le_bytes());
    out.extend_from_slice(&node.parent.to_le_bytes());
    out.extend_from_slice(&node.left.to_le_bytes());
    out.extend_from_slice(&node.right.to_le_bytes());
    out.extend_from_slice(&encode_vector(&node.position));
    out.extend_from_slice(&encode_vector(&node.max_range));
    out.extend_from_slice(&encode_vector(&node.min_range));
    out
}

/// Decodes the row stored under `id`.
pub fn decode_row(id: NodeId, bytes: &[u8], dim: usize) -> Result<KdNode, SpatialError> {
    let want = ROW_HEADER_LEN + 3 * dim * 4;
    if bytes.len() != want {
        return Err(SpatialError::InvalidFormat(format!(
            "row {id} is {} bytes, want {want}",
            bytes.len()
        )));
    }

    let (header, blobs) = bytes.split_at(ROW_HEADER_LEN);
    let u64_at = |off: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&header[off..off + 8]);
        u64::from_le_bytes(buf)
    };
    let mut axis = [0u8; 4];
    axis.copy_from_slice(&header[8..12]);
    let split_axis = u32::from_le_bytes(axis) as usize;
    if split_axis >= dim {
        return Err(SpatialError::InvalidFormat(format!(
            "row {id} split axis {split_axis} out of range for dim {dim}"
        )));
    }

    let vlen = dim * 4;
    Ok(KdNode {
        id,
        label: u64_at(0),
        split_axis,
        parent: u64_at(12),
        left: u64_at(20),
        right: u64_at(28),
        position: decode_vector(&blobs[..vlen], dim)?,
        max_range: decode_vector(&blobs[vlen..2 * vlen], dim)?,
        min_range: decode_vector(&blobs[2 * vlen..], dim)?,
    })
}

//! Packed compressed-edge geometries.
//!
//! One entry per directed compressed edge: the node chain including both
//! endpoints, with cumulative traversal weights. The offset index is
//! monotonically non-decreasing so `offsets[id]..offsets[id + 1]` is always
//! a valid slice.

use std::path::Path;

use anyhow::{ensure, Result};

use super::fingerprint::{RecordReader, RecordWriter};
use crate::types::{EdgeWeight, GeometryId, NodeId};

const FINGERPRINT: [u8; 4] = *b"WMGE";
const VERSION: u16 = 1;

#[derive(Debug, Default)]
pub struct PackedGeometryTable {
    offsets: Vec<u32>,
    nodes: Vec<NodeId>,
    /// Cumulative weight at each node, starting at 0.
    weights: Vec<EdgeWeight>,
}

impl PackedGeometryTable {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            nodes: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Append a directed chain; entries are `(node, cumulative weight)`.
    pub fn push(&mut self, chain: &[(NodeId, EdgeWeight)]) -> GeometryId {
        debug_assert!(chain.len() >= 2, "a geometry has at least two nodes");
        let id = (self.offsets.len() - 1) as GeometryId;
        for &(node, weight) in chain {
            self.nodes.push(node);
            self.weights.push(weight);
        }
        self.offsets.push(self.nodes.len() as u32);
        id
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node chain of a geometry, endpoints included.
    pub fn nodes(&self, id: GeometryId) -> &[NodeId] {
        let (start, end) = self.bounds(id);
        &self.nodes[start..end]
    }

    /// Cumulative weights parallel to `nodes`, first entry 0.
    pub fn cumulative_weights(&self, id: GeometryId) -> &[EdgeWeight] {
        let (start, end) = self.bounds(id);
        &self.weights[start..end]
    }

    /// Per-segment weights: differences of consecutive cumulative weights.
    pub fn segment_weights(&self, id: GeometryId) -> Vec<EdgeWeight> {
        let cumulative = self.cumulative_weights(id);
        cumulative.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn bounds(&self, id: GeometryId) -> (usize, usize) {
        let start = self.offsets[id as usize] as usize;
        let end = self.offsets[id as usize + 1] as usize;
        (start, end)
    }
}

pub fn write<P: AsRef<Path>>(path: P, table: &PackedGeometryTable) -> Result<()> {
    let mut writer = RecordWriter::create(path, FINGERPRINT, VERSION)?;
    writer.write_u32(table.offsets.len() as u32)?;
    for &offset in &table.offsets {
        writer.write_u32(offset)?;
    }
    writer.write_u32(table.nodes.len() as u32)?;
    for (&node, &weight) in table.nodes.iter().zip(&table.weights) {
        writer.write_u32(node)?;
        writer.write_i32(weight)?;
    }
    writer.finish()
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<PackedGeometryTable> {
    let mut reader = RecordReader::open(path, FINGERPRINT, VERSION)?;
    let offset_count = reader.read_u32()? as usize;
    ensure!(offset_count >= 1, "geometry offset table cannot be empty");
    let mut offsets = Vec::with_capacity(offset_count);
    for _ in 0..offset_count {
        offsets.push(reader.read_u32()?);
    }
    let entry_count = reader.read_u32()? as usize;
    let mut nodes = Vec::with_capacity(entry_count);
    let mut weights = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        nodes.push(reader.read_u32()?);
        weights.push(reader.read_i32()?);
    }
    reader.finish()?;

    let mut previous = 0u32;
    for &offset in &offsets {
        ensure!(offset >= previous, "geometry offsets must be non-decreasing");
        previous = offset;
    }
    ensure!(
        *offsets.last().unwrap() as usize == nodes.len(),
        "geometry offsets do not cover the node table"
    );

    Ok(PackedGeometryTable {
        offsets,
        nodes,
        weights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_push_and_slice() {
        let mut table = PackedGeometryTable::new();
        let a = table.push(&[(5, 0), (6, 10), (7, 30)]);
        let b = table.push(&[(7, 0), (5, 12)]);

        assert_eq!(table.nodes(a), &[5, 6, 7]);
        assert_eq!(table.cumulative_weights(a), &[0, 10, 30]);
        assert_eq!(table.segment_weights(a), vec![10, 20]);
        assert_eq!(table.nodes(b), &[7, 5]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let mut table = PackedGeometryTable::new();
        table.push(&[(1, 0), (2, 7)]);
        table.push(&[(2, 0), (3, 4), (4, 9)]);

        let tmp = NamedTempFile::new()?;
        write(tmp.path(), &table)?;
        let loaded = read(tmp.path())?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.nodes(1), &[2, 3, 4]);
        assert_eq!(loaded.segment_weights(1), vec![4, 5]);
        Ok(())
    }
}

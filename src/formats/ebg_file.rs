//! Edge-based graph tables.
//!
//! `.osrm.nodes` carries the edge-based node data, component assignment and
//! the snappable segment records; `.osrm.ebg` the turn edges; `.osrm.edges`
//! the per-turn guidance payload.

use std::path::Path;

use anyhow::Result;

use super::fingerprint::{RecordReader, RecordWriter};
use crate::extractor::edge_expander::{
    EdgeBasedEdge, EdgeBasedNodeData, EdgeBasedNodeSegment, TurnData,
};
use crate::extractor::guidance::lanes::LaneTuple;
use crate::extractor::guidance::turn_instruction::TurnInstruction;
use crate::types::{ComponentId, SegmentId, TravelMode};

const NODES_FINGERPRINT: [u8; 4] = *b"WMEN";
const EBG_FINGERPRINT: [u8; 4] = *b"WMEB";
const EDGES_FINGERPRINT: [u8; 4] = *b"WMED";
const VERSION: u16 = 1;

/// Component membership of an edge-based node: 31-bit id plus a tiny flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub is_tiny: bool,
}

impl ComponentInfo {
    fn pack(&self) -> u32 {
        (self.id & 0x7FFF_FFFF) | ((self.is_tiny as u32) << 31)
    }

    fn unpack(value: u32) -> Self {
        Self {
            id: value & 0x7FFF_FFFF,
            is_tiny: value >> 31 != 0,
        }
    }
}

pub struct EdgeBasedNodesData {
    pub node_data: Vec<EdgeBasedNodeData>,
    pub components: Vec<ComponentInfo>,
    pub segments: Vec<EdgeBasedNodeSegment>,
}

pub fn write_nodes<P: AsRef<Path>>(path: P, data: &EdgeBasedNodesData) -> Result<()> {
    let mut writer = RecordWriter::create(path, NODES_FINGERPRINT, VERSION)?;

    writer.write_u32(data.node_data.len() as u32)?;
    for (node, component) in data.node_data.iter().zip(&data.components) {
        writer.write_u32(node.geometry_id)?;
        writer.write_u32(node.name_id)?;
        writer.write_i32(node.weight)?;
        writer.write_u8(node.travel_mode as u8)?;
        writer.write_u8(node.startpoint as u8)?;
        writer.write_u32(component.pack())?;
    }

    writer.write_u32(data.segments.len() as u32)?;
    for segment in &data.segments {
        writer.write_u32(segment.forward_segment_id.id)?;
        writer.write_u32(segment.reverse_segment_id.id)?;
        let flags =
            segment.forward_segment_id.enabled as u8 | ((segment.reverse_segment_id.enabled as u8) << 1)
                | ((segment.is_startpoint as u8) << 2);
        writer.write_u8(flags)?;
        writer.write_u32(segment.u)?;
        writer.write_u32(segment.v)?;
        writer.write_u32(segment.name_id)?;
        writer.write_u32(segment.forward_packed_geometry_id)?;
        writer.write_u32(segment.reverse_packed_geometry_id)?;
        writer.write_u16(segment.fwd_segment_position)?;
        writer.write_u8(segment.forward_travel_mode as u8)?;
        writer.write_u8(segment.backward_travel_mode as u8)?;
    }

    writer.finish()
}

pub fn read_nodes<P: AsRef<Path>>(path: P) -> Result<EdgeBasedNodesData> {
    let mut reader = RecordReader::open(path, NODES_FINGERPRINT, VERSION)?;

    let node_count = reader.read_u32()? as usize;
    let mut node_data = Vec::with_capacity(node_count);
    let mut components = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let geometry_id = reader.read_u32()?;
        let name_id = reader.read_u32()?;
        let weight = reader.read_i32()?;
        let travel_mode = TravelMode::from_u8(reader.read_u8()?);
        let startpoint = reader.read_u8()? != 0;
        components.push(ComponentInfo::unpack(reader.read_u32()?));
        node_data.push(EdgeBasedNodeData {
            geometry_id,
            name_id,
            travel_mode,
            weight,
            startpoint,
        });
    }

    let segment_count = reader.read_u32()? as usize;
    let mut segments = Vec::with_capacity(segment_count);
    for _ in 0..segment_count {
        let forward_id = reader.read_u32()?;
        let reverse_id = reader.read_u32()?;
        let flags = reader.read_u8()?;
        segments.push(EdgeBasedNodeSegment {
            forward_segment_id: SegmentId {
                id: forward_id,
                enabled: flags & 1 != 0,
            },
            reverse_segment_id: SegmentId {
                id: reverse_id,
                enabled: flags & 2 != 0,
            },
            u: reader.read_u32()?,
            v: reader.read_u32()?,
            name_id: reader.read_u32()?,
            forward_packed_geometry_id: reader.read_u32()?,
            reverse_packed_geometry_id: reader.read_u32()?,
            fwd_segment_position: reader.read_u16()?,
            forward_travel_mode: TravelMode::from_u8(reader.read_u8()?),
            backward_travel_mode: TravelMode::from_u8(reader.read_u8()?),
            is_startpoint: flags & 4 != 0,
        });
    }

    reader.finish()?;
    Ok(EdgeBasedNodesData {
        node_data,
        components,
        segments,
    })
}

pub fn write_edges<P: AsRef<Path>>(path: P, edges: &[EdgeBasedEdge]) -> Result<()> {
    let mut writer = RecordWriter::create(path, EBG_FINGERPRINT, VERSION)?;
    writer.write_u32(edges.len() as u32)?;
    for edge in edges {
        writer.write_u32(edge.source)?;
        writer.write_u32(edge.target)?;
        writer.write_i32(edge.weight)?;
    }
    writer.finish()
}

pub fn read_edges<P: AsRef<Path>>(path: P) -> Result<Vec<EdgeBasedEdge>> {
    let mut reader = RecordReader::open(path, EBG_FINGERPRINT, VERSION)?;
    let count = reader.read_u32()? as usize;
    let mut edges = Vec::with_capacity(count);
    for _ in 0..count {
        edges.push(EdgeBasedEdge {
            source: reader.read_u32()?,
            target: reader.read_u32()?,
            weight: reader.read_i32()?,
        });
    }
    reader.finish()?;
    Ok(edges)
}

pub fn write_turn_data<P: AsRef<Path>>(path: P, turns: &[TurnData]) -> Result<()> {
    let mut writer = RecordWriter::create(path, EDGES_FINGERPRINT, VERSION)?;
    writer.write_u32(turns.len() as u32)?;
    for turn in turns {
        writer.write_u8(turn.instruction.pack())?;
        writer.write_u32(turn.lane_description_id)?;
        writer.write_u8(turn.lane_tuple.lanes_in_turn)?;
        writer.write_u8(turn.lane_tuple.first_lane_from_the_right)?;
        writer.write_i32(turn.turn_penalty)?;
        writer.write_u16(turn.pre_bearing)?;
        writer.write_u16(turn.post_bearing)?;
        writer.write_u32(turn.bearing_class_id)?;
        writer.write_u32(turn.entry_class_id)?;
    }
    writer.finish()
}

pub fn read_turn_data<P: AsRef<Path>>(path: P) -> Result<Vec<TurnData>> {
    let mut reader = RecordReader::open(path, EDGES_FINGERPRINT, VERSION)?;
    let count = reader.read_u32()? as usize;
    let mut turns = Vec::with_capacity(count);
    for _ in 0..count {
        turns.push(TurnData {
            instruction: TurnInstruction::unpack(reader.read_u8()?),
            lane_description_id: reader.read_u32()?,
            lane_tuple: LaneTuple {
                lanes_in_turn: reader.read_u8()?,
                first_lane_from_the_right: reader.read_u8()?,
            },
            turn_penalty: reader.read_i32()?,
            pre_bearing: reader.read_u16()?,
            post_bearing: reader.read_u16()?,
            bearing_class_id: reader.read_u32()?,
            entry_class_id: reader.read_u32()?,
        });
    }
    reader.finish()?;
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::guidance::turn_instruction::{DirectionModifier, TurnType};
    use crate::types::INVALID_GEOMETRY_ID;
    use tempfile::NamedTempFile;

    #[test]
    fn test_component_packing() {
        let info = ComponentInfo {
            id: 12345,
            is_tiny: true,
        };
        assert_eq!(ComponentInfo::unpack(info.pack()), info);
        let big = ComponentInfo {
            id: 0x7FFF_FFFF,
            is_tiny: false,
        };
        assert_eq!(ComponentInfo::unpack(big.pack()), big);
    }

    #[test]
    fn test_nodes_round_trip() -> Result<()> {
        let data = EdgeBasedNodesData {
            node_data: vec![EdgeBasedNodeData {
                geometry_id: 7,
                name_id: 4,
                travel_mode: TravelMode::Driving,
                weight: 55,
                startpoint: true,
            }],
            components: vec![ComponentInfo {
                id: 0,
                is_tiny: false,
            }],
            segments: vec![EdgeBasedNodeSegment {
                forward_segment_id: SegmentId {
                    id: 0,
                    enabled: true,
                },
                reverse_segment_id: SegmentId {
                    id: 1,
                    enabled: false,
                },
                u: 10,
                v: 11,
                name_id: 4,
                forward_packed_geometry_id: 7,
                reverse_packed_geometry_id: INVALID_GEOMETRY_ID,
                fwd_segment_position: 2,
                forward_travel_mode: TravelMode::Driving,
                backward_travel_mode: TravelMode::Inaccessible,
                is_startpoint: true,
            }],
        };

        let tmp = NamedTempFile::new()?;
        write_nodes(tmp.path(), &data)?;
        let loaded = read_nodes(tmp.path())?;
        assert_eq!(loaded.node_data.len(), 1);
        assert_eq!(loaded.node_data[0].weight, 55);
        assert_eq!(loaded.segments[0].fwd_segment_position, 2);
        assert!(loaded.segments[0].forward_segment_id.enabled);
        assert!(!loaded.segments[0].reverse_segment_id.enabled);
        Ok(())
    }

    #[test]
    fn test_turn_data_round_trip() -> Result<()> {
        let turns = vec![TurnData {
            instruction: TurnInstruction::new(TurnType::Turn, DirectionModifier::Left),
            lane_description_id: 3,
            lane_tuple: LaneTuple {
                lanes_in_turn: 2,
                first_lane_from_the_right: 1,
            },
            turn_penalty: 42,
            pre_bearing: 270,
            post_bearing: 180,
            bearing_class_id: 0,
            entry_class_id: 1,
        }];
        let tmp = NamedTempFile::new()?;
        write_turn_data(tmp.path(), &turns)?;
        let loaded = read_turn_data(tmp.path())?;
        assert_eq!(loaded[0].instruction.turn_type, TurnType::Turn);
        assert_eq!(loaded[0].lane_tuple.lanes_in_turn, 2);
        assert_eq!(loaded[0].turn_penalty, 42);
        Ok(())
    }
}

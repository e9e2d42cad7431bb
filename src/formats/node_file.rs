//! `.osrm` — internal nodes and deduplicated node-based edges.

use std::path::Path;

use anyhow::Result;

use super::fingerprint::{RecordReader, RecordWriter};
use crate::extractor::graph_builder::{InternalNode, NodeBasedEdge};
use crate::geo::Coordinate;
use crate::types::{RoadClassification, RoadPriority, TravelMode};

const FINGERPRINT: [u8; 4] = *b"WMRK";
const VERSION: u16 = 1;

const FLAG_FORWARD: u8 = 1 << 0;
const FLAG_BACKWARD: u8 = 1 << 1;
const FLAG_ROUNDABOUT: u8 = 1 << 2;
const FLAG_STARTPOINT: u8 = 1 << 3;
const FLAG_SPLIT: u8 = 1 << 4;

const NODE_FLAG_BARRIER: u8 = 1 << 0;
const NODE_FLAG_SIGNAL: u8 = 1 << 1;

const CLASS_FLAG_LINK: u8 = 1 << 0;
const CLASS_FLAG_MOTORWAY: u8 = 1 << 1;
const CLASS_FLAG_RAMP: u8 = 1 << 2;

fn pack_classification(classification: &RoadClassification) -> [u8; 2] {
    let mut flags = 0u8;
    if classification.link {
        flags |= CLASS_FLAG_LINK;
    }
    if classification.motorway {
        flags |= CLASS_FLAG_MOTORWAY;
    }
    if classification.ramp {
        flags |= CLASS_FLAG_RAMP;
    }
    [classification.priority as u8, flags]
}

fn unpack_classification(bytes: [u8; 2]) -> RoadClassification {
    let priority = match bytes[0] {
        0 => RoadPriority::Motorway,
        2 => RoadPriority::Trunk,
        4 => RoadPriority::Primary,
        6 => RoadPriority::Secondary,
        8 => RoadPriority::Tertiary,
        10 => RoadPriority::MainResidential,
        11 => RoadPriority::SideResidential,
        12 => RoadPriority::Link,
        14 => RoadPriority::Service,
        16 => RoadPriority::Ferry,
        18 => RoadPriority::Path,
        _ => RoadPriority::Unknown,
    };
    RoadClassification {
        priority,
        link: bytes[1] & CLASS_FLAG_LINK != 0,
        motorway: bytes[1] & CLASS_FLAG_MOTORWAY != 0,
        ramp: bytes[1] & CLASS_FLAG_RAMP != 0,
    }
}

pub fn write<P: AsRef<Path>>(
    path: P,
    nodes: &[InternalNode],
    edges: &[NodeBasedEdge],
) -> Result<()> {
    let mut writer = RecordWriter::create(path, FINGERPRINT, VERSION)?;

    writer.write_u32(nodes.len() as u32)?;
    for node in nodes {
        writer.write_i32(node.coordinate.lon)?;
        writer.write_i32(node.coordinate.lat)?;
        writer.write_i64(node.osm_id)?;
        let mut flags = 0u8;
        if node.barrier {
            flags |= NODE_FLAG_BARRIER;
        }
        if node.traffic_signal {
            flags |= NODE_FLAG_SIGNAL;
        }
        writer.write_u8(flags)?;
    }

    writer.write_u32(edges.len() as u32)?;
    for edge in edges {
        writer.write_u32(edge.source)?;
        writer.write_u32(edge.target)?;
        writer.write_i32(edge.weight)?;
        writer.write_u32(edge.name_id)?;
        writer.write_u32(edge.lane_description_id)?;
        writer.write_u8(edge.travel_mode as u8)?;
        let mut flags = 0u8;
        if edge.forward {
            flags |= FLAG_FORWARD;
        }
        if edge.backward {
            flags |= FLAG_BACKWARD;
        }
        if edge.roundabout {
            flags |= FLAG_ROUNDABOUT;
        }
        if edge.startpoint {
            flags |= FLAG_STARTPOINT;
        }
        if edge.is_split {
            flags |= FLAG_SPLIT;
        }
        writer.write_u8(flags)?;
        writer.write_bytes(&pack_classification(&edge.classification))?;
    }

    writer.finish()
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<(Vec<InternalNode>, Vec<NodeBasedEdge>)> {
    let mut reader = RecordReader::open(path, FINGERPRINT, VERSION)?;

    let node_count = reader.read_u32()? as usize;
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let lon = reader.read_i32()?;
        let lat = reader.read_i32()?;
        let osm_id = reader.read_i64()?;
        let flags = reader.read_u8()?;
        nodes.push(InternalNode {
            coordinate: Coordinate::new(lon, lat),
            osm_id,
            barrier: flags & NODE_FLAG_BARRIER != 0,
            traffic_signal: flags & NODE_FLAG_SIGNAL != 0,
        });
    }

    let edge_count = reader.read_u32()? as usize;
    let mut edges = Vec::with_capacity(edge_count);
    for _ in 0..edge_count {
        let source = reader.read_u32()?;
        let target = reader.read_u32()?;
        let weight = reader.read_i32()?;
        let name_id = reader.read_u32()?;
        let lane_description_id = reader.read_u32()?;
        let travel_mode = TravelMode::from_u8(reader.read_u8()?);
        let flags = reader.read_u8()?;
        let mut class_bytes = [0u8; 2];
        reader.read_bytes(&mut class_bytes)?;
        edges.push(NodeBasedEdge {
            source,
            target,
            weight,
            forward: flags & FLAG_FORWARD != 0,
            backward: flags & FLAG_BACKWARD != 0,
            name_id,
            travel_mode,
            lane_description_id,
            roundabout: flags & FLAG_ROUNDABOUT != 0,
            startpoint: flags & FLAG_STARTPOINT != 0,
            is_split: flags & FLAG_SPLIT != 0,
            classification: unpack_classification(class_bytes),
        });
    }

    reader.finish()?;
    Ok((nodes, edges))
}

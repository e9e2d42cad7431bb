//! Graph construction: raw annotated streams to a compact internal graph.
//!
//! Assigns dense internal ids to referenced nodes, explodes ways into
//! weighted directed segments, deduplicates parallel edges, and resolves
//! turn restrictions to internal node triples.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

use super::guidance::lanes::LaneDescriptionRegistry;
use super::raw::{RawDataset, RawWay};
use crate::formats::names_file::NameTableBuilder;
use crate::geo::{haversine_distance, Coordinate};
use crate::profile::{Profile, SegmentWeight};
use crate::types::{
    EdgeWeight, LaneDescriptionId, NameId, NodeId, OsmNodeId, OsmWayId, RoadClassification,
    TravelMode, INVALID_LANE_DESCRIPTION_ID,
};

/// An intersection (or geometry) node of the internal graph.
#[derive(Debug, Clone, Copy)]
pub struct InternalNode {
    pub coordinate: Coordinate,
    pub osm_id: OsmNodeId,
    pub barrier: bool,
    pub traffic_signal: bool,
}

/// A deduplicated directed segment row. Oriented so `source < target`;
/// `is_split` marks pairs stored as separate rows with differing weights.
#[derive(Debug, Clone, Copy)]
pub struct NodeBasedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: EdgeWeight,
    pub forward: bool,
    pub backward: bool,
    pub name_id: NameId,
    pub travel_mode: TravelMode,
    pub lane_description_id: LaneDescriptionId,
    pub roundabout: bool,
    pub startpoint: bool,
    pub is_split: bool,
    pub classification: RoadClassification,
}

/// A turn restriction resolved to internal node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalRestriction {
    pub from: NodeId,
    pub via: NodeId,
    pub to: NodeId,
    pub only: bool,
}

#[derive(Debug, Default)]
pub struct GraphBuilderOutput {
    pub nodes: Vec<InternalNode>,
    pub edges: Vec<NodeBasedEdge>,
    pub restrictions: Vec<InternalRestriction>,
    pub invalid_restriction_count: usize,
    pub dropped_edge_count: usize,
}

/// One exploded way segment before deduplication.
#[derive(Debug, Clone, Copy)]
struct AnnotatedSegment {
    source: NodeId,
    target: NodeId,
    forward_weight: Option<EdgeWeight>,
    backward_weight: Option<EdgeWeight>,
    name_id: NameId,
    travel_mode: TravelMode,
    lane_description_id: LaneDescriptionId,
    roundabout: bool,
    startpoint: bool,
    classification: RoadClassification,
}

pub fn build_graph(
    dataset: &RawDataset,
    profile: &dyn Profile,
    names: &mut NameTableBuilder,
    lanes: &mut LaneDescriptionRegistry,
) -> Result<GraphBuilderOutput> {
    // 1. referenced node ids, sorted and deduplicated
    let mut referenced: Vec<OsmNodeId> = dataset
        .ways
        .iter()
        .flat_map(|way| way.nodes.iter().copied())
        .collect();
    referenced.sort_unstable();
    referenced.dedup();

    if referenced.len() > u32::MAX as usize {
        bail!("node count {} exceeds the 2^32 internal id space", referenced.len());
    }

    // 2. intersect sorted raw nodes with the referenced set by linear merge
    let mut raw_nodes: Vec<&super::raw::RawNode> = dataset.nodes.iter().collect();
    raw_nodes.sort_unstable_by_key(|n| n.osm_id);
    raw_nodes.dedup_by_key(|n| n.osm_id);

    let mut nodes = Vec::with_capacity(referenced.len());
    let mut id_map: FxHashMap<OsmNodeId, NodeId> = FxHashMap::default();
    {
        let mut raw_iter = raw_nodes.iter().peekable();
        for &osm_id in &referenced {
            while raw_iter.peek().map_or(false, |n| n.osm_id < osm_id) {
                raw_iter.next();
            }
            match raw_iter.peek() {
                Some(node) if node.osm_id == osm_id => {
                    id_map.insert(osm_id, nodes.len() as NodeId);
                    nodes.push(InternalNode {
                        coordinate: node.coordinate,
                        osm_id,
                        barrier: node.annotation.barrier,
                        traffic_signal: node.annotation.traffic_signal,
                    });
                }
                _ => {
                    tracing::debug!(osm_id, "way references a node missing from the input");
                }
            }
        }
    }

    // 3-5. explode ways into weighted segments
    let mut segments = Vec::new();
    let mut dropped = 0usize;
    for way in &dataset.ways {
        dropped += explode_way(way, profile, names, lanes, &nodes, &id_map, &mut segments);
    }

    // 6. orient so source < target
    for segment in &mut segments {
        if segment.source > segment.target {
            std::mem::swap(&mut segment.source, &mut segment.target);
            std::mem::swap(&mut segment.forward_weight, &mut segment.backward_weight);
        }
    }

    // 7. group by (source, target); keep minimum-weight candidates per direction
    segments.sort_unstable_by_key(|s| (s.source, s.target, s.name_id));
    let edges = deduplicate_segments(&segments);

    // 8. resolve restrictions
    let (restrictions, invalid_restriction_count) =
        resolve_restrictions(dataset, &id_map);

    Ok(GraphBuilderOutput {
        nodes,
        edges,
        restrictions,
        invalid_restriction_count,
        dropped_edge_count: dropped,
    })
}

/// Explode one way into annotated segments; returns the number of dropped
/// (self-loop or dangling) segments.
#[allow(clippy::too_many_arguments)]
fn explode_way(
    way: &RawWay,
    profile: &dyn Profile,
    names: &mut NameTableBuilder,
    lanes: &mut LaneDescriptionRegistry,
    nodes: &[InternalNode],
    id_map: &FxHashMap<OsmNodeId, NodeId>,
    segments: &mut Vec<AnnotatedSegment>,
) -> usize {
    let annotation = &way.annotation;
    let name_id = names.add(
        &annotation.name,
        &annotation.reference,
        &annotation.pronunciation,
        &annotation.destinations,
    );
    let lane_description_id = if annotation.lane_string.is_empty() {
        INVALID_LANE_DESCRIPTION_ID
    } else {
        lanes.register(&annotation.lane_string)
    };

    // total length is needed up front to split a fixed duration over segments
    let mut way_length = 0.0f64;
    if annotation.duration.is_some() {
        for window in way.nodes.windows(2) {
            if let (Some(&a), Some(&b)) = (id_map.get(&window[0]), id_map.get(&window[1])) {
                way_length +=
                    haversine_distance(nodes[a as usize].coordinate, nodes[b as usize].coordinate);
            }
        }
    }

    let mut dropped = 0usize;
    for window in way.nodes.windows(2) {
        if window[0] == window[1] {
            dropped += 1;
            continue;
        }
        let (Some(&source), Some(&target)) = (id_map.get(&window[0]), id_map.get(&window[1]))
        else {
            tracing::debug!(way_id = way.osm_id, "segment references an unknown node");
            dropped += 1;
            continue;
        };

        let from = nodes[source as usize].coordinate;
        let to = nodes[target as usize].coordinate;
        let distance = haversine_distance(from, to);

        let forward_weight = direction_weight(
            profile,
            from,
            to,
            distance,
            annotation.forward_speed,
            annotation.duration,
            way_length,
        );
        let backward_weight = direction_weight(
            profile,
            to,
            from,
            distance,
            annotation.backward_speed,
            annotation.duration,
            way_length,
        );
        if forward_weight.is_none() && backward_weight.is_none() {
            dropped += 1;
            continue;
        }

        segments.push(AnnotatedSegment {
            source,
            target,
            forward_weight,
            backward_weight,
            name_id,
            travel_mode: annotation.forward_mode,
            lane_description_id,
            roundabout: annotation.roundabout,
            startpoint: annotation.startpoint,
            classification: annotation.classification,
        });
    }
    dropped
}

/// Final integer weight for one direction of a segment, if traversable.
fn direction_weight(
    profile: &dyn Profile,
    from: Coordinate,
    to: Coordinate,
    distance: f64,
    speed: f64,
    duration: Option<f64>,
    way_length: f64,
) -> Option<EdgeWeight> {
    if speed <= 0.0 && duration.is_none() {
        return None;
    }
    let mut weight = SegmentWeight { speed, duration };
    profile.process_segment(from, to, distance, &mut weight);

    let seconds = match weight.duration {
        Some(total) if way_length > 0.0 => total * (distance / way_length),
        Some(total) => total,
        None => distance / (weight.speed / 3.6),
    };
    // deciseconds, strictly positive
    Some(((seconds * 10.0).round() as EdgeWeight).max(1))
}

/// Keep, per `(source, target)` pair, the cheapest forward and cheapest
/// backward candidate. Equal-weight pairs merge into one bidirectional row.
fn deduplicate_segments(segments: &[AnnotatedSegment]) -> Vec<NodeBasedEdge> {
    let mut edges = Vec::new();
    let mut i = 0;
    while i < segments.len() {
        let mut j = i;
        while j < segments.len()
            && segments[j].source == segments[i].source
            && segments[j].target == segments[i].target
        {
            j += 1;
        }
        let group = &segments[i..j];

        let best_forward = group
            .iter()
            .filter(|s| s.forward_weight.is_some())
            .min_by_key(|s| s.forward_weight.unwrap());
        let best_backward = group
            .iter()
            .filter(|s| s.backward_weight.is_some())
            .min_by_key(|s| s.backward_weight.unwrap());

        match (best_forward, best_backward) {
            (Some(fwd), Some(bwd)) => {
                let fw = fwd.forward_weight.unwrap();
                let bw = bwd.backward_weight.unwrap();
                if fw == bw {
                    edges.push(make_edge(fwd, fw, true, true, false));
                } else {
                    edges.push(make_edge(fwd, fw, true, false, true));
                    edges.push(make_edge(bwd, bw, false, true, true));
                }
            }
            (Some(fwd), None) => {
                edges.push(make_edge(fwd, fwd.forward_weight.unwrap(), true, false, false));
            }
            (None, Some(bwd)) => {
                edges.push(make_edge(bwd, bwd.backward_weight.unwrap(), false, true, false));
            }
            (None, None) => {}
        }
        i = j;
    }
    edges
}

fn make_edge(
    segment: &AnnotatedSegment,
    weight: EdgeWeight,
    forward: bool,
    backward: bool,
    is_split: bool,
) -> NodeBasedEdge {
    NodeBasedEdge {
        source: segment.source,
        target: segment.target,
        weight,
        forward,
        backward,
        name_id: segment.name_id,
        travel_mode: segment.travel_mode,
        lane_description_id: segment.lane_description_id,
        roundabout: segment.roundabout,
        startpoint: segment.startpoint,
        is_split,
        classification: segment.classification,
    }
}

/// Map restrictions to internal node triples. The `via` node must be an
/// endpoint of both the `from` and `to` ways; anything else is invalidated.
fn resolve_restrictions(
    dataset: &RawDataset,
    id_map: &FxHashMap<OsmNodeId, NodeId>,
) -> (Vec<InternalRestriction>, usize) {
    let mut restricted_ways: FxHashMap<OsmWayId, &[OsmNodeId]> = FxHashMap::default();
    for restriction in &dataset.restrictions {
        restricted_ways.insert(restriction.from_way, &[]);
        restricted_ways.insert(restriction.to_way, &[]);
    }
    for way in &dataset.ways {
        if let Some(slot) = restricted_ways.get_mut(&way.osm_id) {
            *slot = &way.nodes;
        }
    }

    let neighbor_of_via = |way_id: OsmWayId, via: OsmNodeId| -> Option<OsmNodeId> {
        let nodes = restricted_ways.get(&way_id)?;
        if nodes.len() < 2 {
            return None;
        }
        if nodes[0] == via {
            Some(nodes[1])
        } else if nodes[nodes.len() - 1] == via {
            Some(nodes[nodes.len() - 2])
        } else {
            None
        }
    };

    let mut resolved = Vec::new();
    let mut invalid = 0usize;
    for restriction in &dataset.restrictions {
        let from_osm = neighbor_of_via(restriction.from_way, restriction.via_node);
        let to_osm = neighbor_of_via(restriction.to_way, restriction.via_node);
        let mapped = (|| {
            Some(InternalRestriction {
                from: *id_map.get(&from_osm?)?,
                via: *id_map.get(&restriction.via_node)?,
                to: *id_map.get(&to_osm?)?,
                only: restriction.only,
            })
        })();
        match mapped {
            Some(internal) => resolved.push(internal),
            None => {
                invalid += 1;
                tracing::debug!(
                    from_way = restriction.from_way,
                    via = restriction.via_node,
                    to_way = restriction.to_way,
                    "restriction references nodes outside the filtered graph"
                );
            }
        }
    }
    (resolved, invalid)
}

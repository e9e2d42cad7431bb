//! Edge expansion: the compressed node-based graph becomes the edge-based
//! routing graph.
//!
//! Every traversable directed edge turns into an edge-based node; every
//! legal turn at an intersection becomes an edge-based edge whose weight is
//! the incoming edge weight plus the turn penalty. Guidance annotation runs
//! here, once per (incoming edge, intersection) pair.

use rustc_hash::FxHashMap;

use super::compressor::CompressedEdgeContainer;
use super::graph_builder::InternalNode;
use super::guidance::classify::{annotate_intersection, classify};
use super::guidance::intersection::build_intersection;
use super::guidance::lanes::{assign_lanes, LaneDescriptionRegistry, LaneTuple};
use super::guidance::roundabouts::classify_roundabout;
use super::guidance::turn_instruction::{DirectionModifier, TurnInstruction, TurnType};
use super::node_based_graph::NodeBasedGraph;
use super::restriction_map::RestrictionMap;
use super::scc::{assign_components, ComponentAssignment};
use crate::formats::geometry_file::PackedGeometryTable;
use crate::profile::Profile;
use crate::types::{
    EdgeWeight, GeometryId, LaneDescriptionId, NameId, NodeId, SegmentId, TravelMode,
    INVALID_GEOMETRY_ID, INVALID_LANE_DESCRIPTION_ID, INVALID_NODE_ID,
};

/// Per edge-based node data the router reads back through the facade.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNodeData {
    pub geometry_id: GeometryId,
    pub name_id: NameId,
    pub travel_mode: TravelMode,
    pub weight: EdgeWeight,
    pub startpoint: bool,
}

/// A snappable geometry segment: one sub-segment of a compressed edge pair,
/// carrying both directions and their split metadata.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNodeSegment {
    pub forward_segment_id: SegmentId,
    pub reverse_segment_id: SegmentId,
    /// Node-based endpoints of this sub-segment, in forward direction.
    pub u: NodeId,
    pub v: NodeId,
    pub name_id: NameId,
    pub forward_packed_geometry_id: GeometryId,
    pub reverse_packed_geometry_id: GeometryId,
    /// Index of this sub-segment within the forward geometry.
    pub fwd_segment_position: u16,
    pub forward_travel_mode: TravelMode,
    pub backward_travel_mode: TravelMode,
    pub is_startpoint: bool,
}

/// A directed turn edge between edge-based nodes.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: EdgeWeight,
}

/// Guidance payload per turn edge, persisted to `.osrm.edges`.
#[derive(Debug, Clone, Copy)]
pub struct TurnData {
    pub instruction: TurnInstruction,
    pub lane_description_id: LaneDescriptionId,
    pub lane_tuple: LaneTuple,
    /// Penalty share of the edge weight, deciseconds.
    pub turn_penalty: EdgeWeight,
    /// Bearing of travel entering the intersection, whole degrees.
    pub pre_bearing: u16,
    /// Bearing of travel leaving the intersection, whole degrees.
    pub post_bearing: u16,
    pub bearing_class_id: u32,
    pub entry_class_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeExpanderConfig {
    pub small_component_size: usize,
}

impl Default for EdgeExpanderConfig {
    fn default() -> Self {
        Self {
            small_component_size: super::scc::DEFAULT_SMALL_COMPONENT_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct EdgeExpanderOutput {
    pub node_count: u32,
    pub node_data: Vec<EdgeBasedNodeData>,
    pub segments: Vec<EdgeBasedNodeSegment>,
    pub edges: Vec<EdgeBasedEdge>,
    pub turn_data: Vec<TurnData>,
    pub geometry: PackedGeometryTable,
    pub components: ComponentAssignment,
    /// Sorted outgoing bearings per intersection class.
    pub bearing_classes: Vec<Vec<u16>>,
    /// Entry-allowed bitset per (intersection, approach) class, ordered like
    /// the bearing class.
    pub entry_classes: Vec<u32>,
}

pub fn expand_edges(
    graph: &mut NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    restrictions: &RestrictionMap,
    lanes: &LaneDescriptionRegistry,
    profile: &dyn Profile,
    config: &EdgeExpanderConfig,
) -> EdgeExpanderOutput {
    let properties = profile.properties();

    // 1. number the traversable directed edges
    let mut node_count = 0u32;
    for node in 0..graph.node_count() as NodeId {
        for index in 0..graph.degree(node) {
            let slot = graph.slot_mut(node, index);
            if slot.data.can_forward() {
                slot.data.edge_based_node_id = node_count;
                node_count += 1;
            }
        }
    }

    // 2. materialize per-direction geometries and node data
    let mut geometry = PackedGeometryTable::new();
    let mut geometry_by_key: FxHashMap<u32, GeometryId> = FxHashMap::default();
    let mut node_data = vec![
        EdgeBasedNodeData {
            geometry_id: INVALID_GEOMETRY_ID,
            name_id: 0,
            travel_mode: TravelMode::Inaccessible,
            weight: 0,
            startpoint: false,
        };
        node_count as usize
    ];
    for node in 0..graph.node_count() as NodeId {
        for index in 0..graph.degree(node) {
            let slot = *graph.slot(node, index);
            if !slot.data.can_forward() {
                continue;
            }
            let chain = container.full_geometry(
                node,
                slot.target,
                slot.data.forward_weight,
                slot.data.geometry_key,
            );
            let geometry_id = geometry.push(&chain);
            geometry_by_key.insert(slot.data.geometry_key, geometry_id);
            node_data[slot.data.edge_based_node_id as usize] = EdgeBasedNodeData {
                geometry_id,
                name_id: slot.data.name_id,
                travel_mode: slot.data.travel_mode,
                weight: slot.data.forward_weight,
                startpoint: slot.data.startpoint,
            };
        }
    }

    // 3. snappable segments, one per geometry sub-segment of each edge pair
    let mut segments = Vec::new();
    let mut direction_pairs = Vec::new();
    for node in 0..graph.node_count() as NodeId {
        for index in 0..graph.degree(node) {
            let slot = *graph.slot(node, index);
            if node > slot.target {
                continue; // handle each undirected pair once
            }
            let Some(mirror_index) = graph.find_slot(slot.target, node) else {
                continue;
            };
            let mirror = *graph.slot(slot.target, mirror_index);

            let forward_segment_id = SegmentId {
                id: slot.data.edge_based_node_id,
                enabled: slot.data.can_forward(),
            };
            let reverse_segment_id = SegmentId {
                id: mirror.data.edge_based_node_id,
                enabled: mirror.data.can_forward(),
            };
            if !forward_segment_id.enabled && !reverse_segment_id.enabled {
                continue;
            }
            direction_pairs.push((
                if forward_segment_id.enabled { forward_segment_id.id } else { INVALID_NODE_ID },
                if reverse_segment_id.enabled { reverse_segment_id.id } else { INVALID_NODE_ID },
            ));

            // forward-order node chain, regardless of which side is open
            let chain: Vec<NodeId> = if slot.data.can_forward() {
                geometry
                    .nodes(geometry_by_key[&slot.data.geometry_key])
                    .to_vec()
            } else {
                let mut reversed = geometry
                    .nodes(geometry_by_key[&mirror.data.geometry_key])
                    .to_vec();
                reversed.reverse();
                reversed
            };
            let forward_geometry = geometry_by_key
                .get(&slot.data.geometry_key)
                .copied()
                .unwrap_or(INVALID_GEOMETRY_ID);
            let reverse_geometry = geometry_by_key
                .get(&mirror.data.geometry_key)
                .copied()
                .unwrap_or(INVALID_GEOMETRY_ID);

            for position in 0..chain.len() - 1 {
                segments.push(EdgeBasedNodeSegment {
                    forward_segment_id,
                    reverse_segment_id,
                    u: chain[position],
                    v: chain[position + 1],
                    name_id: slot.data.name_id,
                    forward_packed_geometry_id: forward_geometry,
                    reverse_packed_geometry_id: reverse_geometry,
                    fwd_segment_position: position as u16,
                    forward_travel_mode: if forward_segment_id.enabled {
                        slot.data.travel_mode
                    } else {
                        TravelMode::Inaccessible
                    },
                    backward_travel_mode: if reverse_segment_id.enabled {
                        mirror.data.travel_mode
                    } else {
                        TravelMode::Inaccessible
                    },
                    is_startpoint: slot.data.startpoint,
                });
            }
        }
    }

    // 4. turn edges with guidance annotation
    let mut edges = Vec::new();
    let mut turn_data = Vec::new();
    let mut bearing_classes: Vec<Vec<u16>> = Vec::new();
    let mut bearing_class_index: FxHashMap<Vec<u16>, u32> = FxHashMap::default();
    let mut entry_classes: Vec<u32> = Vec::new();
    let mut entry_class_index: FxHashMap<u32, u32> = FxHashMap::default();

    for via in 0..graph.node_count() as NodeId {
        if graph.degree(via) == 0 {
            continue;
        }
        let via_has_signal = nodes[via as usize].traffic_signal;

        for in_index in 0..graph.degree(via) {
            let from = graph.slot(via, in_index).target;
            let Some(mirror_index) = graph.find_slot(from, via) else {
                continue;
            };
            let in_data = graph.slot(from, mirror_index).data;
            if !in_data.can_forward() {
                continue;
            }

            let intersection =
                build_intersection(graph, nodes, container, restrictions, from, via);
            let case = classify(&in_data, &intersection, || {
                classify_roundabout(graph, nodes, container, via)
            });
            let mut intersection = annotate_intersection(&in_data, case, intersection);

            // lane-driven rewrite of silent continuations
            let lane_description = if in_data.lane_description_id != INVALID_LANE_DESCRIPTION_ID {
                lanes.get(in_data.lane_description_id)
            } else {
                None
            };
            if let Some(description) = lane_description {
                for road in &mut intersection.roads {
                    if !road.entry_allowed {
                        continue;
                    }
                    if road.instruction
                        == TurnInstruction::suppressed(DirectionModifier::Straight)
                        && description.len() > 1
                    {
                        let tuple = assign_lanes(description, DirectionModifier::Straight);
                        if tuple.is_assigned()
                            && (tuple.lanes_in_turn as usize) < description.len()
                        {
                            road.instruction = TurnInstruction::new(
                                TurnType::UseLane,
                                DirectionModifier::Straight,
                            );
                        }
                    }
                }
            }

            // intersection classes for step rendering
            let mut bearings: Vec<u16> = intersection
                .roads
                .iter()
                .map(|road| road.bearing.round() as u16 % 360)
                .collect();
            bearings.sort_unstable();
            let bearing_class_id = *bearing_class_index
                .entry(bearings.clone())
                .or_insert_with(|| {
                    bearing_classes.push(bearings.clone());
                    (bearing_classes.len() - 1) as u32
                });
            let mut entry_bits = 0u32;
            for road in &intersection.roads {
                if road.entry_allowed {
                    let bearing = road.bearing.round() as u16 % 360;
                    if let Some(position) = bearings.iter().position(|&b| b == bearing) {
                        entry_bits |= 1 << position;
                    }
                }
            }
            let entry_class_id = *entry_class_index.entry(entry_bits).or_insert_with(|| {
                entry_classes.push(entry_bits);
                (entry_classes.len() - 1) as u32
            });

            let in_ebn = in_data.edge_based_node_id;
            for road in &intersection.roads {
                if !road.entry_allowed || road.instruction == TurnInstruction::INVALID {
                    continue;
                }
                let out_data = graph.slot(via, road.slot_index).data;
                debug_assert!(out_data.can_forward());

                let signed_angle = 180.0 - road.angle;
                let mut penalty =
                    (profile.turn_penalty(signed_angle) * 10.0).round() as EdgeWeight;
                if via_has_signal {
                    penalty += properties.traffic_signal_penalty;
                }

                edges.push(EdgeBasedEdge {
                    source: in_ebn,
                    target: out_data.edge_based_node_id,
                    weight: in_data.forward_weight.saturating_add(penalty),
                });
                let lane_tuple = lane_description
                    .map(|description| {
                        assign_lanes(description, road.instruction.direction_modifier)
                    })
                    .unwrap_or(LaneTuple::NONE);
                turn_data.push(TurnData {
                    instruction: road.instruction,
                    lane_description_id: in_data.lane_description_id,
                    lane_tuple,
                    turn_penalty: penalty,
                    pre_bearing: intersection.in_bearing.round() as u16 % 360,
                    post_bearing: road.bearing.round() as u16 % 360,
                    bearing_class_id,
                    entry_class_id,
                });
            }
        }
    }

    // 5. component analysis over the finished turn graph
    let components = assign_components(
        node_count,
        edges.iter().map(|edge| (edge.source, edge.target)),
        direction_pairs.into_iter(),
        config.small_component_size,
    );

    EdgeExpanderOutput {
        node_count,
        node_data,
        segments,
        edges,
        turn_data,
        geometry,
        components,
        bearing_classes,
        entry_classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::graph_builder::{InternalRestriction, NodeBasedEdge};
    use crate::geo::Coordinate;
    use crate::profile::CarProfile;
    use crate::types::{RoadClassification, RoadPriority};

    fn node(lon: f64, lat: f64) -> InternalNode {
        InternalNode {
            coordinate: Coordinate::from_degrees(lon, lat),
            osm_id: 0,
            barrier: false,
            traffic_signal: false,
        }
    }

    fn edge(source: NodeId, target: NodeId) -> NodeBasedEdge {
        NodeBasedEdge {
            source,
            target,
            weight: 10,
            forward: true,
            backward: true,
            name_id: 0,
            travel_mode: TravelMode::Driving,
            lane_description_id: INVALID_LANE_DESCRIPTION_ID,
            roundabout: false,
            startpoint: true,
            is_split: false,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
        }
    }

    fn expand(
        graph: &mut NodeBasedGraph,
        nodes: &[InternalNode],
        restrictions: &RestrictionMap,
    ) -> EdgeExpanderOutput {
        let container = CompressedEdgeContainer::new();
        let lanes = LaneDescriptionRegistry::new();
        let profile = CarProfile::new();
        expand_edges(
            graph,
            nodes,
            &container,
            restrictions,
            &lanes,
            &profile,
            &EdgeExpanderConfig {
                small_component_size: 1,
            },
        )
    }

    #[test]
    fn test_line_graph_expansion() {
        // straight line 0 - 1 - 2
        let nodes = vec![node(0.0, 0.0), node(0.001, 0.0), node(0.002, 0.0)];
        let mut graph = NodeBasedGraph::new(3, &[edge(0, 1), edge(1, 2)]);
        let restrictions = RestrictionMap::new(&[]);
        let output = expand(&mut graph, &nodes, &restrictions);

        // two undirected edges, both directions open
        assert_eq!(output.node_count, 4);
        assert_eq!(output.segments.len(), 2);
        // pass-through turns in both directions, plus dead-end u-turns at 0
        // and 2
        assert_eq!(output.edges.len(), 4);
        assert_eq!(output.turn_data.len(), 4);

        // I1: every segment has at least one enabled direction
        for segment in &output.segments {
            assert!(segment.forward_segment_id.enabled || segment.reverse_segment_id.enabled);
        }
        // I2: strictly positive turn weights
        for turn in &output.edges {
            assert!(turn.weight > 0);
        }

        // the straight continuation carries no turn penalty
        let through: Vec<&TurnData> = output
            .turn_data
            .iter()
            .filter(|t| t.instruction.turn_type == TurnType::Suppressed)
            .collect();
        assert_eq!(through.len(), 2);
        for turn in through {
            assert_eq!(turn.turn_penalty, 0);
        }

        // dead end u-turns
        let uturns: Vec<&TurnData> = output
            .turn_data
            .iter()
            .filter(|t| t.instruction.direction_modifier == DirectionModifier::UTurn)
            .collect();
        assert_eq!(uturns.len(), 2);

        // I5: a bidirectional line is one component
        assert_eq!(output.components.component_sizes.len(), 1);
    }

    #[test]
    fn test_no_restriction_removes_turn() {
        let nodes = vec![node(0.0, 0.0), node(0.001, 0.0), node(0.002, 0.0)];
        let mut graph = NodeBasedGraph::new(3, &[edge(0, 1), edge(1, 2)]);
        let restrictions = RestrictionMap::new(&[InternalRestriction {
            from: 0,
            via: 1,
            to: 2,
            only: false,
        }]);
        let output = expand(&mut graph, &nodes, &restrictions);
        assert_eq!(output.edges.len(), 3);

        // the forbidden transition is absent
        let forward_in = 0; // ebn of 0 -> 1 (first slot of node 0)
        let forbidden_out = output
            .edges
            .iter()
            .find(|e| e.source == forward_in);
        assert!(forbidden_out.is_none(), "restricted turn must not be expanded");
    }

    #[test]
    fn test_only_restriction_forces_target() {
        // cross: center 0; arms west 1, east 2, north 3
        let nodes = vec![
            node(0.0, 0.0),
            node(-0.001, 0.0),
            node(0.001, 0.0),
            node(0.0, 0.001),
        ];
        let mut graph = NodeBasedGraph::new(4, &[edge(0, 1), edge(0, 2), edge(0, 3)]);
        // coming from the west you may only turn north
        let restrictions = RestrictionMap::new(&[InternalRestriction {
            from: 1,
            via: 0,
            to: 3,
            only: true,
        }]);
        let output = expand(&mut graph, &nodes, &restrictions);

        // find the edge-based node of 1 -> 0
        let in_ebn = graph
            .slot(1, graph.find_slot(1, 0).unwrap())
            .data
            .edge_based_node_id;
        let east_ebn = graph
            .slot(0, graph.find_slot(0, 2).unwrap())
            .data
            .edge_based_node_id;
        let north_ebn = graph
            .slot(0, graph.find_slot(0, 3).unwrap())
            .data
            .edge_based_node_id;

        let targets: Vec<NodeId> = output
            .edges
            .iter()
            .filter(|e| e.source == in_ebn)
            .map(|e| e.target)
            .collect();
        assert_eq!(targets, vec![north_ebn]);
        assert!(!targets.contains(&east_ebn));
    }

    #[test]
    fn test_oneway_pair_components_merge() {
        // an isolated oneway edge: forward and reverse segment directions
        // must still share a component (here reverse is disabled, so the
        // pair contributes a single direction)
        let nodes = vec![node(0.0, 0.0), node(0.001, 0.0)];
        let mut oneway = edge(0, 1);
        oneway.backward = false;
        let mut graph = NodeBasedGraph::new(2, &[oneway]);
        let restrictions = RestrictionMap::new(&[]);
        let output = expand(&mut graph, &nodes, &restrictions);
        assert_eq!(output.node_count, 1);
        assert_eq!(output.segments.len(), 1);
        assert!(output.segments[0].forward_segment_id.enabled);
        assert!(!output.segments[0].reverse_segment_id.enabled);
    }
}

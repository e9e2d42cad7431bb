//! Intersection views: the ordered set of roads leaving a node, relative to
//! one incoming edge.

use crate::extractor::compressor::CompressedEdgeContainer;
use crate::extractor::graph_builder::InternalNode;
use crate::extractor::node_based_graph::{EdgeData, NodeBasedGraph};
use crate::extractor::restriction_map::RestrictionMap;
use crate::geo::{bearing, turn_angle, Coordinate};
use crate::types::{NameId, NodeId, RoadClassification, TravelMode};

use super::turn_instruction::TurnInstruction;

/// Angle at which two roads are considered part of one group (forks etc).
pub const GROUP_ANGLE: f64 = 35.0;
/// Deviation from straight below which a turn reads as obvious.
pub const NARROW_TURN_ANGLE: f64 = 10.0;
/// Deviation from straight above which competitors stop mattering.
pub const DISTINCTION_ANGLE: f64 = 35.0;
pub const STRAIGHT_ANGLE: f64 = 180.0;

/// One road leaving the intersection, seen from the incoming edge.
#[derive(Debug, Clone)]
pub struct ConnectedRoad {
    /// Index of the road's slot in the via node's adjacency.
    pub slot_index: usize,
    /// Chain endpoint the road leads to.
    pub target: NodeId,
    /// Whether the turn onto this road is legal.
    pub entry_allowed: bool,
    /// Compass bearing leaving the via node, degrees from north.
    pub bearing: f64,
    /// Turn angle relative to the incoming direction: 0 u-turn, 180 straight.
    pub angle: f64,
    pub name_id: NameId,
    pub travel_mode: TravelMode,
    pub roundabout: bool,
    pub classification: RoadClassification,
    /// Physical length of the road edge, meters (to its chain endpoint).
    pub length: f64,
    pub instruction: TurnInstruction,
}

impl ConnectedRoad {
    pub fn is_uturn(&self, from_node: NodeId) -> bool {
        self.target == from_node && self.angle < GROUP_ANGLE / 2.0
    }

    pub fn deviation_from_straight(&self) -> f64 {
        (self.angle - STRAIGHT_ANGLE).abs()
    }
}

/// Roads at one node, ordered counter-clockwise starting at the u-turn.
#[derive(Debug, Clone)]
pub struct Intersection {
    pub via: NodeId,
    /// Node the traversal came from (chain endpoint).
    pub from_node: NodeId,
    /// Bearing of travel entering the via node.
    pub in_bearing: f64,
    pub roads: Vec<ConnectedRoad>,
}

impl Intersection {
    pub fn allowed_entry_count(&self) -> usize {
        self.roads.iter().filter(|r| r.entry_allowed).count()
    }

    /// Index of the road closest to going straight.
    pub fn straightmost_road(&self) -> Option<usize> {
        self.roads
            .iter()
            .enumerate()
            .filter(|(_, road)| !road.is_uturn(self.from_node))
            .min_by(|(_, a), (_, b)| {
                a.deviation_from_straight()
                    .partial_cmp(&b.deviation_from_straight())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }
}

/// Coordinate of the first geometry point along a slot, used for bearings.
fn first_coordinate_along(
    graph: &NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    via: NodeId,
    slot_index: usize,
) -> Coordinate {
    let slot = graph.slot(via, slot_index);
    let next = container
        .inner(slot.data.geometry_key)
        .first()
        .map(|&(node, _)| node)
        .unwrap_or(slot.target);
    nodes[next as usize].coordinate
}

/// Bearing of travel arriving at `via` through the edge from `from_node`,
/// taking compressed geometry into account.
pub fn approach_bearing(
    graph: &NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    from_node: NodeId,
    via: NodeId,
) -> f64 {
    // the mirror slot (via -> from) follows the approach geometry backwards
    let slot_index = graph
        .find_slot(via, from_node)
        .expect("incoming edge must exist");
    let before = first_coordinate_along(graph, nodes, container, via, slot_index);
    bearing(before, nodes[via as usize].coordinate)
}

/// Physical length of a slot's full geometry in meters.
pub fn slot_length(
    graph: &NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    via: NodeId,
    slot_index: usize,
) -> f64 {
    let slot = graph.slot(via, slot_index);
    let mut total = 0.0;
    let mut previous = nodes[via as usize].coordinate;
    for &(node, _) in container.inner(slot.data.geometry_key) {
        let next = nodes[node as usize].coordinate;
        total += crate::geo::haversine_distance(previous, next);
        previous = next;
    }
    total + crate::geo::haversine_distance(previous, nodes[slot.target as usize].coordinate)
}

/// Build the intersection view at `via` entered from `from_node`.
///
/// `entry_allowed` reflects oneway closure, turn restrictions and the
/// u-turn/barrier policy; the guidance handlers may not override it.
pub fn build_intersection(
    graph: &NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    restrictions: &RestrictionMap,
    from_node: NodeId,
    via: NodeId,
) -> Intersection {
    let in_bearing = approach_bearing(graph, nodes, container, from_node, via);
    let via_info = &nodes[via as usize];
    let degree = graph.degree(via);

    let mut roads = Vec::with_capacity(degree);
    for (slot_index, slot) in graph.slots(via).iter().enumerate() {
        let out_coordinate = first_coordinate_along(graph, nodes, container, via, slot_index);
        let out_bearing = bearing(via_info.coordinate, out_coordinate);
        let angle = turn_angle(in_bearing, out_bearing);

        let is_uturn = slot.target == from_node;
        let mut entry_allowed = slot.data.can_forward()
            && !restrictions.is_turn_forbidden(from_node, via, slot.target);
        if via_info.barrier && !is_uturn {
            entry_allowed = false;
        }
        if is_uturn {
            // turning around is reserved for dead ends and barriers
            entry_allowed = entry_allowed && (degree == 1 || via_info.barrier);
        }

        roads.push(ConnectedRoad {
            slot_index,
            target: slot.target,
            entry_allowed,
            bearing: out_bearing,
            angle,
            name_id: slot.data.name_id,
            travel_mode: slot.data.travel_mode,
            roundabout: slot.data.roundabout,
            classification: slot.data.classification,
            length: slot_length(graph, nodes, container, via, slot_index),
            instruction: TurnInstruction::INVALID,
        });
    }

    roads.sort_by(|a, b| a.angle.partial_cmp(&b.angle).unwrap_or(std::cmp::Ordering::Equal));

    Intersection {
        via,
        from_node,
        in_bearing,
        roads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::graph_builder::NodeBasedEdge;
    use crate::types::{RoadPriority, TravelMode};

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
            lane_description_id: u32::MAX,
            roundabout: false,
            startpoint: true,
            is_split: false,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
        }
    }

    /// Cross intersection: center 0, west 1, east 2, north 3, south 4.
    fn cross() -> (NodeBasedGraph, Vec<InternalNode>) {
        let nodes = vec![
            node(0.0, 0.0),
            node(-0.001, 0.0),
            node(0.001, 0.0),
            node(0.0, 0.001),
            node(0.0, -0.001),
        ];
        let graph = NodeBasedGraph::new(5, &[edge(0, 1), edge(0, 2), edge(0, 3), edge(0, 4)]);
        (graph, nodes)
    }

    #[test]
    fn test_cross_angles_from_west() {
        let (graph, nodes) = cross();
        let container = CompressedEdgeContainer::new();
        let restrictions = RestrictionMap::new(&[]);

        // entering the center from the west, travelling east
        let intersection =
            build_intersection(&graph, &nodes, &container, &restrictions, 1, 0);
        assert_eq!(intersection.roads.len(), 4);

        // roads sorted by angle: u-turn (0), right/south (90), straight/east
        // (180), left/north (270)
        let angles: Vec<f64> = intersection.roads.iter().map(|r| r.angle).collect();
        assert!(angles[0] < 5.0, "u-turn first, got {angles:?}");
        assert!((angles[1] - 90.0).abs() < 5.0);
        assert!((angles[2] - 180.0).abs() < 5.0);
        assert!((angles[3] - 270.0).abs() < 5.0);

        assert_eq!(intersection.roads[0].target, 1);
        assert_eq!(intersection.roads[1].target, 4);
        assert_eq!(intersection.roads[2].target, 2);
        assert_eq!(intersection.roads[3].target, 3);

        // u-turn not allowed at a through intersection
        assert!(!intersection.roads[0].entry_allowed);
        assert!(intersection.roads[1].entry_allowed);
        assert_eq!(intersection.straightmost_road(), Some(2));
    }

    #[test]
    fn test_dead_end_allows_uturn() {
        let nodes = vec![node(0.0, 0.0), node(0.001, 0.0)];
        let graph = NodeBasedGraph::new(2, &[edge(0, 1)]);
        let container = CompressedEdgeContainer::new();
        let restrictions = RestrictionMap::new(&[]);

        let intersection =
            build_intersection(&graph, &nodes, &container, &restrictions, 0, 1);
        assert_eq!(intersection.roads.len(), 1);
        assert!(intersection.roads[0].entry_allowed, "dead end permits turning around");
    }

    #[test]
    fn test_restriction_blocks_entry() {
        use crate::extractor::graph_builder::InternalRestriction;
        let (graph, nodes) = cross();
        let container = CompressedEdgeContainer::new();
        let restrictions = RestrictionMap::new(&[InternalRestriction {
            from: 1,
            via: 0,
            to: 3,
            only: false,
        }]);

        let intersection =
            build_intersection(&graph, &nodes, &container, &restrictions, 1, 0);
        let north = intersection.roads.iter().find(|r| r.target == 3).unwrap();
        let east = intersection.roads.iter().find(|r| r.target == 2).unwrap();
        assert!(!north.entry_allowed);
        assert!(east.entry_allowed);
    }
}

//! Roundabout classification and instruction assignment.
//!
//! Circular junctions come in three tiers: named rotaries (large), generic
//! roundabouts, and tiny roundabout-shaped intersections that read as plain
//! turns to a driver.

use crate::extractor::compressor::CompressedEdgeContainer;
use crate::extractor::graph_builder::InternalNode;
use crate::extractor::node_based_graph::NodeBasedGraph;
use crate::geo::haversine_distance;
use crate::types::{NodeId, EMPTY_NAME_ID};

use super::intersection::Intersection;
use super::turn_instruction::{direction_from_angle, TurnInstruction, TurnType};

/// Ring diameter above which a named ring becomes a rotary.
const ROTARY_DIAMETER: f64 = 35.0;
/// Below this diameter a sparse ring is treated as a plain intersection.
const INTERSECTION_DIAMETER: f64 = 15.0;
/// Bound on ring traversal; real roundabouts are far smaller.
const MAX_RING_NODES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundaboutTier {
    Roundabout,
    Rotary,
    RoundaboutIntersection,
}

/// Walk the ring starting at `via` and classify it by size and naming.
pub fn classify_roundabout(
    graph: &NodeBasedGraph,
    nodes: &[InternalNode],
    container: &CompressedEdgeContainer,
    via: NodeId,
) -> RoundaboutTier {
    let mut ring_nodes = vec![via];
    let mut named = false;
    let mut current = via;
    let mut previous = NodeId::MAX;

    for _ in 0..MAX_RING_NODES {
        let next_slot = graph.slots(current).iter().find(|slot| {
            slot.data.roundabout && slot.data.can_forward() && slot.target != previous
        });
        let Some(slot) = next_slot else {
            break;
        };
        if slot.data.name_id != EMPTY_NAME_ID {
            named = true;
        }
        // the ring may run through compressed chain nodes
        for &(inner, _) in container.inner(slot.data.geometry_key) {
            ring_nodes.push(inner);
        }
        previous = current;
        current = slot.target;
        if current == via {
            break;
        }
        ring_nodes.push(current);
    }

    let center = nodes[via as usize].coordinate;
    let diameter = ring_nodes
        .iter()
        .map(|&n| haversine_distance(center, nodes[n as usize].coordinate))
        .fold(0.0f64, f64::max);

    if diameter > ROTARY_DIAMETER && named {
        RoundaboutTier::Rotary
    } else if diameter < INTERSECTION_DIAMETER && ring_nodes.len() <= 4 {
        RoundaboutTier::RoundaboutIntersection
    } else {
        RoundaboutTier::Roundabout
    }
}

fn enter_type(tier: RoundaboutTier, at_exit: bool) -> TurnType {
    match (tier, at_exit) {
        (RoundaboutTier::Roundabout, false) => TurnType::EnterRoundabout,
        (RoundaboutTier::Roundabout, true) => TurnType::EnterRoundaboutAtExit,
        (RoundaboutTier::Rotary, false) => TurnType::EnterRotary,
        (RoundaboutTier::Rotary, true) => TurnType::EnterRotaryAtExit,
        (RoundaboutTier::RoundaboutIntersection, false) => TurnType::EnterRoundaboutIntersection,
        (RoundaboutTier::RoundaboutIntersection, true) => {
            TurnType::EnterRoundaboutIntersectionAtExit
        }
    }
}

fn enter_and_exit_type(tier: RoundaboutTier) -> TurnType {
    match tier {
        RoundaboutTier::Roundabout => TurnType::EnterAndExitRoundabout,
        RoundaboutTier::Rotary => TurnType::EnterAndExitRotary,
        RoundaboutTier::RoundaboutIntersection => TurnType::EnterAndExitRoundaboutIntersection,
    }
}

fn exit_type(tier: RoundaboutTier) -> TurnType {
    match tier {
        RoundaboutTier::Roundabout => TurnType::ExitRoundabout,
        RoundaboutTier::Rotary => TurnType::ExitRotary,
        RoundaboutTier::RoundaboutIntersection => TurnType::ExitRoundaboutIntersection,
    }
}

/// Assign roundabout instructions at a node touching the ring.
///
/// `in_roundabout` is whether the traversal arrives along the ring.
pub fn handle_roundabout(
    in_roundabout: bool,
    tier: RoundaboutTier,
    mut intersection: Intersection,
) -> Intersection {
    let has_exits = intersection
        .roads
        .iter()
        .any(|road| road.entry_allowed && !road.roundabout && road.target != intersection.from_node);

    for road in &mut intersection.roads {
        if !road.entry_allowed {
            continue;
        }
        let modifier = direction_from_angle(road.angle);
        road.instruction = if in_roundabout {
            if road.roundabout {
                TurnInstruction::new(TurnType::StayOnRoundabout, modifier)
            } else {
                TurnInstruction::new(exit_type(tier), modifier)
            }
        } else if road.roundabout {
            TurnInstruction::new(enter_type(tier, has_exits), modifier)
        } else {
            // crossing the ring node without travelling the circle
            TurnInstruction::new(enter_and_exit_type(tier), modifier)
        };
    }
    intersection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::graph_builder::NodeBasedEdge;
    use crate::extractor::restriction_map::RestrictionMap;
    use crate::geo::Coordinate;
    use crate::types::{RoadClassification, RoadPriority, TravelMode};

    fn node(lon: f64, lat: f64) -> InternalNode {
        InternalNode {
            coordinate: Coordinate::from_degrees(lon, lat),
            osm_id: 0,
            barrier: false,
            traffic_signal: false,
        }
    }

    fn edge(source: NodeId, target: NodeId, roundabout: bool, name_id: u32, oneway: bool) -> NodeBasedEdge {
        NodeBasedEdge {
            source,
            target,
            weight: 10,
            forward: true,
            backward: !oneway,
            name_id,
            travel_mode: TravelMode::Driving,
            lane_description_id: u32::MAX,
            roundabout,
            startpoint: true,
            is_split: false,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
        }
    }

    /// Square ring 0-1-2-3 (oneway, roundabout) with an approach 4-0 and an
    /// exit 2-5. `side` is the edge length in degrees.
    fn ring(side: f64, name_id: u32) -> (NodeBasedGraph, Vec<InternalNode>) {
        let nodes = vec![
            node(0.0, 0.0),
            node(side, 0.0),
            node(side, side),
            node(0.0, side),
            node(-side, 0.0),
            node(2.0 * side, side),
        ];
        let edges = [
            edge(0, 1, true, name_id, true),
            edge(1, 2, true, name_id, true),
            edge(2, 3, true, name_id, true),
            // stored orientation is source < target, ring direction 3 -> 0
            {
                let mut e = edge(0, 3, true, name_id, true);
                e.forward = false;
                e.backward = true;
                e
            },
            edge(0, 4, false, 0, false),
            edge(2, 5, false, 0, false),
        ];
        (NodeBasedGraph::new(6, &edges), nodes)
    }

    #[test]
    fn test_small_unnamed_ring_is_roundabout() {
        // ~22m sides
        let (graph, nodes) = ring(0.0002, EMPTY_NAME_ID);
        let container = CompressedEdgeContainer::new();
        let tier = classify_roundabout(&graph, &nodes, &container, 0);
        assert_eq!(tier, RoundaboutTier::Roundabout);
    }

    #[test]
    fn test_large_named_ring_is_rotary() {
        // ~55m sides, named ring
        let (graph, nodes) = ring(0.0005, 4);
        let container = CompressedEdgeContainer::new();
        let tier = classify_roundabout(&graph, &nodes, &container, 0);
        assert_eq!(tier, RoundaboutTier::Rotary);
    }

    #[test]
    fn test_enter_and_stay_and_exit_instructions() {
        let (graph, nodes) = ring(0.0002, EMPTY_NAME_ID);
        let container = CompressedEdgeContainer::new();
        let restrictions = RestrictionMap::new(&[]);

        // approaching the ring from node 4
        let entry = super::super::intersection::build_intersection(
            &graph, &nodes, &container, &restrictions, 4, 0,
        );
        let entry = handle_roundabout(false, RoundaboutTier::Roundabout, entry);
        let ring_road = entry.roads.iter().find(|r| r.roundabout && r.entry_allowed).unwrap();
        assert_eq!(ring_road.instruction.turn_type, TurnType::EnterRoundabout);

        // on the ring at node 2, where the exit to node 5 branches off
        let on_ring = super::super::intersection::build_intersection(
            &graph, &nodes, &container, &restrictions, 1, 2,
        );
        let on_ring = handle_roundabout(true, RoundaboutTier::Roundabout, on_ring);
        let stay = on_ring.roads.iter().find(|r| r.roundabout && r.entry_allowed).unwrap();
        let exit = on_ring.roads.iter().find(|r| !r.roundabout && r.entry_allowed).unwrap();
        assert_eq!(stay.instruction.turn_type, TurnType::StayOnRoundabout);
        assert_eq!(exit.instruction.turn_type, TurnType::ExitRoundabout);
    }
}

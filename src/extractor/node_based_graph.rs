//! Dynamic node-based graph used between graph construction and edge
//! expansion.
//!
//! Every undirected edge is stored as two mirrored slots, one per incident
//! node. A slot carries the weights of both directions relative to the slot
//! orientation; `INVALID_EDGE_WEIGHT` closes a direction. Slots are removed
//! and rewritten in place by the compressor.

use crate::extractor::graph_builder::NodeBasedEdge;
use crate::types::{
    EdgeWeight, LaneDescriptionId, NameId, NodeId, RoadClassification, TravelMode,
    INVALID_EDGE_WEIGHT, INVALID_NODE_ID,
};

/// Data of one adjacency slot. Weights are oriented along the slot, i.e.
/// `forward_weight` is the cost of travelling from the owning node to
/// `Slot::target`.
#[derive(Debug, Clone, Copy)]
pub struct EdgeData {
    pub forward_weight: EdgeWeight,
    pub backward_weight: EdgeWeight,
    pub name_id: NameId,
    pub travel_mode: TravelMode,
    pub lane_description_id: LaneDescriptionId,
    pub roundabout: bool,
    pub startpoint: bool,
    pub is_split: bool,
    pub classification: RoadClassification,
    /// Packed geometry bucket for the slot direction.
    pub geometry_key: u32,
    /// Edge-based node id of the slot direction, assigned by the expander.
    pub edge_based_node_id: NodeId,
}

impl EdgeData {
    pub fn can_forward(&self) -> bool {
        self.forward_weight != INVALID_EDGE_WEIGHT
    }

    pub fn can_backward(&self) -> bool {
        self.backward_weight != INVALID_EDGE_WEIGHT
    }

    /// True when the payload two slots must agree on for chain compression is
    /// identical.
    pub fn is_compatible_with(&self, other: &EdgeData) -> bool {
        self.name_id == other.name_id
            && self.travel_mode == other.travel_mode
            && self.lane_description_id == other.lane_description_id
            && self.roundabout == other.roundabout
            && self.startpoint == other.startpoint
            && self.classification == other.classification
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub target: NodeId,
    pub data: EdgeData,
}

/// Adjacency-list graph over internal node ids with slot deletion.
#[derive(Debug)]
pub struct NodeBasedGraph {
    adjacency: Vec<Vec<Slot>>,
}

impl NodeBasedGraph {
    /// Build from deduplicated edge rows. Split pairs (two rows per node
    /// pair) are merged into one undirected edge with per-direction weights.
    pub fn new(node_count: usize, edges: &[NodeBasedEdge]) -> Self {
        let mut adjacency: Vec<Vec<Slot>> = vec![Vec::new(); node_count];
        let mut geometry_key = 0u32;

        let mut i = 0;
        while i < edges.len() {
            let first = &edges[i];
            // a split pair shares (source, target) and is adjacent after the
            // builder's sort
            let mut forward_weight = if first.forward {
                first.weight
            } else {
                INVALID_EDGE_WEIGHT
            };
            let mut backward_weight = if first.backward {
                first.weight
            } else {
                INVALID_EDGE_WEIGHT
            };
            let mut span = 1;
            if first.is_split
                && i + 1 < edges.len()
                && edges[i + 1].source == first.source
                && edges[i + 1].target == first.target
            {
                let second = &edges[i + 1];
                if second.forward {
                    forward_weight = second.weight;
                }
                if second.backward {
                    backward_weight = second.weight;
                }
                span = 2;
            }

            let template = EdgeData {
                forward_weight,
                backward_weight,
                name_id: first.name_id,
                travel_mode: first.travel_mode,
                lane_description_id: first.lane_description_id,
                roundabout: first.roundabout,
                startpoint: first.startpoint,
                is_split: first.is_split,
                classification: first.classification,
                geometry_key: 0,
                edge_based_node_id: INVALID_NODE_ID,
            };

            adjacency[first.source as usize].push(Slot {
                target: first.target,
                data: EdgeData {
                    geometry_key,
                    ..template
                },
            });
            adjacency[first.target as usize].push(Slot {
                target: first.source,
                data: EdgeData {
                    forward_weight: backward_weight,
                    backward_weight: forward_weight,
                    geometry_key: geometry_key + 1,
                    ..template
                },
            });
            geometry_key += 2;
            i += span;
        }

        Self { adjacency }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Undirected degree: number of incident edges.
    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node as usize].len()
    }

    pub fn slots(&self, node: NodeId) -> &[Slot] {
        &self.adjacency[node as usize]
    }

    pub fn slot(&self, node: NodeId, index: usize) -> &Slot {
        &self.adjacency[node as usize][index]
    }

    pub fn slot_mut(&mut self, node: NodeId, index: usize) -> &mut Slot {
        &mut self.adjacency[node as usize][index]
    }

    pub fn find_slot(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.adjacency[from as usize]
            .iter()
            .position(|slot| slot.target == to)
    }

    pub fn remove_all_slots(&mut self, node: NodeId) {
        self.adjacency[node as usize].clear();
    }

    /// Total number of directed, traversable edges.
    pub fn directed_edge_count(&self) -> usize {
        self.adjacency
            .iter()
            .flat_map(|slots| slots.iter())
            .filter(|slot| slot.data.can_forward())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoadPriority;

    fn edge(source: NodeId, target: NodeId, weight: EdgeWeight, forward: bool, backward: bool, is_split: bool) -> NodeBasedEdge {
        NodeBasedEdge {
            source,
            target,
            weight,
            forward,
            backward,
            name_id: 0,
            travel_mode: TravelMode::Driving,
            lane_description_id: u32::MAX,
            roundabout: false,
            startpoint: true,
            is_split,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_bidirectional_edge_mirrors() {
        let graph = NodeBasedGraph::new(2, &[edge(0, 1, 10, true, true, false)]);
        assert_eq!(graph.degree(0), 1);
        assert_eq!(graph.degree(1), 1);

        let forward = graph.slot(0, 0);
        assert_eq!(forward.target, 1);
        assert_eq!(forward.data.forward_weight, 10);
        assert_eq!(forward.data.backward_weight, 10);

        let mirror = graph.slot(1, 0);
        assert_eq!(mirror.target, 0);
        assert_ne!(forward.data.geometry_key, mirror.data.geometry_key);
        assert_eq!(graph.directed_edge_count(), 2);
    }

    #[test]
    fn test_oneway_closes_reverse() {
        let graph = NodeBasedGraph::new(2, &[edge(0, 1, 10, true, false, false)]);
        assert!(graph.slot(0, 0).data.can_forward());
        assert!(!graph.slot(0, 0).data.can_backward());
        assert!(!graph.slot(1, 0).data.can_forward());
        assert!(graph.slot(1, 0).data.can_backward());
        assert_eq!(graph.directed_edge_count(), 1);
    }

    #[test]
    fn test_split_pair_merges_into_one_slot_pair() {
        let rows = [
            edge(0, 1, 10, true, false, true),
            edge(0, 1, 14, false, true, true),
        ];
        let graph = NodeBasedGraph::new(2, &rows);
        assert_eq!(graph.degree(0), 1);
        assert_eq!(graph.degree(1), 1);
        let forward = graph.slot(0, 0);
        assert_eq!(forward.data.forward_weight, 10);
        assert_eq!(forward.data.backward_weight, 14);
        let mirror = graph.slot(1, 0);
        assert_eq!(mirror.data.forward_weight, 14);
        assert_eq!(mirror.data.backward_weight, 10);
    }
}

//! The graph the search runs on: edge-based nodes with directed, possibly
//! contracted edges in CSR form.
//!
//! An external contractor may supply shortcuts and a core flag per node;
//! without one, the flat edge-based graph is loaded with every node in the
//! core, which degenerates the search to plain bidirectional Dijkstra with
//! identical results.

use crate::extractor::edge_expander::EdgeBasedEdge;
use crate::types::{EdgeId, EdgeWeight, NodeId};

/// Data of one directed (possibly contracted) search edge.
#[derive(Debug, Clone, Copy)]
pub struct QueryEdgeData {
    pub weight: EdgeWeight,
    /// Traversable when searching forward.
    pub forward: bool,
    /// Traversable when searching backward.
    pub backward: bool,
    pub shortcut: bool,
    /// Original turn edge id for plain edges, middle node id for shortcuts.
    pub id: u32,
}

#[derive(Debug, Default)]
pub struct QueryGraph {
    offsets: Vec<u32>,
    targets: Vec<NodeId>,
    data: Vec<QueryEdgeData>,
    core: Vec<bool>,
}

impl QueryGraph {
    /// Assemble from an arbitrary directed edge list.
    pub fn from_edges(
        node_count: u32,
        mut edges: Vec<(NodeId, NodeId, QueryEdgeData)>,
        core: Vec<bool>,
    ) -> Self {
        debug_assert_eq!(core.len(), node_count as usize);
        edges.sort_by_key(|&(source, target, _)| (source, target));

        let mut offsets = Vec::with_capacity(node_count as usize + 1);
        let mut targets = Vec::with_capacity(edges.len());
        let mut data = Vec::with_capacity(edges.len());
        let mut current = 0usize;
        for node in 0..node_count {
            offsets.push(targets.len() as u32);
            while current < edges.len() && edges[current].0 == node {
                targets.push(edges[current].1);
                data.push(edges[current].2);
                current += 1;
            }
        }
        offsets.push(targets.len() as u32);

        Self {
            offsets,
            targets,
            data,
            core,
        }
    }

    /// Build the uncontracted graph straight from the turn edges. Every
    /// directed turn is stored twice so the backward search can traverse it.
    pub fn from_edge_based_graph(node_count: u32, turn_edges: &[EdgeBasedEdge]) -> Self {
        let mut edges = Vec::with_capacity(turn_edges.len() * 2);
        for (edge_id, turn) in turn_edges.iter().enumerate() {
            edges.push((
                turn.source,
                turn.target,
                QueryEdgeData {
                    weight: turn.weight,
                    forward: true,
                    backward: false,
                    shortcut: false,
                    id: edge_id as u32,
                },
            ));
            edges.push((
                turn.target,
                turn.source,
                QueryEdgeData {
                    weight: turn.weight,
                    forward: false,
                    backward: true,
                    shortcut: false,
                    id: edge_id as u32,
                },
            ));
        }
        Self::from_edges(node_count, edges, vec![true; node_count as usize])
    }

    pub fn node_count(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    pub fn out_edges(&self, node: NodeId) -> std::ops::Range<usize> {
        self.offsets[node as usize] as usize..self.offsets[node as usize + 1] as usize
    }

    pub fn target(&self, edge: usize) -> NodeId {
        self.targets[edge]
    }

    pub fn data(&self, edge: usize) -> &QueryEdgeData {
        &self.data[edge]
    }

    pub fn is_core(&self, node: NodeId) -> bool {
        self.core[node as usize]
    }

    pub fn has_core(&self) -> bool {
        self.core.iter().any(|&c| !c)
    }

    /// Cheapest edge allowing travel `from -> to`, looking at both storages.
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<(usize, QueryEdgeData)> {
        let mut best: Option<(usize, QueryEdgeData)> = None;
        for edge in self.out_edges(from) {
            let data = self.data[edge];
            if self.targets[edge] == to
                && data.forward
                && best.map_or(true, |(_, b)| data.weight < b.weight)
            {
                best = Some((edge, data));
            }
        }
        for edge in self.out_edges(to) {
            let data = self.data[edge];
            if self.targets[edge] == from
                && data.backward
                && best.map_or(true, |(_, b)| data.weight < b.weight)
            {
                best = Some((edge, data));
            }
        }
        best
    }

    /// Weight of the cheapest forward self-loop at `node`, used by the
    /// same-edge fix-up.
    pub fn loop_weight(&self, node: NodeId) -> Option<EdgeWeight> {
        let mut best: Option<EdgeWeight> = None;
        for edge in self.out_edges(node) {
            let data = self.data[edge];
            if self.targets[edge] == node && data.forward {
                best = Some(best.map_or(data.weight, |b: EdgeWeight| b.min(data.weight)));
            }
        }
        best
    }

    pub fn edge_id(&self, edge: usize) -> EdgeId {
        edge as EdgeId
    }
}

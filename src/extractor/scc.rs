//! Connected-component analysis over the edge-based graph.
//!
//! Small components are marked so snapping can avoid trapping queries in
//! disconnected islands. The two directions of one segment always share a
//! component.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;

use crate::types::{ComponentId, NodeId, INVALID_NODE_ID};

/// Default threshold below which a component counts as tiny.
pub const DEFAULT_SMALL_COMPONENT_SIZE: usize = 1000;

#[derive(Debug)]
pub struct ComponentAssignment {
    /// Dense component id per edge-based node.
    pub component_ids: Vec<ComponentId>,
    /// Size (in edge-based nodes) per component id.
    pub component_sizes: Vec<usize>,
    pub small_component_size: usize,
}

impl ComponentAssignment {
    pub fn is_tiny(&self, node: NodeId) -> bool {
        let component = self.component_ids[node as usize];
        self.component_sizes[component as usize] < self.small_component_size
    }
}

/// Run Tarjan's algorithm over the turn edges, then merge the strongly
/// connected components of paired directions so both sides of a segment end
/// up in one component.
pub fn assign_components(
    node_count: u32,
    turn_edges: impl Iterator<Item = (NodeId, NodeId)>,
    direction_pairs: impl Iterator<Item = (NodeId, NodeId)>,
    small_component_size: usize,
) -> ComponentAssignment {
    let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(node_count as usize, 0);
    for _ in 0..node_count {
        graph.add_node(());
    }
    for (source, target) in turn_edges {
        graph.add_edge(NodeIndex::new(source as usize), NodeIndex::new(target as usize), ());
    }

    let sccs = petgraph::algo::tarjan_scc(&graph);
    let mut scc_of_node = vec![usize::MAX; node_count as usize];
    for (scc_index, scc) in sccs.iter().enumerate() {
        for &node in scc {
            scc_of_node[node.index()] = scc_index;
        }
    }

    // merge the components of forward/reverse direction pairs
    let mut union: UnionFind<usize> = UnionFind::new(sccs.len());
    for (forward, reverse) in direction_pairs {
        if forward != INVALID_NODE_ID && reverse != INVALID_NODE_ID {
            union.union(scc_of_node[forward as usize], scc_of_node[reverse as usize]);
        }
    }

    // densify the merged roots
    let mut root_to_id: rustc_hash::FxHashMap<usize, ComponentId> = rustc_hash::FxHashMap::default();
    let mut component_ids = vec![0 as ComponentId; node_count as usize];
    let mut component_sizes = Vec::new();
    for node in 0..node_count as usize {
        let root = union.find(scc_of_node[node]);
        let id = *root_to_id.entry(root).or_insert_with(|| {
            component_sizes.push(0);
            (component_sizes.len() - 1) as ComponentId
        });
        component_ids[node] = id;
        component_sizes[id as usize] += 1;
    }

    ComponentAssignment {
        component_ids,
        component_sizes,
        small_component_size,
    }
}

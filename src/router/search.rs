//! Bidirectional search over the contracted edge-based graph.
//!
//! Forward and reverse Dijkstra with stall-on-demand, alternating on the
//! smaller heap top. Phantom endpoints seed the forward heap at negated
//! split weights so that a settlement key equals the accumulated path
//! weight. With a contracted core, non-core nodes are only explored outward
//! from the endpoints; the search transitions to the core heaps once it
//! reaches core nodes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::phantom::PhantomNode;
use super::query_graph::QueryGraph;
use crate::types::{EdgeId, EdgeWeight, NodeId, INVALID_EDGE_WEIGHT, INVALID_NODE_ID};

/// Version-stamped label store, reset in O(1) between queries.
pub struct SearchSpace {
    weight: Vec<EdgeWeight>,
    parent: Vec<NodeId>,
    version: Vec<u32>,
    current: u32,
}

impl SearchSpace {
    pub fn new(node_count: usize) -> Self {
        Self {
            weight: vec![INVALID_EDGE_WEIGHT; node_count],
            parent: vec![INVALID_NODE_ID; node_count],
            version: vec![0; node_count],
            current: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.version.fill(0);
            self.current = 1;
        }
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> Option<EdgeWeight> {
        let index = node as usize;
        (self.version[index] == self.current).then(|| self.weight[index])
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> NodeId {
        self.parent[node as usize]
    }

    #[inline]
    pub fn label(&mut self, node: NodeId, weight: EdgeWeight, parent: NodeId) {
        let index = node as usize;
        self.weight[index] = weight;
        self.parent[index] = parent;
        self.version[index] = self.current;
    }
}

/// Per-thread scratch for one bidirectional query.
pub struct SearchContext {
    forward: SearchSpace,
    reverse: SearchSpace,
}

impl SearchContext {
    pub fn new(node_count: usize) -> Self {
        Self {
            forward: SearchSpace::new(node_count),
            reverse: SearchSpace::new(node_count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingResult {
    /// Total path weight including phantom split corrections.
    pub weight: EdgeWeight,
    /// Edge-based nodes traversed, in travel order.
    pub node_path: Vec<NodeId>,
    /// Original turn edge ids between consecutive path nodes, shortcut-free.
    pub edge_path: Vec<EdgeId>,
}

type Heap = BinaryHeap<Reverse<(EdgeWeight, NodeId)>>;

const FORWARD: bool = true;
const REVERSE: bool = false;

#[inline]
fn edge_open(data: &super::query_graph::QueryEdgeData, forward_search: bool) -> bool {
    if forward_search {
        data.forward
    } else {
        data.backward
    }
}

fn seed(space: &mut SearchSpace, heap: &mut Heap, node: NodeId, weight: EdgeWeight) {
    match space.get(node) {
        Some(existing) if existing <= weight => {}
        _ => {
            space.label(node, weight, INVALID_NODE_ID);
            heap.push(Reverse((weight, node)));
        }
    }
}

/// Stall-on-demand: a popped label is premature if some neighbor reaches
/// this node cheaper through an opposite-direction edge.
fn is_stalled(
    graph: &QueryGraph,
    space: &SearchSpace,
    node: NodeId,
    weight: EdgeWeight,
    forward_search: bool,
) -> bool {
    for edge in graph.out_edges(node) {
        let data = graph.data(edge);
        if !edge_open(data, !forward_search) {
            continue;
        }
        if let Some(neighbor_weight) = space.get(graph.target(edge)) {
            if neighbor_weight.saturating_add(data.weight) < weight {
                return true;
            }
        }
    }
    false
}

struct MeetingPoint {
    weight: EdgeWeight,
    node: NodeId,
    via_loop: bool,
}

#[allow(clippy::too_many_arguments)]
fn settle(
    graph: &QueryGraph,
    own: &mut SearchSpace,
    other: &SearchSpace,
    heap: &mut Heap,
    core_heap: &mut Heap,
    best: &mut MeetingPoint,
    forward_search: bool,
    core_phase: bool,
) {
    let Some(Reverse((weight, node))) = heap.pop() else {
        return;
    };
    if own.get(node).map_or(true, |label| weight > label) {
        return; // stale
    }

    // meeting bookkeeping with the same-edge loop fix-up
    if let Some(other_weight) = other.get(node) {
        let mut total = weight.saturating_add(other_weight);
        let mut via_loop = false;
        if total < 0 {
            match graph.loop_weight(node) {
                Some(loop_weight) => {
                    total += loop_weight;
                    via_loop = true;
                }
                None => total = INVALID_EDGE_WEIGHT,
            }
        }
        if total < best.weight || (total == best.weight && node < best.node) {
            best.weight = total;
            best.node = node;
            best.via_loop = via_loop;
        }
    }

    if !core_phase && graph.is_core(node) {
        // hand the label over to the core search
        core_heap.push(Reverse((weight, node)));
        return;
    }

    if is_stalled(graph, own, node, weight, forward_search) {
        return;
    }

    for edge in graph.out_edges(node) {
        let data = graph.data(edge);
        if !edge_open(data, forward_search) {
            continue;
        }
        let target = graph.target(edge);
        if core_phase && !graph.is_core(target) {
            continue;
        }
        let new_weight = weight.saturating_add(data.weight);
        if own.get(target).map_or(true, |label| new_weight < label) {
            own.label(target, new_weight, node);
            heap.push(Reverse((new_weight, target)));
        }
    }
}

fn run_phase(
    graph: &QueryGraph,
    context: &mut SearchContext,
    forward_heap: &mut Heap,
    reverse_heap: &mut Heap,
    forward_core: &mut Heap,
    reverse_core: &mut Heap,
    best: &mut MeetingPoint,
    core_phase: bool,
    cancel: Option<&AtomicBool>,
) -> bool {
    loop {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return false;
            }
        }
        let forward_top = forward_heap.peek().map(|Reverse((w, _))| *w);
        let reverse_top = reverse_heap.peek().map(|Reverse((w, _))| *w);
        match (forward_top, reverse_top) {
            (None, None) => return true,
            (Some(f), Some(r)) => {
                if best.weight != INVALID_EDGE_WEIGHT && f.min(r) > best.weight {
                    return true;
                }
                if f <= r {
                    settle(
                        graph,
                        &mut context.forward,
                        &context.reverse,
                        forward_heap,
                        forward_core,
                        best,
                        FORWARD,
                        core_phase,
                    );
                } else {
                    settle(
                        graph,
                        &mut context.reverse,
                        &context.forward,
                        reverse_heap,
                        reverse_core,
                        best,
                        REVERSE,
                        core_phase,
                    );
                }
            }
            (Some(f), None) => {
                if best.weight != INVALID_EDGE_WEIGHT && f > best.weight {
                    return true;
                }
                settle(
                    graph,
                    &mut context.forward,
                    &context.reverse,
                    forward_heap,
                    forward_core,
                    best,
                    FORWARD,
                    core_phase,
                );
            }
            (None, Some(r)) => {
                if best.weight != INVALID_EDGE_WEIGHT && r > best.weight {
                    return true;
                }
                settle(
                    graph,
                    &mut context.reverse,
                    &context.forward,
                    reverse_heap,
                    reverse_core,
                    best,
                    REVERSE,
                    core_phase,
                );
            }
        }
    }
}

/// One-to-one shortest path between two phantom endpoints.
///
/// Returns `None` when the endpoints are disconnected or the query was
/// cancelled; no partial results are produced.
pub fn shortest_path(
    graph: &QueryGraph,
    context: &mut SearchContext,
    source: &PhantomNode,
    target: &PhantomNode,
    cancel: Option<&AtomicBool>,
) -> Option<RoutingResult> {
    context.forward.reset();
    context.reverse.reset();

    let mut forward_heap = Heap::new();
    let mut reverse_heap = Heap::new();
    let mut forward_core = Heap::new();
    let mut reverse_core = Heap::new();

    if source.forward_segment_id.enabled {
        seed(
            &mut context.forward,
            &mut forward_heap,
            source.forward_segment_id.id,
            -source.forward_weight_plus_offset(),
        );
    }
    if source.reverse_segment_id.enabled {
        seed(
            &mut context.forward,
            &mut forward_heap,
            source.reverse_segment_id.id,
            -source.reverse_weight_plus_offset(),
        );
    }
    if target.forward_segment_id.enabled {
        seed(
            &mut context.reverse,
            &mut reverse_heap,
            target.forward_segment_id.id,
            target.forward_weight_plus_offset(),
        );
    }
    if target.reverse_segment_id.enabled {
        seed(
            &mut context.reverse,
            &mut reverse_heap,
            target.reverse_segment_id.id,
            target.reverse_weight_plus_offset(),
        );
    }

    let mut best = MeetingPoint {
        weight: INVALID_EDGE_WEIGHT,
        node: INVALID_NODE_ID,
        via_loop: false,
    };

    if !run_phase(
        graph,
        context,
        &mut forward_heap,
        &mut reverse_heap,
        &mut forward_core,
        &mut reverse_core,
        &mut best,
        false,
        cancel,
    ) {
        return None;
    }
    if !forward_core.is_empty() || !reverse_core.is_empty() {
        let mut empty_forward = Heap::new();
        let mut empty_reverse = Heap::new();
        if !run_phase(
            graph,
            context,
            &mut forward_core,
            &mut reverse_core,
            &mut empty_forward,
            &mut empty_reverse,
            &mut best,
            true,
            cancel,
        ) {
            return None;
        }
    }

    if best.weight == INVALID_EDGE_WEIGHT {
        return None;
    }

    // packed node chain: source-side spine plus reversed target-side spine
    let mut node_path = Vec::new();
    let mut cursor = best.node;
    while cursor != INVALID_NODE_ID {
        node_path.push(cursor);
        cursor = context.forward.parent(cursor);
    }
    node_path.reverse();
    if best.via_loop {
        node_path.push(best.node);
    }
    cursor = context.reverse.parent(best.node);
    while cursor != INVALID_NODE_ID {
        node_path.push(cursor);
        cursor = context.reverse.parent(cursor);
    }

    let edge_path = unpack_node_path(graph, &node_path);

    Some(RoutingResult {
        weight: best.weight,
        node_path,
        edge_path,
    })
}

/// Expand the packed node chain into original turn edge ids, recursively
/// resolving shortcuts through their middle nodes.
pub fn unpack_node_path(graph: &QueryGraph, node_path: &[NodeId]) -> Vec<EdgeId> {
    let mut edges = Vec::new();
    for window in node_path.windows(2) {
        unpack_pair(graph, window[0], window[1], &mut edges);
    }
    edges
}

fn unpack_pair(graph: &QueryGraph, from: NodeId, to: NodeId, out: &mut Vec<EdgeId>) {
    let Some((_, data)) = graph.find_edge(from, to) else {
        debug_assert!(false, "packed path contains a missing edge {from} -> {to}");
        return;
    };
    if data.shortcut {
        unpack_pair(graph, from, data.id, out);
        unpack_pair(graph, data.id, to, out);
    } else {
        out.push(data.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::edge_expander::EdgeBasedEdge;
    use crate::geo::Coordinate;
    use crate::router::query_graph::QueryEdgeData;
    use crate::types::{SegmentId, TravelMode};

    fn turn(source: NodeId, target: NodeId, weight: EdgeWeight) -> EdgeBasedEdge {
        EdgeBasedEdge {
            source,
            target,
            weight,
        }
    }

    /// A phantom fully at the start of `node` (forward) with the given
    /// target-side split weight on the same node when used as target.
    fn phantom_on(node: NodeId, weight_plus_offset: EdgeWeight) -> PhantomNode {
        PhantomNode {
            forward_segment_id: SegmentId {
                id: node,
                enabled: true,
            },
            reverse_segment_id: SegmentId::INVALID,
            name_id: 0,
            forward_weight: weight_plus_offset,
            reverse_weight: 0,
            forward_offset: 0,
            reverse_offset: 0,
            forward_packed_geometry_id: 0,
            reverse_packed_geometry_id: 0,
            component_id: 0,
            is_tiny_component: false,
            location: Coordinate::from_degrees(0.0, 0.0),
            input_location: Coordinate::from_degrees(0.0, 0.0),
            fwd_segment_position: 0,
            forward_travel_mode: TravelMode::Driving,
            backward_travel_mode: TravelMode::Inaccessible,
        }
    }

    #[test]
    fn test_chain_route() {
        // edge weights: node 0 costs 10, node 1 costs 20; target edge 2
        // contributes its split weight 30
        let graph =
            QueryGraph::from_edge_based_graph(3, &[turn(0, 1, 10), turn(1, 2, 20)]);
        let mut context = SearchContext::new(3);
        let result = shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 0),
            &phantom_on(2, 30),
            None,
        )
        .unwrap();
        assert_eq!(result.weight, 60);
        assert_eq!(result.node_path, vec![0, 1, 2]);
        assert_eq!(result.edge_path, vec![0, 1]);
    }

    #[test]
    fn test_shorter_alternative_wins() {
        // 0 -> 1 -> 3 costs 10 + 5; 0 -> 2 -> 3 costs 2 + 2
        let graph = QueryGraph::from_edge_based_graph(
            4,
            &[
                turn(0, 1, 10),
                turn(1, 3, 5),
                turn(0, 2, 2),
                turn(2, 3, 2),
            ],
        );
        let mut context = SearchContext::new(4);
        let result = shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 0),
            &phantom_on(3, 0),
            None,
        )
        .unwrap();
        assert_eq!(result.weight, 4);
        assert_eq!(result.node_path, vec![0, 2, 3]);
    }

    #[test]
    fn test_disconnected_returns_none() {
        let graph = QueryGraph::from_edge_based_graph(4, &[turn(0, 1, 10), turn(2, 3, 10)]);
        let mut context = SearchContext::new(4);
        assert!(shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 0),
            &phantom_on(3, 0),
            None
        )
        .is_none());
    }

    #[test]
    fn test_same_edge_forward_split() {
        // both phantoms on node 0; the target sits further along the edge
        let graph = QueryGraph::from_edge_based_graph(2, &[turn(0, 1, 10)]);
        let mut context = SearchContext::new(2);
        let result = shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 2),
            &phantom_on(0, 7),
            None,
        )
        .unwrap();
        assert_eq!(result.weight, 5);
        assert_eq!(result.node_path, vec![0]);
        assert!(result.edge_path.is_empty());
    }

    #[test]
    fn test_same_edge_backward_needs_loop() {
        // target is behind the source on the same edge; without a loop there
        // is no path
        let no_loop = QueryGraph::from_edge_based_graph(2, &[turn(0, 1, 10)]);
        let mut context = SearchContext::new(2);
        assert!(shortest_path(
            &no_loop,
            &mut context,
            &phantom_on(0, 7),
            &phantom_on(0, 2),
            None
        )
        .is_none());

        // with a self-loop the corrected weight applies
        let with_loop =
            QueryGraph::from_edge_based_graph(2, &[turn(0, 1, 10), turn(0, 0, 100)]);
        let mut context = SearchContext::new(2);
        let result = shortest_path(
            &with_loop,
            &mut context,
            &phantom_on(0, 7),
            &phantom_on(0, 2),
            None,
        )
        .unwrap();
        assert_eq!(result.weight, 95);
        assert_eq!(result.node_path, vec![0, 0]);
        assert_eq!(result.edge_path.len(), 1);
    }

    #[test]
    fn test_shortcut_unpacking() {
        // 0 -> 1 -> 2 plus a shortcut 0 -> 2 with middle node 1
        let edges = vec![
            (
                0,
                1,
                QueryEdgeData {
                    weight: 10,
                    forward: true,
                    backward: false,
                    shortcut: false,
                    id: 100,
                },
            ),
            (
                1,
                2,
                QueryEdgeData {
                    weight: 20,
                    forward: true,
                    backward: false,
                    shortcut: false,
                    id: 101,
                },
            ),
            (
                0,
                2,
                QueryEdgeData {
                    weight: 30,
                    forward: true,
                    backward: false,
                    shortcut: true,
                    id: 1,
                },
            ),
        ];
        let graph = QueryGraph::from_edges(3, edges, vec![true; 3]);
        let unpacked = unpack_node_path(&graph, &[0, 2]);
        // the shortcut expands to the two original turn edges (P7)
        assert_eq!(unpacked, vec![100, 101]);
    }

    #[test]
    fn test_core_transition() {
        // 0 and 2 are contracted endpoints, 1 is the core
        let mut edges = Vec::new();
        for (s, t, w, id) in [(0u32, 1u32, 10, 0u32), (1, 2, 20, 1)] {
            edges.push((
                s,
                t,
                QueryEdgeData {
                    weight: w,
                    forward: true,
                    backward: false,
                    shortcut: false,
                    id,
                },
            ));
            edges.push((
                t,
                s,
                QueryEdgeData {
                    weight: w,
                    forward: false,
                    backward: true,
                    shortcut: false,
                    id,
                },
            ));
        }
        let graph = QueryGraph::from_edges(3, edges, vec![false, true, false]);
        assert!(graph.has_core());
        let mut context = SearchContext::new(3);
        let result = shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 0),
            &phantom_on(2, 5),
            None,
        )
        .unwrap();
        assert_eq!(result.weight, 35);
        assert_eq!(result.node_path, vec![0, 1, 2]);
    }

    #[test]
    fn test_cancellation_aborts() {
        let graph = QueryGraph::from_edge_based_graph(3, &[turn(0, 1, 10), turn(1, 2, 20)]);
        let mut context = SearchContext::new(3);
        let cancel = AtomicBool::new(true);
        assert!(shortest_path(
            &graph,
            &mut context,
            &phantom_on(0, 0),
            &phantom_on(2, 0),
            Some(&cancel)
        )
        .is_none());
    }
}

//! Bucket-based many-to-many table computation.
//!
//! One reverse search per target fills buckets keyed by settled node; one
//! forward search per source then joins against the buckets. Both phases use
//! stall-on-demand; forward rows run in parallel over a shared read-only
//! bucket map.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::phantom::PhantomNode;
use super::query_graph::QueryGraph;
use super::search::SearchSpace;
use crate::types::{EdgeWeight, NodeId, INVALID_EDGE_WEIGHT, INVALID_NODE_ID};

type Heap = BinaryHeap<Reverse<(EdgeWeight, NodeId)>>;

/// Buckets: for every node settled by some reverse search, the target
/// indices that reached it and their distances. Cleared between queries.
#[derive(Debug, Default)]
pub struct SearchBuckets {
    buckets: FxHashMap<NodeId, Vec<(u32, EdgeWeight)>>,
}

impl SearchBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn push(&mut self, node: NodeId, target_index: u32, weight: EdgeWeight) {
        self.buckets.entry(node).or_default().push((target_index, weight));
    }

    #[inline]
    fn get(&self, node: NodeId) -> &[(u32, EdgeWeight)] {
        self.buckets.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn total_entries(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

fn seed_forward(space: &mut SearchSpace, heap: &mut Heap, phantom: &PhantomNode) {
    if phantom.forward_segment_id.enabled {
        push_seed(
            space,
            heap,
            phantom.forward_segment_id.id,
            -phantom.forward_weight_plus_offset(),
        );
    }
    if phantom.reverse_segment_id.enabled {
        push_seed(
            space,
            heap,
            phantom.reverse_segment_id.id,
            -phantom.reverse_weight_plus_offset(),
        );
    }
}

fn seed_reverse(space: &mut SearchSpace, heap: &mut Heap, phantom: &PhantomNode) {
    if phantom.forward_segment_id.enabled {
        push_seed(
            space,
            heap,
            phantom.forward_segment_id.id,
            phantom.forward_weight_plus_offset(),
        );
    }
    if phantom.reverse_segment_id.enabled {
        push_seed(
            space,
            heap,
            phantom.reverse_segment_id.id,
            phantom.reverse_weight_plus_offset(),
        );
    }
}

fn push_seed(space: &mut SearchSpace, heap: &mut Heap, node: NodeId, weight: EdgeWeight) {
    match space.get(node) {
        Some(existing) if existing <= weight => {}
        _ => {
            space.label(node, weight, INVALID_NODE_ID);
            heap.push(Reverse((weight, node)));
        }
    }
}

fn stalled(
    graph: &QueryGraph,
    space: &SearchSpace,
    node: NodeId,
    weight: EdgeWeight,
    forward_search: bool,
) -> bool {
    for edge in graph.out_edges(node) {
        let data = graph.data(edge);
        let open = if forward_search { data.backward } else { data.forward };
        if !open {
            continue;
        }
        if let Some(neighbor) = space.get(graph.target(edge)) {
            if neighbor.saturating_add(data.weight) < weight {
                return true;
            }
        }
    }
    false
}

/// Reverse search from one target; every settled node lands in the buckets.
fn backward_fill(
    graph: &QueryGraph,
    space: &mut SearchSpace,
    buckets: &mut SearchBuckets,
    target_index: u32,
    target: &PhantomNode,
) {
    space.reset();
    let mut heap = Heap::new();
    seed_reverse(space, &mut heap, target);

    while let Some(Reverse((weight, node))) = heap.pop() {
        if space.get(node).map_or(true, |label| weight > label) {
            continue;
        }
        buckets.push(node, target_index, weight);

        if stalled(graph, space, node, weight, false) {
            continue;
        }
        for edge in graph.out_edges(node) {
            let data = graph.data(edge);
            if !data.backward {
                continue;
            }
            let next = graph.target(edge);
            let new_weight = weight.saturating_add(data.weight);
            if space.get(next).map_or(true, |label| new_weight < label) {
                space.label(next, new_weight, node);
                heap.push(Reverse((new_weight, next)));
            }
        }
    }
}

/// Forward search from one source, joining against the buckets.
fn forward_join(
    graph: &QueryGraph,
    space: &mut SearchSpace,
    buckets: &SearchBuckets,
    source: &PhantomNode,
    row: &mut [EdgeWeight],
) {
    space.reset();
    let mut heap = Heap::new();
    seed_forward(space, &mut heap, source);

    while let Some(Reverse((weight, node))) = heap.pop() {
        if space.get(node).map_or(true, |label| weight > label) {
            continue;
        }

        for &(target_index, target_weight) in buckets.get(node) {
            let mut total = weight.saturating_add(target_weight);
            if total < 0 {
                match graph.loop_weight(node) {
                    Some(loop_weight) => total += loop_weight,
                    None => continue,
                }
            }
            if total < row[target_index as usize] {
                row[target_index as usize] = total;
            }
        }

        if stalled(graph, space, node, weight, true) {
            continue;
        }
        for edge in graph.out_edges(node) {
            let data = graph.data(edge);
            if !data.forward {
                continue;
            }
            let next = graph.target(edge);
            let new_weight = weight.saturating_add(data.weight);
            if space.get(next).map_or(true, |label| new_weight < label) {
                space.label(next, new_weight, node);
                heap.push(Reverse((new_weight, next)));
            }
        }
    }
}

/// Compute the S x T duration matrix, row-major, `None` for unreachable
/// pairs. Results are deterministic for identical inputs and dataset.
pub fn many_to_many(
    graph: &QueryGraph,
    sources: &[PhantomNode],
    targets: &[PhantomNode],
) -> Vec<Option<EdgeWeight>> {
    let mut matrix = vec![INVALID_EDGE_WEIGHT; sources.len() * targets.len()];
    if sources.is_empty() || targets.is_empty() {
        return Vec::new();
    }

    // backward phase: fill buckets sequentially
    let mut buckets = SearchBuckets::new();
    let mut backward_space = SearchSpace::new(graph.node_count() as usize);
    for (target_index, target) in targets.iter().enumerate() {
        backward_fill(graph, &mut backward_space, &mut buckets, target_index as u32, target);
    }

    // forward phase: one row per source, in parallel
    thread_local! {
        static FORWARD_SPACE: RefCell<Option<SearchSpace>> = const { RefCell::new(None) };
    }
    let target_count = targets.len();
    let node_count = graph.node_count() as usize;
    matrix
        .par_chunks_mut(target_count)
        .zip(sources.par_iter())
        .for_each(|(row, source)| {
            FORWARD_SPACE.with(|cell| {
                let mut space = cell.borrow_mut();
                let space = space.get_or_insert_with(|| SearchSpace::new(node_count));
                forward_join(graph, space, &buckets, source, row);
            });
        });

    matrix
        .into_iter()
        .map(|weight| (weight != INVALID_EDGE_WEIGHT).then_some(weight))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::edge_expander::EdgeBasedEdge;
    use crate::geo::Coordinate;
    use crate::router::search::{shortest_path, SearchContext};
    use crate::types::{SegmentId, TravelMode};

    fn turn(source: NodeId, target: NodeId, weight: EdgeWeight) -> EdgeBasedEdge {
        EdgeBasedEdge {
            source,
            target,
            weight,
        }
    }

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

    fn diamond() -> QueryGraph {
        QueryGraph::from_edge_based_graph(
            4,
            &[
                turn(0, 1, 10),
                turn(1, 3, 5),
                turn(0, 2, 2),
                turn(2, 3, 2),
                turn(3, 0, 50),
            ],
        )
    }

    #[test]
    fn test_matrix_matches_one_to_one() {
        // P4: the 1x1 matrix equals the route weight
        let graph = diamond();
        let source = phantom_on(0, 0);
        let target = phantom_on(3, 7);

        let mut context = SearchContext::new(4);
        let route = shortest_path(&graph, &mut context, &source, &target, None).unwrap();
        let matrix = many_to_many(&graph, &[source], &[target]);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0], Some(route.weight));
    }

    #[test]
    fn test_full_matrix() {
        let graph = diamond();
        let phantoms = [phantom_on(0, 0), phantom_on(3, 0)];
        let matrix = many_to_many(&graph, &phantoms, &phantoms);
        assert_eq!(matrix.len(), 4);
        // diagonal: same node, zero-length split
        assert_eq!(matrix[0], Some(0));
        assert_eq!(matrix[3], Some(0));
        // 0 -> 3 via 2 costs 4; 3 -> 0 via the back edge costs 50
        assert_eq!(matrix[1], Some(4));
        assert_eq!(matrix[2], Some(50));
    }

    #[test]
    fn test_unreachable_is_none() {
        let graph = QueryGraph::from_edge_based_graph(3, &[turn(0, 1, 5)]);
        let matrix = many_to_many(&graph, &[phantom_on(0, 0)], &[phantom_on(2, 0)]);
        assert_eq!(matrix[0], None);
    }

    #[test]
    fn test_buckets_clear() {
        let mut buckets = SearchBuckets::new();
        buckets.push(3, 0, 10);
        buckets.push(3, 1, 20);
        assert_eq!(buckets.get(3).len(), 2);
        assert_eq!(buckets.total_entries(), 2);
        buckets.clear();
        assert_eq!(buckets.get(3).len(), 0);
    }
}

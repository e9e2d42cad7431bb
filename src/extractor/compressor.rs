//! Degree-two chain compression.
//!
//! Collapses maximal chains of pass-through nodes into single logical edges
//! while keeping the inner node sequence (for polyline unpacking) and the
//! per-direction cumulative weights (for mid-edge phantom splits).

use rustc_hash::FxHashMap;

use super::graph_builder::InternalNode;
use super::node_based_graph::NodeBasedGraph;
use super::restriction_map::RestrictionMap;
use crate::types::{EdgeWeight, NodeId, INVALID_EDGE_WEIGHT};

/// Packed inner geometries, keyed by the slot geometry key. Entries are
/// `(inner node, cumulative weight from the slot source)` in travel order.
#[derive(Debug, Default)]
pub struct CompressedEdgeContainer {
    buckets: FxHashMap<u32, Vec<(NodeId, EdgeWeight)>>,
}

impl CompressedEdgeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inner nodes of a compressed edge, excluding both endpoints.
    pub fn inner(&self, geometry_key: u32) -> &[(NodeId, EdgeWeight)] {
        self.buckets
            .get(&geometry_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn compressed_edge_count(&self) -> usize {
        self.buckets.len()
    }

    /// Merge `removed` (the continuation after `via`) into `kept`.
    ///
    /// `shift` is the total forward weight of `kept` before the merge, which
    /// is exactly the cumulative weight at `via`.
    fn append_via(&mut self, kept: u32, via: NodeId, shift: EdgeWeight, removed: u32) {
        let tail = self.buckets.remove(&removed).unwrap_or_default();
        let bucket = self.buckets.entry(kept).or_default();
        bucket.push((via, shift));
        bucket.extend(tail.into_iter().map(|(node, weight)| (node, shift.saturating_add(weight))));
    }

    /// Full node sequence for a slot direction, endpoints included.
    pub fn full_geometry(
        &self,
        source: NodeId,
        target: NodeId,
        total_weight: EdgeWeight,
        geometry_key: u32,
    ) -> Vec<(NodeId, EdgeWeight)> {
        let mut nodes = Vec::with_capacity(self.inner(geometry_key).len() + 2);
        nodes.push((source, 0));
        nodes.extend_from_slice(self.inner(geometry_key));
        nodes.push((target, total_weight));
        nodes
    }
}

/// A node can be collapsed iff it sits between exactly two distinct edges
/// that agree on annotation and directional pattern, carries no barrier or
/// signal, and is not pinned by a restriction.
pub fn compress_graph(
    graph: &mut NodeBasedGraph,
    nodes: &[InternalNode],
    restrictions: &mut RestrictionMap,
    container: &mut CompressedEdgeContainer,
) -> usize {
    let mut compressed = 0usize;

    for via in 0..graph.node_count() as NodeId {
        let info = &nodes[via as usize];
        if info.barrier || info.traffic_signal || restrictions.is_via_node(via) {
            continue;
        }
        if graph.degree(via) != 2 {
            continue;
        }

        let (a, b) = {
            let slots = graph.slots(via);
            (slots[0].target, slots[1].target)
        };
        if a == b {
            continue;
        }
        // compression must not create parallel edges
        if graph.find_slot(a, b).is_some() {
            continue;
        }

        let Some(ia) = graph.find_slot(a, via) else {
            continue;
        };
        let Some(ib) = graph.find_slot(b, via) else {
            continue;
        };

        let va = graph.slot(via, 0).data;
        let vb = graph.slot(via, 1).data;
        let av = graph.slot(a, ia).data;
        let bv = graph.slot(b, ib).data;

        if !av.is_compatible_with(&vb) {
            continue;
        }
        // traversability must be consistent end to end
        if av.can_forward() != vb.can_forward() || bv.can_forward() != va.can_forward() {
            continue;
        }

        let ab_weight = if av.can_forward() {
            av.forward_weight.saturating_add(vb.forward_weight)
        } else {
            INVALID_EDGE_WEIGHT
        };
        let ba_weight = if bv.can_forward() {
            bv.forward_weight.saturating_add(va.forward_weight)
        } else {
            INVALID_EDGE_WEIGHT
        };

        // geometry: (a -> via) absorbs (via -> b), mirror likewise
        let ab_shift = if av.can_forward() { av.forward_weight } else { 0 };
        let ba_shift = if bv.can_forward() { bv.forward_weight } else { 0 };
        container.append_via(av.geometry_key, via, ab_shift, vb.geometry_key);
        container.append_via(bv.geometry_key, via, ba_shift, va.geometry_key);

        {
            let slot = graph.slot_mut(a, ia);
            slot.target = b;
            slot.data.forward_weight = ab_weight;
            slot.data.backward_weight = ba_weight;
            slot.data.is_split = av.is_split || vb.is_split;
        }
        {
            let slot = graph.slot_mut(b, ib);
            slot.target = a;
            slot.data.forward_weight = ba_weight;
            slot.data.backward_weight = ab_weight;
            slot.data.is_split = bv.is_split || va.is_split;
        }
        graph.remove_all_slots(via);

        // an adjacent node may be a restriction endpoint
        restrictions.replace_endpoint(a, via, b);
        restrictions.replace_endpoint(b, via, a);

        compressed += 1;
    }

    compressed
}

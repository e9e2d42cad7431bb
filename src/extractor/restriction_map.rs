//! Turn restriction lookup keyed by internal node ids.
//!
//! `only_*` restrictions are stored as `(via, from) -> mandatory target`,
//! `no_*` restrictions as forbidden `(via, from, to)` triples. The compressor
//! rewrites endpoints when an adjacent chain node is collapsed away.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::extractor::graph_builder::InternalRestriction;
use crate::types::NodeId;

#[derive(Debug, Default)]
pub struct RestrictionMap {
    only: FxHashMap<(NodeId, NodeId), NodeId>,
    no: FxHashSet<(NodeId, NodeId, NodeId)>,
    via_nodes: FxHashSet<NodeId>,
}

impl RestrictionMap {
    pub fn new(restrictions: &[InternalRestriction]) -> Self {
        let mut map = Self::default();
        for restriction in restrictions {
            map.via_nodes.insert(restriction.via);
            if restriction.only {
                map.only
                    .insert((restriction.via, restriction.from), restriction.to);
            } else {
                map.no
                    .insert((restriction.via, restriction.from, restriction.to));
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.only.len() + self.no.len()
    }

    pub fn is_empty(&self) -> bool {
        self.only.is_empty() && self.no.is_empty()
    }

    /// Via nodes are pinned: the compressor must not collapse them.
    pub fn is_via_node(&self, node: NodeId) -> bool {
        self.via_nodes.contains(&node)
    }

    /// A turn `(from -> via -> to)` is forbidden when a `no_*` matches it or
    /// an `only_*` at `(via, from)` mandates a different target.
    pub fn is_turn_forbidden(&self, from: NodeId, via: NodeId, to: NodeId) -> bool {
        if self.no.contains(&(via, from, to)) {
            return true;
        }
        if let Some(&mandatory) = self.only.get(&(via, from)) {
            return mandatory != to;
        }
        false
    }

    /// Rewrite restriction endpoints after the compressor replaced the chain
    /// node `old` next to `via` by the chain endpoint `new`.
    pub fn replace_endpoint(&mut self, via: NodeId, old: NodeId, new: NodeId) {
        if !self.via_nodes.contains(&via) {
            return;
        }
        if let Some(target) = self.only.remove(&(via, old)) {
            self.only.insert((via, new), target);
        }
        let rewritten: Vec<(NodeId, NodeId)> = self
            .only
            .iter()
            .filter(|((v, _), target)| *v == via && **target == old)
            .map(|((v, from), _)| (*v, *from))
            .collect();
        for key in rewritten {
            self.only.insert(key, new);
        }

        let affected: Vec<(NodeId, NodeId, NodeId)> = self
            .no
            .iter()
            .filter(|(v, from, to)| *v == via && (*from == old || *to == old))
            .copied()
            .collect();
        for triple in affected {
            self.no.remove(&triple);
            let (v, from, to) = triple;
            self.no.insert((
                v,
                if from == old { new } else { from },
                if to == old { new } else { to },
            ));
        }
    }
}

//! Weakly connected components
//!
//! Union-find over the dense indices of a [`GraphView`]. Every set is rooted
//! at its smallest index, and indices ascend with node ids, so a component's
//! root is also its smallest member. That matches the label the distributed
//! components program converges to.

use super::common::{GraphView, NodeId};
use std::collections::HashMap;

/// Components keyed by their smallest member
pub struct WccResult {
    /// Smallest member -> members, ascending
    pub components: HashMap<NodeId, Vec<NodeId>>,
    /// Node -> smallest member of its component
    pub labels: HashMap<NodeId, NodeId>,
}

impl WccResult {
    /// Smallest node id in the component of `node`
    pub fn min_member(&self, node: NodeId) -> Option<NodeId> {
        self.labels.get(&node).copied()
    }
}

/// Disjoint sets whose roots are their minimum index
struct MinRootSets {
    parent: Vec<usize>,
}

impl MinRootSets {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn root(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // Path halving
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn join(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

/// Weakly connected components, ignoring edge direction
pub fn weakly_connected_components(view: &GraphView) -> WccResult {
    let mut sets = MinRootSets::new(view.node_count);
    for u in 0..view.node_count {
        for &v in view.successors(u) {
            sets.join(u, v);
        }
    }

    let mut components: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut labels = HashMap::with_capacity(view.node_count);
    for (idx, &node) in view.index_to_node.iter().enumerate() {
        let label = view.index_to_node[sets.root(idx)];
        components.entry(label).or_default().push(node);
        labels.insert(node, label);
    }

    WccResult { components, labels }
}

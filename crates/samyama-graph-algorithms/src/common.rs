//! Shared utilities for graph algorithms
//!
//! Provides a read-only, optimized view of the graph topology for algorithm execution.

use std::collections::HashMap;

/// Node Identifier type (u64)
pub type NodeId = u64;

/// A dense, integer-indexed view of the graph topology using Compressed Sparse Row (CSR) format.
#[derive(Debug, Clone)]
pub struct GraphView {
    /// Number of nodes
    pub node_count: usize,
    /// Mapping from dense index (0..N) back to NodeId, ascending
    pub index_to_node: Vec<NodeId>,
    /// Mapping from NodeId to dense index
    pub node_to_index: HashMap<NodeId, usize>,

    /// Offsets into `out_targets`. Size = node_count + 1
    pub out_offsets: Vec<usize>,
    /// Contiguous array of target node indices
    pub out_targets: Vec<usize>,

    /// Offsets into `in_sources`. Size = node_count + 1
    pub in_offsets: Vec<usize>,
    /// Contiguous array of source node indices
    pub in_sources: Vec<usize>,

    /// Edge weights, aligned with `out_targets`
    pub weights: Vec<f64>,
}

impl GraphView {
    /// Build a view from a node list and weighted `(source, target, weight)`
    /// edges. Endpoints missing from `nodes` are added.
    pub fn from_edges(nodes: &[NodeId], edges: &[(NodeId, NodeId, f64)]) -> Self {
        let mut index_to_node: Vec<NodeId> = nodes
            .iter()
            .copied()
            .chain(edges.iter().flat_map(|&(s, t, _)| [s, t]))
            .collect();
        index_to_node.sort_unstable();
        index_to_node.dedup();

        let node_count = index_to_node.len();
        let node_to_index: HashMap<NodeId, usize> =
            index_to_node.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut outgoing: Vec<Vec<(usize, f64)>> = vec![Vec::new(); node_count];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for &(s, t, w) in edges {
            let (u, v) = (node_to_index[&s], node_to_index[&t]);
            outgoing[u].push((v, w));
            incoming[v].push(u);
        }

        let mut out_offsets = Vec::with_capacity(node_count + 1);
        let mut out_targets = Vec::with_capacity(edges.len());
        let mut weights = Vec::with_capacity(edges.len());
        out_offsets.push(0);
        for neighbors in outgoing {
            for (v, w) in neighbors {
                out_targets.push(v);
                weights.push(w);
            }
            out_offsets.push(out_targets.len());
        }

        let mut in_offsets = Vec::with_capacity(node_count + 1);
        let mut in_sources = Vec::with_capacity(edges.len());
        in_offsets.push(0);
        for sources in incoming {
            in_sources.extend(sources);
            in_offsets.push(in_sources.len());
        }

        GraphView {
            node_count,
            index_to_node,
            node_to_index,
            out_offsets,
            out_targets,
            in_offsets,
            in_sources,
            weights,
        }
    }

    /// Unweighted edges get weight 1.0
    pub fn from_pairs(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Self {
        let weighted: Vec<(NodeId, NodeId, f64)> = edges.iter().map(|&(s, t)| (s, t, 1.0)).collect();
        Self::from_edges(nodes, &weighted)
    }

    /// Get the out-degree of a node (by index)
    pub fn out_degree(&self, idx: usize) -> usize {
        self.out_offsets[idx + 1] - self.out_offsets[idx]
    }

    /// Get the in-degree of a node (by index)
    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_offsets[idx + 1] - self.in_offsets[idx]
    }

    /// Get outgoing neighbors (successors) of a node
    pub fn successors(&self, idx: usize) -> &[usize] {
        &self.out_targets[self.out_offsets[idx]..self.out_offsets[idx + 1]]
    }

    /// Get incoming neighbors (predecessors) of a node
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        &self.in_sources[self.in_offsets[idx]..self.in_offsets[idx + 1]]
    }

    /// Get weights for outgoing edges of a node
    pub fn weights(&self, idx: usize) -> &[f64] {
        &self.weights[self.out_offsets[idx]..self.out_offsets[idx + 1]]
    }
}

//! Pathfinding algorithms
//!
//! Dijkstra over non-negative weights.

use super::common::{GraphView, NodeId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Result of a pathfinding algorithm
#[derive(Debug, Clone)]
pub struct PathResult {
    pub source: NodeId,
    pub target: NodeId,
    pub path: Vec<NodeId>,
    pub cost: f64,
}

/// State for Dijkstra priority queue
#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node_idx: usize,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare costs reversed for min-heap
        other.cost.total_cmp(&self.cost).then(other.node_idx.cmp(&self.node_idx))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Settle nodes from `source_idx` until `stop` returns true for a settled node.
/// Returns (distance, parent) per index.
fn settle(view: &GraphView, source_idx: usize, stop: impl Fn(usize) -> bool) -> (Vec<f64>, Vec<Option<usize>>) {
    let mut dist = vec![f64::INFINITY; view.node_count];
    let mut parent = vec![None; view.node_count];
    let mut heap = BinaryHeap::new();

    dist[source_idx] = 0.0;
    heap.push(State {
        cost: 0.0,
        node_idx: source_idx,
    });

    while let Some(State { cost, node_idx }) = heap.pop() {
        if cost > dist[node_idx] {
            continue;
        }
        if stop(node_idx) {
            break;
        }
        for (&next_idx, &weight) in view.successors(node_idx).iter().zip(view.weights(node_idx)) {
            if weight < 0.0 {
                continue;
            }
            let next_cost = cost + weight;
            if next_cost < dist[next_idx] {
                dist[next_idx] = next_cost;
                parent[next_idx] = Some(node_idx);
                heap.push(State {
                    cost: next_cost,
                    node_idx: next_idx,
                });
            }
        }
    }
    (dist, parent)
}

/// Dijkstra's Algorithm (Weighted Shortest Path)
pub fn dijkstra(view: &GraphView, source: NodeId, target: NodeId) -> Option<PathResult> {
    let source_idx = *view.node_to_index.get(&source)?;
    let target_idx = *view.node_to_index.get(&target)?;
    let (dist, parent) = settle(view, source_idx, |idx| idx == target_idx);
    if dist[target_idx].is_infinite() {
        return None;
    }

    let mut path = Vec::new();
    let mut curr = Some(target_idx);
    while let Some(idx) = curr {
        path.push(view.index_to_node[idx]);
        curr = parent[idx];
    }
    path.reverse();
    Some(PathResult {
        source,
        target,
        path,
        cost: dist[target_idx],
    })
}

/// Distance from `source` to every node; unreachable nodes map to infinity
pub fn shortest_distances(view: &GraphView, source: NodeId) -> HashMap<NodeId, f64> {
    let Some(&source_idx) = view.node_to_index.get(&source) else {
        return view.index_to_node.iter().map(|&id| (id, f64::INFINITY)).collect();
    };
    let (dist, _) = settle(view, source_idx, |_| false);
    view.index_to_node.iter().copied().zip(dist).collect()
}

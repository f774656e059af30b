//! Graph fixtures shared by the integration tests

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use samyama_gas::graph::{DistributedGraph, ModuloPartitioner, VertexId};
use samyama_gas::MachineContext;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Seeded random directed graph without self or duplicate edges
pub fn random_edges(vertices: u64, edges: usize, seed: u64) -> Vec<(u64, u64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    while out.len() < edges {
        let s = rng.gen_range(0..vertices);
        let t = rng.gen_range(0..vertices);
        if s != t && seen.insert((s, t)) {
            out.push((s, t, rng.gen_range(1.0..10.0)));
        }
    }
    out
}

/// Build a graph of `0..vertices` from edges, spreading insertions over
/// machines by edge position.
pub async fn build_graph<V, E>(
    machine: &MachineContext,
    vertices: u64,
    edges: &[(u64, u64, f64)],
    initial: impl Fn(u64) -> V,
    edge_data: impl Fn(f64) -> E,
) -> DistributedGraph<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let n = machine.num_machines();
    let mut graph = DistributedGraph::with_partitioner(machine, Arc::new(ModuloPartitioner)).unwrap();
    for id in (0..vertices).filter(|id| *id as usize % n == (machine.id() + 1) % n) {
        graph.add_vertex(VertexId::new(id), initial(id)).unwrap();
    }
    for (k, &(s, t, w)) in edges.iter().enumerate() {
        if k % n == machine.id() {
            graph.add_edge(VertexId::new(s), VertexId::new(t), edge_data(w)).unwrap();
        }
    }
    graph.finalize().await.unwrap();
    graph
}

/// Vertices within `hops` undirected hops of each other
pub fn within(edges: &[(u64, u64, f64)], hops: usize) -> BTreeSet<(u64, u64)> {
    let adjacent: BTreeSet<(u64, u64)> = edges.iter().flat_map(|&(s, t, _)| [(s, t), (t, s)]).collect();
    let mut reach = adjacent.clone();
    for _ in 1..hops {
        let mut next = reach.clone();
        for &(a, b) in &reach {
            for &(c, d) in &adjacent {
                if b == c && a != d {
                    next.insert((a, d));
                }
            }
        }
        reach = next;
    }
    reach
}

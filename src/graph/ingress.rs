//! Pre-finalize buffering of vertex and edge insertions on one machine

use super::store::{GraphError, GraphResult};
use super::types::VertexId;
use rustc_hash::{FxHashMap, FxHashSet};

/// Vertices and edges added on this machine, not yet shuffled to their owners.
pub(crate) struct Ingress<V, E> {
    vertices: FxHashMap<VertexId, V>,
    edges: Vec<(VertexId, VertexId, E)>,
    seen_edges: FxHashSet<(VertexId, VertexId)>,
}

impl<V, E> Ingress<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            vertices: FxHashMap::default(),
            edges: Vec::new(),
            seen_edges: FxHashSet::default(),
        }
    }

    /// Later insertions of the same id overwrite earlier ones.
    pub(crate) fn add_vertex(&mut self, id: VertexId, data: V) -> GraphResult<()> {
        if id.is_sentinel() {
            return Err(GraphError::ReservedVertexId(id));
        }
        self.vertices.insert(id, data);
        Ok(())
    }

    pub(crate) fn add_edge(&mut self, source: VertexId, target: VertexId, data: E) -> GraphResult<()> {
        if source.is_sentinel() {
            return Err(GraphError::ReservedVertexId(source));
        }
        if target.is_sentinel() {
            return Err(GraphError::ReservedVertexId(target));
        }
        if source == target {
            return Err(GraphError::SelfEdge(source));
        }
        if !self.seen_edges.insert((source, target)) {
            return Err(GraphError::DuplicateEdge(source, target));
        }
        self.edges.push((source, target, data));
        Ok(())
    }

    pub(crate) fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub(crate) fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn into_parts(self) -> (Vec<(VertexId, V)>, Vec<(VertexId, VertexId, E)>) {
        (self.vertices.into_iter().collect(), self.edges)
    }
}

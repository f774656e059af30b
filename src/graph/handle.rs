//! Borrowed handles into a [`LocalGraph`]
//!
//! Handles are plain (graph, index) pairs. Reading data takes a recursive
//! read lock so a handle can be read several times in one phase without
//! deadlocking against itself; [`VertexMut`] holds the write lock for the
//! whole apply phase.

use super::local::LocalGraph;
use super::types::{EdgeDirection, LocalEid, LocalVid, VertexId};
use crate::cluster::MachineId;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::Range;

/// Read-only view of a local vertex (owned or replica)
pub struct VertexRef<'a, V, E> {
    graph: &'a LocalGraph<V, E>,
    lvid: LocalVid,
}

impl<V, E> Clone for VertexRef<'_, V, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, E> Copy for VertexRef<'_, V, E> {}

impl<V, E> fmt::Debug for VertexRef<'_, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexRef")
            .field("id", &self.id())
            .field("lvid", &self.lvid)
            .finish()
    }
}

impl<'a, V, E> VertexRef<'a, V, E> {
    pub(crate) fn new(graph: &'a LocalGraph<V, E>, lvid: LocalVid) -> Self {
        Self { graph, lvid }
    }

    pub fn id(&self) -> VertexId {
        self.graph.record(self.lvid).id
    }

    pub fn local_id(&self) -> LocalVid {
        self.lvid
    }

    pub fn owner(&self) -> MachineId {
        self.graph.record(self.lvid).owner
    }

    pub fn is_owned(&self) -> bool {
        self.graph.is_owned(self.lvid)
    }

    /// Global in-degree
    pub fn num_in_edges(&self) -> usize {
        self.graph.record(self.lvid).num_in
    }

    /// Global out-degree
    pub fn num_out_edges(&self) -> usize {
        self.graph.record(self.lvid).num_out
    }

    pub fn data(&self) -> RwLockReadGuard<'a, V> {
        self.graph.record(self.lvid).data.read_recursive()
    }

    /// Locally stored edges selected by `direction`
    pub fn edges(&self, direction: EdgeDirection) -> Edges<'a, V, E> {
        self.graph.edges(self.lvid, direction)
    }

    pub fn in_edges(&self) -> Edges<'a, V, E> {
        self.edges(EdgeDirection::In)
    }

    pub fn out_edges(&self) -> Edges<'a, V, E> {
        self.edges(EdgeDirection::Out)
    }

    /// (neighbor, edge) pairs over the locally stored edges selected by `direction`
    pub fn neighbors(
        &self,
        direction: EdgeDirection,
    ) -> impl Iterator<Item = (VertexRef<'a, V, E>, EdgeRef<'a, V, E>)> + 'a {
        let center = self.id();
        self.edges(direction).map(move |edge| (edge.other(center), edge))
    }
}

/// Exclusive access to a vertex's data, held for the apply phase
pub struct VertexMut<'a, V, E> {
    vertex: VertexRef<'a, V, E>,
    data: RwLockWriteGuard<'a, V>,
}

impl<'a, V, E> VertexMut<'a, V, E> {
    pub(crate) fn new(graph: &'a LocalGraph<V, E>, lvid: LocalVid) -> Self {
        Self {
            vertex: VertexRef::new(graph, lvid),
            data: graph.record(lvid).data.write(),
        }
    }

    pub fn id(&self) -> VertexId {
        self.vertex.id()
    }

    pub fn num_in_edges(&self) -> usize {
        self.vertex.num_in_edges()
    }

    pub fn num_out_edges(&self) -> usize {
        self.vertex.num_out_edges()
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut V {
        &mut self.data
    }
}

/// Read-only view of a local edge
pub struct EdgeRef<'a, V, E> {
    graph: &'a LocalGraph<V, E>,
    eid: LocalEid,
}

impl<V, E> Clone for EdgeRef<'_, V, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, E> Copy for EdgeRef<'_, V, E> {}

impl<V, E> fmt::Debug for EdgeRef<'_, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeRef")
            .field("source", &self.source().id())
            .field("target", &self.target().id())
            .finish()
    }
}

impl<'a, V, E> EdgeRef<'a, V, E> {
    pub(crate) fn new(graph: &'a LocalGraph<V, E>, eid: LocalEid) -> Self {
        Self { graph, eid }
    }

    pub fn local_id(&self) -> LocalEid {
        self.eid
    }

    pub fn source(&self) -> VertexRef<'a, V, E> {
        VertexRef::new(self.graph, self.graph.edge_record(self.eid).source)
    }

    pub fn target(&self) -> VertexRef<'a, V, E> {
        VertexRef::new(self.graph, self.graph.edge_record(self.eid).target)
    }

    /// The endpoint that is not `vertex`
    pub fn other(&self, vertex: VertexId) -> VertexRef<'a, V, E> {
        let source = self.source();
        if source.id() == vertex {
            self.target()
        } else {
            source
        }
    }

    pub fn data(&self) -> RwLockReadGuard<'a, E> {
        self.graph.edge_record(self.eid).data.read_recursive()
    }
}

/// Edge handle passed to scatter, the only phase allowed to write edge data
pub struct EdgeMut<'a, V, E> {
    edge: EdgeRef<'a, V, E>,
}

impl<'a, V, E> EdgeMut<'a, V, E> {
    pub(crate) fn new(edge: EdgeRef<'a, V, E>) -> Self {
        Self { edge }
    }

    pub fn data_mut(&self) -> RwLockWriteGuard<'a, E> {
        self.edge.graph.edge_record(self.edge.eid).data.write()
    }
}

impl<'a, V, E> std::ops::Deref for EdgeMut<'a, V, E> {
    type Target = EdgeRef<'a, V, E>;

    fn deref(&self) -> &Self::Target {
        &self.edge
    }
}

/// Iterator over a vertex's local edges: out-edges, then in-edges
pub struct Edges<'a, V, E> {
    graph: &'a LocalGraph<V, E>,
    out: Range<LocalEid>,
    ins: std::slice::Iter<'a, LocalEid>,
}

impl<'a, V, E> Edges<'a, V, E> {
    pub(crate) fn new(graph: &'a LocalGraph<V, E>, out: Range<LocalEid>, ins: &'a [LocalEid]) -> Self {
        Self {
            graph,
            out,
            ins: ins.iter(),
        }
    }
}

impl<'a, V, E> Iterator for Edges<'a, V, E> {
    type Item = EdgeRef<'a, V, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(eid) = self.out.next() {
            return Some(EdgeRef::new(self.graph, eid));
        }
        self.ins.next().map(|&eid| EdgeRef::new(self.graph, eid))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.out.len() + self.ins.len();
        (n, Some(n))
    }
}

impl<V, E> ExactSizeIterator for Edges<'_, V, E> {}

//! One machine's finalized shard of the distributed graph
//!
//! Vertices and edges live in two arenas and refer to each other by dense
//! index, so there are no ownership cycles:
//! - `vertices`: owned vertices first (ascending id), then replicas (ascending id)
//! - `edges`: sorted by (source local index, target id); a vertex's out-edges
//!   are therefore one contiguous range
//! - `in_edges`: edge indices grouped by target, ordered by source id
//!
//! Vertex and edge data sit behind per-element locks so that engine workers can
//! share the shard through an `Arc`.

use super::handle::{EdgeRef, Edges, VertexRef};
use super::store::{GraphError, GraphResult};
use super::types::{EdgeDirection, LocalEid, LocalVid, VertexId};
use crate::cluster::MachineId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::ops::Range;

pub(crate) struct VertexRecord<V> {
    pub(crate) id: VertexId,
    pub(crate) owner: MachineId,
    /// Global degrees, identical on the owner and every replica
    pub(crate) num_in: usize,
    pub(crate) num_out: usize,
    pub(crate) data: RwLock<V>,
}

pub(crate) struct EdgeRecord<E> {
    pub(crate) source: LocalVid,
    pub(crate) target: LocalVid,
    pub(crate) data: RwLock<E>,
}

/// A machine holding a replica of an owned vertex, and how many of that
/// vertex's edges it stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mirror {
    pub machine: MachineId,
    pub num_in: usize,
    pub num_out: usize,
}

impl Mirror {
    /// Whether this mirror stores any edge selected by `direction`
    pub fn has_edges(&self, direction: EdgeDirection) -> bool {
        (direction.includes_in() && self.num_in > 0) || (direction.includes_out() && self.num_out > 0)
    }
}

/// An owned vertex as assembled by finalize
pub(crate) struct OwnedVertex<V> {
    pub(crate) id: VertexId,
    pub(crate) data: V,
    pub(crate) num_in: usize,
    pub(crate) num_out: usize,
    pub(crate) mirrors: Vec<Mirror>,
    /// Distinct neighbor ids, ascending
    pub(crate) scope: Vec<VertexId>,
}

/// A replica as assembled by finalize
pub(crate) struct ReplicaVertex<V> {
    pub(crate) id: VertexId,
    pub(crate) owner: MachineId,
    pub(crate) data: V,
    pub(crate) num_in: usize,
    pub(crate) num_out: usize,
}

pub struct LocalGraph<V, E> {
    machine: MachineId,
    num_machines: usize,
    vertices: Vec<VertexRecord<V>>,
    num_owned: usize,
    index: FxHashMap<VertexId, LocalVid>,
    edges: Vec<EdgeRecord<E>>,
    out_offsets: Vec<usize>,
    in_offsets: Vec<usize>,
    in_edges: Vec<LocalEid>,
    mirrors: Vec<Vec<Mirror>>,
    scope_offsets: Vec<usize>,
    scope: Vec<VertexId>,
    num_vertices: u64,
    num_edges: u64,
}

impl<V, E> LocalGraph<V, E> {
    /// Build the arena and adjacency indices. Every edge endpoint must be
    /// among `owned` or `replicas`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        machine: MachineId,
        num_machines: usize,
        mut owned: Vec<OwnedVertex<V>>,
        mut replicas: Vec<ReplicaVertex<V>>,
        edges: Vec<(VertexId, VertexId, E)>,
        num_vertices: u64,
        num_edges: u64,
    ) -> GraphResult<Self> {
        owned.sort_by_key(|v| v.id);
        replicas.sort_by_key(|v| v.id);

        let num_owned = owned.len();
        let total = num_owned + replicas.len();
        let mut vertices = Vec::with_capacity(total);
        let mut index = FxHashMap::with_capacity_and_hasher(total, Default::default());
        let mut mirrors = Vec::with_capacity(num_owned);
        let mut scope_offsets = Vec::with_capacity(num_owned + 1);
        let mut scope = Vec::new();

        scope_offsets.push(0);
        for vertex in owned {
            index.insert(vertex.id, vertices.len());
            vertices.push(VertexRecord {
                id: vertex.id,
                owner: machine,
                num_in: vertex.num_in,
                num_out: vertex.num_out,
                data: RwLock::new(vertex.data),
            });
            mirrors.push(vertex.mirrors);
            scope.extend(vertex.scope);
            scope_offsets.push(scope.len());
        }
        for replica in replicas {
            index.insert(replica.id, vertices.len());
            vertices.push(VertexRecord {
                id: replica.id,
                owner: replica.owner,
                num_in: replica.num_in,
                num_out: replica.num_out,
                data: RwLock::new(replica.data),
            });
        }

        let mut resolved = Vec::with_capacity(edges.len());
        for (source, target, data) in edges {
            let s = *index.get(&source).ok_or(GraphError::MissingVertex(source))?;
            let t = *index.get(&target).ok_or(GraphError::MissingVertex(target))?;
            resolved.push((s, target, t, data));
        }
        resolved.sort_by_key(|&(s, target, _, _)| (s, target));

        let mut out_offsets = vec![0usize; total + 1];
        let mut in_order: Vec<(LocalVid, VertexId, LocalEid)> = Vec::with_capacity(resolved.len());
        let mut edge_records = Vec::with_capacity(resolved.len());
        for (eid, (s, _, t, data)) in resolved.into_iter().enumerate() {
            out_offsets[s + 1] += 1;
            in_order.push((t, vertices[s].id, eid));
            edge_records.push(EdgeRecord {
                source: s,
                target: t,
                data: RwLock::new(data),
            });
        }
        for i in 0..total {
            out_offsets[i + 1] += out_offsets[i];
        }

        in_order.sort_unstable_by_key(|&(t, source, _)| (t, source));
        let mut in_offsets = vec![0usize; total + 1];
        for &(t, _, _) in &in_order {
            in_offsets[t + 1] += 1;
        }
        for i in 0..total {
            in_offsets[i + 1] += in_offsets[i];
        }
        let in_edges = in_order.into_iter().map(|(_, _, eid)| eid).collect();

        Ok(Self {
            machine,
            num_machines,
            vertices,
            num_owned,
            index,
            edges: edge_records,
            out_offsets,
            in_offsets,
            in_edges,
            mirrors,
            scope_offsets,
            scope,
            num_vertices,
            num_edges,
        })
    }

    pub fn machine(&self) -> MachineId {
        self.machine
    }

    pub fn num_machines(&self) -> usize {
        self.num_machines
    }

    /// Global vertex count
    pub fn num_vertices(&self) -> u64 {
        self.num_vertices
    }

    /// Global edge count
    pub fn num_edges(&self) -> u64 {
        self.num_edges
    }

    /// Owned vertices plus replicas
    pub fn num_local_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_owned(&self) -> usize {
        self.num_owned
    }

    pub fn num_replicas(&self) -> usize {
        self.vertices.len() - self.num_owned
    }

    /// Edges stored on this machine
    pub fn num_local_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn lvid(&self, id: VertexId) -> Option<LocalVid> {
        self.index.get(&id).copied()
    }

    pub fn is_owned(&self, lvid: LocalVid) -> bool {
        lvid < self.num_owned
    }

    pub fn owned_range(&self) -> Range<LocalVid> {
        0..self.num_owned
    }

    pub fn vertex(&self, lvid: LocalVid) -> VertexRef<'_, V, E> {
        VertexRef::new(self, lvid)
    }

    pub fn vertex_by_id(&self, id: VertexId) -> Option<VertexRef<'_, V, E>> {
        self.lvid(id).map(|lvid| self.vertex(lvid))
    }

    pub fn edge(&self, eid: LocalEid) -> EdgeRef<'_, V, E> {
        EdgeRef::new(self, eid)
    }

    /// Owned vertices, ascending id
    pub fn owned_vertices(&self) -> impl Iterator<Item = VertexRef<'_, V, E>> + '_ {
        self.owned_range().map(move |lvid| self.vertex(lvid))
    }

    /// Owned vertices followed by replicas
    pub fn local_vertices(&self) -> impl Iterator<Item = VertexRef<'_, V, E>> + '_ {
        (0..self.vertices.len()).map(move |lvid| self.vertex(lvid))
    }

    pub fn local_edges(&self) -> impl Iterator<Item = EdgeRef<'_, V, E>> + '_ {
        (0..self.edges.len()).map(move |eid| self.edge(eid))
    }

    /// Local edges of `lvid` selected by `direction`: out-edges first, then in-edges
    pub fn edges(&self, lvid: LocalVid, direction: EdgeDirection) -> Edges<'_, V, E> {
        let out = if direction.includes_out() {
            self.out_offsets[lvid]..self.out_offsets[lvid + 1]
        } else {
            0..0
        };
        let ins: &[LocalEid] = if direction.includes_in() {
            &self.in_edges[self.in_offsets[lvid]..self.in_offsets[lvid + 1]]
        } else {
            &[]
        };
        Edges::new(self, out, ins)
    }

    pub fn local_out_degree(&self, lvid: LocalVid) -> usize {
        self.out_offsets[lvid + 1] - self.out_offsets[lvid]
    }

    pub fn local_in_degree(&self, lvid: LocalVid) -> usize {
        self.in_offsets[lvid + 1] - self.in_offsets[lvid]
    }

    /// Whether any local edge of `lvid` is selected by `direction`
    pub fn has_local_edges(&self, lvid: LocalVid, direction: EdgeDirection) -> bool {
        (direction.includes_in() && self.local_in_degree(lvid) > 0)
            || (direction.includes_out() && self.local_out_degree(lvid) > 0)
    }

    /// Machines replicating an owned vertex. Empty for replicas.
    pub fn mirrors(&self, lvid: LocalVid) -> &[Mirror] {
        self.mirrors.get(lvid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct neighbors of an owned vertex, ascending id. Empty for replicas.
    pub fn scope(&self, lvid: LocalVid) -> &[VertexId] {
        if lvid < self.num_owned {
            &self.scope[self.scope_offsets[lvid]..self.scope_offsets[lvid + 1]]
        } else {
            &[]
        }
    }

    pub(crate) fn record(&self, lvid: LocalVid) -> &VertexRecord<V> {
        &self.vertices[lvid]
    }

    pub(crate) fn edge_record(&self, eid: LocalEid) -> &EdgeRecord<E> {
        &self.edges[eid]
    }

    /// Overwrite a vertex's data (replica refresh)
    pub(crate) fn set_data(&self, lvid: LocalVid, data: V) {
        *self.vertices[lvid].data.write() = data;
    }
}

impl<V: Clone, E> LocalGraph<V, E> {
    pub(crate) fn clone_data(&self, lvid: LocalVid) -> V {
        self.vertices[lvid].data.read_recursive().clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 0 -> 1, 0 -> 2, 2 -> 1 on machine 0, where 2 is a replica owned by machine 1
    pub(crate) fn sample() -> LocalGraph<u32, &'static str> {
        let owned = vec![
            OwnedVertex {
                id: VertexId::new(1),
                data: 10,
                num_in: 2,
                num_out: 0,
                mirrors: vec![],
                scope: vec![VertexId::new(0), VertexId::new(2)],
            },
            OwnedVertex {
                id: VertexId::new(0),
                data: 0,
                num_in: 0,
                num_out: 2,
                mirrors: vec![Mirror { machine: 1, num_in: 0, num_out: 0 }],
                scope: vec![VertexId::new(1), VertexId::new(2)],
            },
        ];
        let replicas = vec![ReplicaVertex {
            id: VertexId::new(2),
            owner: 1,
            data: 20,
            num_in: 1,
            num_out: 1,
        }];
        let edges = vec![
            (VertexId::new(2), VertexId::new(1), "c"),
            (VertexId::new(0), VertexId::new(2), "b"),
            (VertexId::new(0), VertexId::new(1), "a"),
        ];
        LocalGraph::build(0, 2, owned, replicas, edges, 3, 3).unwrap()
    }

    #[test]
    fn test_arena_layout() {
        let g = sample();
        assert_eq!(g.num_owned(), 2);
        assert_eq!(g.num_replicas(), 1);
        assert_eq!(g.num_local_edges(), 3);
        assert_eq!(g.lvid(VertexId::new(0)), Some(0));
        assert_eq!(g.lvid(VertexId::new(1)), Some(1));
        assert_eq!(g.lvid(VertexId::new(2)), Some(2));
        assert!(g.is_owned(1));
        assert!(!g.is_owned(2));
        assert_eq!(g.lvid(VertexId::new(9)), None);
    }

    #[test]
    fn test_adjacency_order() {
        let g = sample();
        let out: Vec<_> = g
            .edges(0, EdgeDirection::Out)
            .map(|e| e.target().id().as_u64())
            .collect();
        assert_eq!(out, vec![1, 2]);

        let into_one: Vec<_> = g
            .edges(1, EdgeDirection::In)
            .map(|e| e.source().id().as_u64())
            .collect();
        assert_eq!(into_one, vec![0, 2]);

        assert_eq!(g.edges(2, EdgeDirection::All).len(), 2);
        assert_eq!(g.edges(2, EdgeDirection::None).len(), 0);
        assert!(g.has_local_edges(1, EdgeDirection::In));
        assert!(!g.has_local_edges(1, EdgeDirection::Out));
    }

    #[test]
    fn test_edge_data_and_scope() {
        let g = sample();
        let labels: Vec<&str> = g.local_edges().map(|e| *e.data()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert_eq!(g.scope(0), &[VertexId::new(1), VertexId::new(2)]);
        assert!(g.scope(2).is_empty());
        assert_eq!(g.mirrors(0).len(), 1);
        assert!(g.mirrors(2).is_empty());
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let edges = vec![(VertexId::new(0), VertexId::new(5), ())];
        let owned = vec![OwnedVertex {
            id: VertexId::new(0),
            data: (),
            num_in: 0,
            num_out: 1,
            mirrors: vec![],
            scope: vec![],
        }];
        let result = LocalGraph::build(0, 1, owned, vec![], edges, 1, 1);
        assert_eq!(result.err(), Some(GraphError::MissingVertex(VertexId::new(5))));
    }
}

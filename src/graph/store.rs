//! Distributed graph store
//!
//! Each machine holds a [`DistributedGraph`]: an ingress buffer while the graph
//! is open, and after [`DistributedGraph::finalize`] a shared, read-optimized
//! [`LocalGraph`] shard holding its owned vertices, the edges homed here and
//! replicas of remote edge targets.

use super::finalize::{self, ReplicaData, StoreChannels};
use super::handle::{EdgeRef, VertexRef};
use super::ingress::Ingress;
use super::local::LocalGraph;
use super::partition::{HashPartitioner, Partitioner};
use super::types::VertexId;
use crate::cluster::{CommError, MachineContext, MachineId};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while building or querying the graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Vertex id {0} is reserved")]
    ReservedVertexId(VertexId),

    #[error("Self edge on {0} is not allowed")]
    SelfEdge(VertexId),

    #[error("Duplicate edge {0} -> {1}")]
    DuplicateEdge(VertexId, VertexId),

    #[error("Edge endpoint {0} does not exist")]
    MissingVertex(VertexId),

    #[error("Graph is finalized; structure can no longer change")]
    Finalized,

    #[error("Graph was already finalized")]
    AlreadyFinalized,

    #[error("Graph is not finalized")]
    NotFinalized,

    #[error("Parse error in {file} line {line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Finalize aborted after a failure on machine {machine}")]
    FinalizeAborted { machine: MachineId },

    #[error("Communication error: {0}")]
    Comm(#[from] CommError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// One machine's handle on the distributed graph
pub struct DistributedGraph<V, E> {
    machine: MachineContext,
    partitioner: Arc<dyn Partitioner>,
    ingress: Mutex<Option<Ingress<V, E>>>,
    channels: StoreChannels<V, E>,
    local: Option<Arc<LocalGraph<V, E>>>,
}

impl<V, E> DistributedGraph<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create an open graph using the default hash placement.
    ///
    /// Collective: every machine must create its graphs in the same order.
    pub fn new(machine: &MachineContext) -> GraphResult<Self> {
        Self::with_partitioner(machine, Arc::new(HashPartitioner))
    }

    pub fn with_partitioner(machine: &MachineContext, partitioner: Arc<dyn Partitioner>) -> GraphResult<Self> {
        Ok(Self {
            machine: machine.clone(),
            partitioner,
            ingress: Mutex::new(Some(Ingress::new())),
            channels: StoreChannels::register(machine)?,
            local: None,
        })
    }

    pub fn machine(&self) -> &MachineContext {
        &self.machine
    }

    pub fn partitioner(&self) -> Arc<dyn Partitioner> {
        Arc::clone(&self.partitioner)
    }

    /// Machine owning `id`
    pub fn owner_of(&self, id: VertexId) -> MachineId {
        self.partitioner.owner(id, self.machine.num_machines())
    }

    /// Add a vertex. Re-adding an id overwrites its data.
    pub fn add_vertex(&self, id: VertexId, data: V) -> GraphResult<()> {
        let mut ingress = self.ingress.lock();
        ingress.as_mut().ok_or(GraphError::Finalized)?.add_vertex(id, data)
    }

    /// Add a directed edge. Both endpoints may be added on any machine.
    pub fn add_edge(&self, source: VertexId, target: VertexId, data: E) -> GraphResult<()> {
        let mut ingress = self.ingress.lock();
        ingress
            .as_mut()
            .ok_or(GraphError::Finalized)?
            .add_edge(source, target, data)
    }

    /// Build the distributed structure. Collective; may only run once.
    pub async fn finalize(&mut self) -> GraphResult<()> {
        let ingress = self
            .ingress
            .lock()
            .take()
            .ok_or(GraphError::AlreadyFinalized)?;
        info!(
            "Machine {} finalizing graph ({} vertices, {} edges buffered)",
            self.machine.id(),
            ingress.num_vertices(),
            ingress.num_edges()
        );
        let local = finalize::finalize(&self.machine, self.partitioner.as_ref(), &mut self.channels, ingress).await?;
        self.local = Some(Arc::new(local));
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.local.is_some()
    }

    /// The finalized local shard
    pub fn local(&self) -> GraphResult<&Arc<LocalGraph<V, E>>> {
        self.local.as_ref().ok_or(GraphError::NotFinalized)
    }

    /// Global vertex count
    pub fn num_vertices(&self) -> GraphResult<u64> {
        Ok(self.local()?.num_vertices())
    }

    /// Global edge count
    pub fn num_edges(&self) -> GraphResult<u64> {
        Ok(self.local()?.num_edges())
    }

    /// Copy of a vertex's data if it is owned or replicated here
    pub fn vertex_data(&self, id: VertexId) -> GraphResult<Option<V>> {
        let local = self.local()?;
        Ok(local.lvid(id).map(|lvid| local.clone_data(lvid)))
    }

    /// Map every owned vertex and fold the results across the cluster.
    ///
    /// Collective. Returns `None` when the graph has no vertices.
    pub async fn map_reduce_vertices<R, M, F>(&self, map: M, reduce: F) -> GraphResult<Option<R>>
    where
        R: Clone + Send + 'static,
        M: Fn(VertexRef<'_, V, E>) -> R,
        F: Fn(R, R) -> R,
    {
        let local = self.local()?;
        let partial = local.owned_vertices().map(&map).reduce(&reduce);
        self.combine(partial, reduce).await
    }

    /// Map every edge and fold the results across the cluster. Collective.
    pub async fn map_reduce_edges<R, M, F>(&self, map: M, reduce: F) -> GraphResult<Option<R>>
    where
        R: Clone + Send + 'static,
        M: Fn(EdgeRef<'_, V, E>) -> R,
        F: Fn(R, R) -> R,
    {
        let local = self.local()?;
        let partial = local.local_edges().map(&map).reduce(&reduce);
        self.combine(partial, reduce).await
    }

    async fn combine<R, F>(&self, partial: Option<R>, reduce: F) -> GraphResult<Option<R>>
    where
        R: Clone + Send + 'static,
        F: Fn(R, R) -> R,
    {
        let partials = self.machine.all_gather(partial).await?;
        Ok(partials.into_iter().flatten().reduce(reduce))
    }

    /// Rewrite the data of every owned vertex, then refresh replicas. Collective.
    pub async fn transform_vertices<F>(&mut self, transform: F) -> GraphResult<()>
    where
        F: Fn(VertexId, &mut V) + Send + Sync,
    {
        let local = Arc::clone(self.local()?);
        local.owned_range().into_par_iter().for_each(|lvid| {
            let record = local.record(lvid);
            transform(record.id, &mut record.data.write());
        });
        self.synchronize().await
    }

    /// Push the data of every owned vertex to its mirrors. Collective.
    pub async fn synchronize(&mut self) -> GraphResult<()> {
        let local = Arc::clone(self.local()?);
        let mut outgoing = self.channels.replicas.buffers();
        let mut sent = 0usize;
        for lvid in local.owned_range() {
            let mirrors = local.mirrors(lvid);
            if mirrors.is_empty() {
                continue;
            }
            let record = local.record(lvid);
            for mirror in mirrors {
                outgoing[mirror.machine].push(ReplicaData {
                    id: record.id,
                    data: local.clone_data(lvid),
                    num_in: record.num_in,
                    num_out: record.num_out,
                });
                sent += 1;
            }
        }
        let incoming = self.channels.replicas.exchange(outgoing).await?;
        for replica in incoming.into_iter().flatten() {
            if let Some(lvid) = local.lvid(replica.id) {
                local.set_data(lvid, replica.data);
            }
        }
        debug!("Machine {} synchronized {} replicas", self.machine.id(), sent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::graph::partition::ModuloPartitioner;

    #[tokio::test]
    async fn test_finalize_counts_and_replicas() {
        let cluster = Cluster::new(2).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<u64, ()> =
                    DistributedGraph::with_partitioner(&machine, Arc::new(ModuloPartitioner)).unwrap();
                if machine.id() == 0 {
                    for id in 0..4u64 {
                        graph.add_vertex(VertexId::new(id), id * 10).unwrap();
                    }
                    // 0 -> 1 -> 2 -> 3 -> 0 plus a chord
                    for (s, t) in [(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)] {
                        graph.add_edge(VertexId::new(s), VertexId::new(t), ()).unwrap();
                    }
                }
                graph.finalize().await.unwrap();
                let local = graph.local().unwrap();
                let owned: Vec<u64> = local.owned_vertices().map(|v| v.id().as_u64()).collect();
                let degree_of_2 = graph
                    .local()
                    .unwrap()
                    .vertex_by_id(VertexId::new(2))
                    .map(|v| (v.num_in_edges(), v.num_out_edges()));
                (
                    graph.num_vertices().unwrap(),
                    graph.num_edges().unwrap(),
                    owned,
                    local.num_local_edges(),
                    degree_of_2,
                )
            })
            .await
            .unwrap();

        for r in &results {
            assert_eq!((r.0, r.1), (4, 5));
        }
        assert_eq!(results[0].2, vec![0, 2]);
        assert_eq!(results[1].2, vec![1, 3]);
        // Machine 0 homes 0->1, 0->2, 2->3; machine 1 homes 1->2, 3->0
        assert_eq!(results[0].3, 3);
        assert_eq!(results[1].3, 2);
        // Vertex 2 has in-edges from 0 and 1 and one out-edge, seen alike on owner and replica
        assert_eq!(results[0].4, Some((2, 1)));
        assert_eq!(results[1].4, Some((2, 1)));
    }

    #[tokio::test]
    async fn test_finalize_rejected_twice_and_adds_after() {
        let cluster = Cluster::new(1).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<(), ()> = DistributedGraph::new(&machine).unwrap();
                assert_eq!(graph.num_vertices(), Err(GraphError::NotFinalized));
                graph.add_vertex(VertexId::new(1), ()).unwrap();
                graph.finalize().await.unwrap();
                (
                    graph.finalize().await,
                    graph.add_vertex(VertexId::new(2), ()),
                    graph.num_vertices(),
                )
            })
            .await
            .unwrap();
        assert_eq!(results[0].0, Err(GraphError::AlreadyFinalized));
        assert_eq!(results[0].1, Err(GraphError::Finalized));
        assert_eq!(results[0].2, Ok(1));
    }

    #[tokio::test]
    async fn test_cross_machine_duplicate_fails_everywhere() {
        let cluster = Cluster::new(3).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<(), ()> =
                    DistributedGraph::with_partitioner(&machine, Arc::new(ModuloPartitioner)).unwrap();
                graph.add_vertex(VertexId::new(machine.id() as u64), ()).unwrap();
                if machine.id() != 2 {
                    graph.add_edge(VertexId::new(0), VertexId::new(1), ()).unwrap();
                }
                graph.finalize().await
            })
            .await
            .unwrap();
        let dup = GraphError::DuplicateEdge(VertexId::new(0), VertexId::new(1));
        assert_eq!(results[0], Err(dup));
        assert_eq!(results[1], Err(GraphError::FinalizeAborted { machine: 0 }));
        assert_eq!(results[2], Err(GraphError::FinalizeAborted { machine: 0 }));
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_finalize() {
        let cluster = Cluster::new(2).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<(), ()> =
                    DistributedGraph::with_partitioner(&machine, Arc::new(ModuloPartitioner)).unwrap();
                if machine.id() == 0 {
                    graph.add_vertex(VertexId::new(0), ()).unwrap();
                    graph.add_edge(VertexId::new(0), VertexId::new(7), ()).unwrap();
                }
                graph.finalize().await
            })
            .await
            .unwrap();
        assert_eq!(results[1], Err(GraphError::MissingVertex(VertexId::new(7))));
        assert_eq!(results[0], Err(GraphError::FinalizeAborted { machine: 1 }));
    }

    #[tokio::test]
    async fn test_vertex_merge_prefers_highest_machine() {
        let cluster = Cluster::new(3).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<usize, ()> = DistributedGraph::new(&machine).unwrap();
                graph.add_vertex(VertexId::new(5), machine.id()).unwrap();
                graph.finalize().await.unwrap();
                graph
                    .map_reduce_vertices(|v| *v.data(), |a, b| a.max(b))
                    .await
                    .unwrap()
            })
            .await
            .unwrap();
        assert!(results.iter().all(|r| *r == Some(2)));
    }

    #[tokio::test]
    async fn test_transform_and_synchronize() {
        let cluster = Cluster::new(2).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<u64, u32> =
                    DistributedGraph::with_partitioner(&machine, Arc::new(ModuloPartitioner)).unwrap();
                if machine.id() == 1 {
                    graph.add_vertex(VertexId::new(0), 1).unwrap();
                    graph.add_vertex(VertexId::new(1), 1).unwrap();
                    graph.add_edge(VertexId::new(0), VertexId::new(1), 3).unwrap();
                    graph.add_edge(VertexId::new(1), VertexId::new(0), 4).unwrap();
                }
                graph.finalize().await.unwrap();
                graph.transform_vertices(|id, data| *data = id.as_u64() + 100).await.unwrap();
                let seen_zero = graph.vertex_data(VertexId::new(0)).unwrap();
                let seen_one = graph.vertex_data(VertexId::new(1)).unwrap();
                let edge_sum = graph
                    .map_reduce_edges(|e| *e.data(), |a, b| a + b)
                    .await
                    .unwrap();
                (seen_zero, seen_one, edge_sum)
            })
            .await
            .unwrap();
        for r in &results {
            assert_eq!((r.0, r.1, r.2), (Some(100), Some(101), Some(7)));
        }
    }
}

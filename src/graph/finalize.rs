//! One-time collective build of the distributed graph
//!
//! Placement is an edge cut: every edge is homed on the owner of its source,
//! and its target is replicated there when owned elsewhere. The owner of a
//! vertex therefore learns its out-degree locally and its in-degree, mirror set
//! and full neighbor set from the replica requests of other machines.
//!
//! Every machine takes part in every exchange even after a local validation
//! failure, so that a malformed graph fails finalize everywhere instead of
//! leaving peers waiting.

use super::ingress::Ingress;
use super::local::{LocalGraph, Mirror, OwnedVertex, ReplicaVertex};
use super::partition::Partitioner;
use super::store::{GraphError, GraphResult};
use super::types::VertexId;
use crate::cluster::{CommResult, Exchange, MachineContext, MachineId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Ingress records shuffled to their owners
pub(crate) enum Shuffle<V, E> {
    Vertex(VertexId, V),
    Edge(VertexId, VertexId, E),
}

/// Owner-to-mirror copy of a vertex
pub(crate) struct ReplicaData<V> {
    pub(crate) id: VertexId,
    pub(crate) data: V,
    pub(crate) num_in: usize,
    pub(crate) num_out: usize,
}

/// Channels owned by the graph store, registered in a fixed order
pub(crate) struct StoreChannels<V, E> {
    pub(crate) shuffle: Exchange<Shuffle<V, E>>,
    /// (target, source) pairs sent to the target's owner
    pub(crate) requests: Exchange<(VertexId, VertexId)>,
    pub(crate) replicas: Exchange<ReplicaData<V>>,
}

impl<V, E> StoreChannels<V, E>
where
    V: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn register(machine: &MachineContext) -> CommResult<Self> {
        Ok(Self {
            shuffle: machine.exchange()?,
            requests: machine.exchange()?,
            replicas: machine.exchange()?,
        })
    }
}

#[derive(Default)]
struct OwnerState {
    num_in: usize,
    num_out: usize,
    /// machine -> number of in-edges it stores
    mirrors: BTreeMap<MachineId, usize>,
    scope: Vec<VertexId>,
}

fn note(slot: &mut Option<GraphError>, err: GraphError) {
    warn!("Finalize validation failed: {}", err);
    if slot.is_none() {
        *slot = Some(err);
    }
}

pub(crate) async fn finalize<V, E>(
    machine: &MachineContext,
    partitioner: &dyn Partitioner,
    channels: &mut StoreChannels<V, E>,
    ingress: Ingress<V, E>,
) -> GraphResult<LocalGraph<V, E>>
where
    V: Clone + Send + 'static,
    E: Send + 'static,
{
    let me = machine.id();
    let num_machines = machine.num_machines();
    let owner = |id: VertexId| partitioner.owner(id, num_machines);
    let mut failure: Option<GraphError> = None;

    // 1. Shuffle vertices to their owner and edges to the owner of their source
    let (vertices, edges) = ingress.into_parts();
    debug!(
        "Machine {} shuffling {} vertices and {} edges",
        me,
        vertices.len(),
        edges.len()
    );
    let mut outgoing = channels.shuffle.buffers();
    for (id, data) in vertices {
        outgoing[owner(id)].push(Shuffle::Vertex(id, data));
    }
    for (source, target, data) in edges {
        outgoing[owner(source)].push(Shuffle::Edge(source, target, data));
    }
    let incoming = channels.shuffle.exchange(outgoing).await?;

    // 2. Merge vertices (highest origin machine wins) and validate edges
    let mut owned: FxHashMap<VertexId, V> = FxHashMap::default();
    let mut edges: Vec<(VertexId, VertexId, E)> = Vec::new();
    let mut seen: FxHashSet<(VertexId, VertexId)> = FxHashSet::default();
    for batch in incoming {
        for record in batch {
            match record {
                Shuffle::Vertex(id, data) => {
                    owned.insert(id, data);
                }
                Shuffle::Edge(source, target, data) => {
                    if seen.insert((source, target)) {
                        edges.push((source, target, data));
                    } else {
                        note(&mut failure, GraphError::DuplicateEdge(source, target));
                    }
                }
            }
        }
    }
    edges.retain(|(source, _, _)| {
        let exists = owned.contains_key(source);
        if !exists {
            note(&mut failure, GraphError::MissingVertex(*source));
        }
        exists
    });

    // 3. Replica requests: each remote target learns who points at it
    let mut state: FxHashMap<VertexId, OwnerState> = owned
        .keys()
        .map(|&id| (id, OwnerState::default()))
        .collect();
    let mut requests = channels.requests.buffers();
    for (source, target, _) in &edges {
        if let Some(s) = state.get_mut(source) {
            s.num_out += 1;
            s.scope.push(*target);
        }
        let target_owner = owner(*target);
        if target_owner == me {
            match state.get_mut(target) {
                Some(t) => {
                    t.num_in += 1;
                    t.scope.push(*source);
                }
                None => note(&mut failure, GraphError::MissingVertex(*target)),
            }
        } else {
            requests[target_owner].push((*target, *source));
        }
    }
    let incoming = channels.requests.exchange(requests).await?;
    for (from, batch) in incoming.into_iter().enumerate() {
        for (target, source) in batch {
            match state.get_mut(&target) {
                Some(t) => {
                    t.num_in += 1;
                    t.scope.push(source);
                    *t.mirrors.entry(from).or_insert(0) += 1;
                }
                None => note(&mut failure, GraphError::MissingVertex(target)),
            }
        }
    }

    // 4. Owners seed their mirrors with data and global degrees
    let mut seeds = channels.replicas.buffers();
    for (id, s) in &state {
        for &mirror in s.mirrors.keys() {
            if let Some(data) = owned.get(id) {
                seeds[mirror].push(ReplicaData {
                    id: *id,
                    data: data.clone(),
                    num_in: s.num_in,
                    num_out: s.num_out,
                });
            }
        }
    }
    let incoming = channels.replicas.exchange(seeds).await?;
    let replicas: Vec<ReplicaVertex<V>> = incoming
        .into_iter()
        .enumerate()
        .flat_map(|(from, batch)| {
            batch.into_iter().map(move |r| ReplicaVertex {
                id: r.id,
                owner: from,
                data: r.data,
                num_in: r.num_in,
                num_out: r.num_out,
            })
        })
        .collect();

    // 5. Agree on success and global counts before exposing anything
    let report = (failure.is_some(), owned.len() as u64, edges.len() as u64);
    let reports = machine.all_gather(report).await?;
    if let Some(failed) = reports.iter().position(|r| r.0) {
        return Err(failure.unwrap_or(GraphError::FinalizeAborted { machine: failed }));
    }
    let num_vertices: u64 = reports.iter().map(|r| r.1).sum();
    let num_edges: u64 = reports.iter().map(|r| r.2).sum();

    // 6. Build the local arena
    let owned: Vec<OwnedVertex<V>> = owned
        .into_iter()
        .map(|(id, data)| {
            let s = state.remove(&id).unwrap_or_default();
            let mut scope = s.scope;
            scope.sort_unstable();
            scope.dedup();
            OwnedVertex {
                id,
                data,
                num_in: s.num_in,
                num_out: s.num_out,
                mirrors: s
                    .mirrors
                    .into_iter()
                    .map(|(machine, num_in)| Mirror {
                        machine,
                        num_in,
                        num_out: 0,
                    })
                    .collect(),
                scope,
            }
        })
        .collect();

    let local = LocalGraph::build(me, num_machines, owned, replicas, edges, num_vertices, num_edges)?;
    info!(
        "Machine {} finalized: {} owned, {} replicas, {} edges ({} vertices / {} edges global)",
        me,
        local.num_owned(),
        local.num_replicas(),
        local.num_local_edges(),
        num_vertices,
        num_edges
    );
    Ok(local)
}

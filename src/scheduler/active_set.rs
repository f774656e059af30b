//! Distributed active set: local scheduling plus routing of remote signals

use super::message::Message;
use super::queue::Scheduler;
use super::SchedulerKind;
use crate::cluster::MachineId;
use crate::graph::{LocalGraph, LocalVid, Partitioner, VertexId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::warn;

/// Resolves vertex ids against one machine's shard
pub trait VertexIndex: Send + Sync {
    fn machine(&self) -> MachineId;

    fn num_machines(&self) -> usize;

    /// Local index of `id` if this machine owns it
    fn owned_lvid(&self, id: VertexId) -> Option<LocalVid>;

    fn num_owned(&self) -> usize;

    fn vertex_id(&self, lvid: LocalVid) -> VertexId;
}

impl<V, E> VertexIndex for LocalGraph<V, E>
where
    V: Send + Sync,
    E: Send + Sync,
{
    fn machine(&self) -> MachineId {
        LocalGraph::machine(self)
    }

    fn num_machines(&self) -> usize {
        LocalGraph::num_machines(self)
    }

    fn owned_lvid(&self, id: VertexId) -> Option<LocalVid> {
        self.lvid(id).filter(|&lvid| self.is_owned(lvid))
    }

    fn num_owned(&self) -> usize {
        LocalGraph::num_owned(self)
    }

    fn vertex_id(&self, lvid: LocalVid) -> VertexId {
        self.record(lvid).id
    }
}

/// A machine's view of the distributed scheduler.
///
/// Signals for owned vertices go straight into the local queue. Signals for
/// vertices owned elsewhere are coalesced per target machine until the
/// engine ships them with [`ActiveSet::take_remote`].
pub struct ActiveSet<M: Message> {
    index: Arc<dyn VertexIndex>,
    partitioner: Arc<dyn Partitioner>,
    queue: Box<dyn Scheduler<M>>,
    remote: Mutex<Vec<FxHashMap<VertexId, M>>>,
}

impl<M: Message> ActiveSet<M> {
    pub fn new(index: Arc<dyn VertexIndex>, partitioner: Arc<dyn Partitioner>, kind: SchedulerKind) -> Self {
        let remote = (0..index.num_machines()).map(|_| FxHashMap::default()).collect();
        Self {
            index,
            partitioner,
            queue: kind.build(),
            remote: Mutex::new(remote),
        }
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.queue.name()
    }

    /// Schedule `vertex`, wherever it is owned
    pub fn signal(&self, vertex: VertexId, message: M) {
        let owner = self.partitioner.owner(vertex, self.index.num_machines());
        if owner == self.index.machine() {
            self.deliver(vertex, message);
            return;
        }
        let mut remote = self.remote.lock();
        let pending = &mut remote[owner];
        match pending.get_mut(&vertex) {
            Some(existing) => existing.merge(message),
            None => {
                pending.insert(vertex, message);
            }
        }
    }

    /// Schedule a locally owned vertex, e.g. one signaled by a peer.
    /// Signals for unknown vertices are dropped.
    pub fn deliver(&self, vertex: VertexId, message: M) -> bool {
        match self.index.owned_lvid(vertex) {
            Some(lvid) => self.queue.schedule(lvid, message),
            None => {
                warn!(
                    "Machine {} dropping signal for unknown vertex {}",
                    self.index.machine(),
                    vertex
                );
                false
            }
        }
    }

    /// Schedule every owned vertex
    pub fn signal_all(&self, message: M) {
        for lvid in 0..self.index.num_owned() {
            self.queue.schedule(lvid, message.clone());
        }
    }

    /// Take the buffered signals for other machines, indexed by target machine
    pub fn take_remote(&self) -> Vec<Vec<(VertexId, M)>> {
        let mut remote = self.remote.lock();
        remote
            .iter_mut()
            .map(|pending| pending.drain().collect())
            .collect()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.lock().iter().any(|pending| !pending.is_empty())
    }

    pub fn pop(&self) -> Option<(LocalVid, M)> {
        self.queue.pop()
    }

    pub fn drain(&self) -> Vec<(LocalVid, M)> {
        self.queue.drain()
    }

    /// Pending local vertices
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&self) {
        self.queue.drain();
        for pending in self.remote.lock().iter_mut() {
            pending.clear();
        }
    }
}

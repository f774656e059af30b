//! Distributed lock acquisition and release

use super::lock_table::LockTable;
use super::{ConsistencyError, ConsistencyResult, LockMode};
use crate::cluster::MachineId;
use crate::graph::{Partitioner, VertexId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

/// Who is waiting on a queued lock
#[derive(Debug)]
pub enum Waiter {
    /// An activation on this machine
    Local(oneshot::Sender<()>),
    /// A request from another machine, answered with a grant message
    Remote { machine: MachineId, request: u64 },
}

/// Lock messages the manager needs the engine to send
#[async_trait]
pub trait LockTransport: Send + Sync {
    /// Request a lock from its owner and wait for the grant
    async fn lock_remote(&self, owner: MachineId, vertex: VertexId, mode: LockMode) -> ConsistencyResult<()>;

    fn unlock_remote(&self, owner: MachineId, vertex: VertexId, mode: LockMode) -> ConsistencyResult<()>;

    /// Tell `machine` that its request `request` now holds the lock
    fn grant_remote(&self, machine: MachineId, request: u64) -> ConsistencyResult<()>;
}

/// One machine's share of the distributed lock service
pub struct ConsistencyManager {
    machine: MachineId,
    num_machines: usize,
    partitioner: Arc<dyn Partitioner>,
    table: Mutex<LockTable<Waiter>>,
}

impl ConsistencyManager {
    pub fn new(machine: MachineId, num_machines: usize, partitioner: Arc<dyn Partitioner>) -> Self {
        Self {
            machine,
            num_machines,
            partitioner,
            table: Mutex::new(LockTable::new()),
        }
    }

    fn owner(&self, vertex: VertexId) -> MachineId {
        self.partitioner.owner(vertex, self.num_machines)
    }

    /// Acquire every lock of `plan`, in order. On failure the locks already
    /// taken are released.
    pub async fn acquire(
        &self,
        plan: &[(VertexId, LockMode)],
        transport: &dyn LockTransport,
    ) -> ConsistencyResult<()> {
        for (taken, &(vertex, mode)) in plan.iter().enumerate() {
            let owner = self.owner(vertex);
            let result = if owner == self.machine {
                self.lock_local(vertex, mode).await
            } else {
                transport.lock_remote(owner, vertex, mode).await
            };
            if let Err(e) = result {
                self.release(&plan[..taken], transport)?;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn lock_local(&self, vertex: VertexId, mode: LockMode) -> ConsistencyResult<()> {
        let (tx, rx) = oneshot::channel();
        let granted = self.table.lock().acquire(vertex, mode, Waiter::Local(tx)).is_some();
        if granted {
            return Ok(());
        }
        trace!("Machine {} waiting for {:?} lock on {}", self.machine, mode, vertex);
        rx.await.map_err(|_| ConsistencyError::Abandoned(vertex))
    }

    /// Release every lock of `plan`
    pub fn release(&self, plan: &[(VertexId, LockMode)], transport: &dyn LockTransport) -> ConsistencyResult<()> {
        for &(vertex, mode) in plan.iter().rev() {
            let owner = self.owner(vertex);
            if owner == self.machine {
                self.unlock(vertex, mode, transport)?;
            } else {
                transport.unlock_remote(owner, vertex, mode)?;
            }
        }
        Ok(())
    }

    /// Queue or grant a lock request from another machine
    pub fn handle_request(
        &self,
        from: MachineId,
        request: u64,
        vertex: VertexId,
        mode: LockMode,
        transport: &dyn LockTransport,
    ) -> ConsistencyResult<()> {
        let waiter = Waiter::Remote { machine: from, request };
        let granted = self.table.lock().acquire(vertex, mode, waiter).is_some();
        if granted {
            transport.grant_remote(from, request)?;
        }
        Ok(())
    }

    /// Release a lock on an owned vertex and hand it to the next waiters
    pub fn unlock(&self, vertex: VertexId, mode: LockMode, transport: &dyn LockTransport) -> ConsistencyResult<()> {
        let mut pending = vec![(vertex, mode)];
        while let Some((vertex, mode)) = pending.pop() {
            let woken = self.table.lock().release(vertex, mode);
            for waiter in woken {
                match waiter {
                    Waiter::Local(tx) => {
                        // The waiting activation is gone; pass the lock on
                        if tx.send(()).is_err() {
                            pending.push((vertex, mode));
                        }
                    }
                    Waiter::Remote { machine, request } => transport.grant_remote(machine, request)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::{lock_plan, ConsistencyModel};
    use crate::graph::ModuloPartitioner;
    use std::time::Duration;

    /// Single-machine transport: never asked to send anything
    struct Loopback;

    #[async_trait]
    impl LockTransport for Loopback {
        async fn lock_remote(&self, _owner: MachineId, vertex: VertexId, _mode: LockMode) -> ConsistencyResult<()> {
            Err(ConsistencyError::Abandoned(vertex))
        }

        fn unlock_remote(&self, _owner: MachineId, _vertex: VertexId, _mode: LockMode) -> ConsistencyResult<()> {
            Ok(())
        }

        fn grant_remote(&self, _machine: MachineId, _request: u64) -> ConsistencyResult<()> {
            Ok(())
        }
    }

    /// Records grants sent to other machines
    #[derive(Default)]
    struct Recorder {
        grants: Mutex<Vec<(MachineId, u64)>>,
    }

    #[async_trait]
    impl LockTransport for Recorder {
        async fn lock_remote(&self, _owner: MachineId, vertex: VertexId, _mode: LockMode) -> ConsistencyResult<()> {
            Err(ConsistencyError::Abandoned(vertex))
        }

        fn unlock_remote(&self, _owner: MachineId, _vertex: VertexId, _mode: LockMode) -> ConsistencyResult<()> {
            Ok(())
        }

        fn grant_remote(&self, machine: MachineId, request: u64) -> ConsistencyResult<()> {
            self.grants.lock().push((machine, request));
            Ok(())
        }
    }

    fn manager() -> Arc<ConsistencyManager> {
        Arc::new(ConsistencyManager::new(0, 1, Arc::new(ModuloPartitioner)))
    }

    #[tokio::test]
    async fn test_contended_write_waits_for_release() {
        let manager = manager();
        let scope = [VertexId::new(2)];
        let plan = lock_plan(ConsistencyModel::Full, VertexId::new(1), &scope);
        manager.acquire(&plan, &Loopback).await.unwrap();

        let other = Arc::clone(&manager);
        let waiter = tokio::spawn(async move {
            let plan = lock_plan(ConsistencyModel::Full, VertexId::new(2), &[VertexId::new(1)]);
            other.acquire(&plan, &Loopback).await.unwrap();
            other.release(&plan, &Loopback).unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        manager.release(&plan, &Loopback).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.table.lock().num_locked(), 0);
    }

    #[tokio::test]
    async fn test_edge_consistency_shares_neighbors() {
        let manager = manager();
        let a = lock_plan(ConsistencyModel::Edge, VertexId::new(1), &[VertexId::new(3)]);
        let b = lock_plan(ConsistencyModel::Edge, VertexId::new(2), &[VertexId::new(3)]);
        manager.acquire(&a, &Loopback).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), manager.acquire(&b, &Loopback))
            .await
            .unwrap()
            .unwrap();
        manager.release(&a, &Loopback).unwrap();
        manager.release(&b, &Loopback).unwrap();
    }

    #[tokio::test]
    async fn test_remote_requests_granted_in_order() {
        let manager = manager();
        let recorder = Recorder::default();
        let v = VertexId::new(4);

        manager.handle_request(1, 10, v, LockMode::Write, &recorder).unwrap();
        manager.handle_request(2, 20, v, LockMode::Read, &recorder).unwrap();
        manager.handle_request(3, 30, v, LockMode::Read, &recorder).unwrap();
        assert_eq!(*recorder.grants.lock(), vec![(1, 10)]);

        manager.unlock(v, LockMode::Write, &recorder).unwrap();
        assert_eq!(*recorder.grants.lock(), vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[tokio::test]
    async fn test_abandoned_local_waiter_passes_lock_on() {
        let manager = manager();
        let recorder = Recorder::default();
        let v = VertexId::new(6);
        let plan = [(v, LockMode::Write)];
        manager.acquire(&plan, &recorder).await.unwrap();

        // A local waiter that gives up before the grant
        let other = Arc::clone(&manager);
        let abandoned = tokio::spawn(async move {
            let plan = [(VertexId::new(6), LockMode::Write)];
            other.acquire(&plan, &Loopback).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;

        manager.handle_request(1, 7, v, LockMode::Write, &recorder).unwrap();
        manager.release(&plan, &recorder).unwrap();
        assert_eq!(*recorder.grants.lock(), vec![(1, 7)]);
    }
}

//! Cluster membership and per-machine handles

use super::exchange::{Batch, Exchange};
use super::network::{ChannelSet, Endpoint};
use super::{Collective, CommError, CommResult, MachineId};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use rustc_hash::FxHashMap;
use tokio::task::{self, JoinSet};
use tracing::{error, info};

/// State shared by every machine of one cluster run
struct ClusterShared {
    num_machines: usize,
    /// Typed channel sets, indexed by registration order
    channels: Mutex<Vec<Box<dyn Any + Send>>>,
    collective: Collective,
}

/// A simulated cluster of machines running the same program (SPMD).
#[derive(Debug, Clone)]
pub struct Cluster {
    num_machines: usize,
}

impl Cluster {
    /// Create a cluster of `num_machines` machines
    pub fn new(num_machines: usize) -> CommResult<Self> {
        if num_machines == 0 {
            return Err(CommError::InvalidClusterSize(num_machines));
        }
        Ok(Self { num_machines })
    }

    pub fn num_machines(&self) -> usize {
        self.num_machines
    }

    /// Run `program` on every machine concurrently and collect the results,
    /// indexed by machine id.
    ///
    /// If any machine panics the remaining machines are aborted.
    pub async fn run<F, Fut, T>(&self, program: F) -> CommResult<Vec<T>>
    where
        F: Fn(MachineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        info!("Starting cluster of {} machines", self.num_machines);

        let shared = Arc::new(ClusterShared {
            num_machines: self.num_machines,
            channels: Mutex::new(Vec::new()),
            collective: Collective::new(self.num_machines),
        });

        let program = Arc::new(program);
        let mut tasks = JoinSet::new();
        let mut machine_of: FxHashMap<task::Id, MachineId> = FxHashMap::default();
        for id in 0..self.num_machines {
            let context = MachineContext {
                id,
                shared: Arc::clone(&shared),
                next_channel: Arc::new(AtomicUsize::new(0)),
            };
            let program = Arc::clone(&program);
            let handle = tasks.spawn(async move { (id, program(context).await) });
            machine_of.insert(handle.id(), id);
        }

        let mut results: Vec<Option<T>> = (0..self.num_machines).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, value)) => results[id] = Some(value),
                Err(e) => {
                    error!("Machine task failed: {}", e);
                    tasks.abort_all();
                    let machine = machine_of.get(&e.id()).copied().unwrap_or(0);
                    return Err(CommError::MachineFailed {
                        machine,
                        reason: e.to_string(),
                    });
                }
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(machine, value)| {
                value.ok_or(CommError::MachineFailed {
                    machine,
                    reason: "no result".to_string(),
                })
            })
            .collect()
    }
}

/// Handle to the cluster from inside one machine.
///
/// Distributed objects register their channels through [`MachineContext::endpoint`].
/// Registration is matched across machines by order, so every machine must
/// construct its distributed objects in the same sequence.
#[derive(Clone)]
pub struct MachineContext {
    id: MachineId,
    shared: Arc<ClusterShared>,
    next_channel: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MachineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineContext")
            .field("id", &self.id)
            .field("num_machines", &self.shared.num_machines)
            .finish()
    }
}

impl MachineContext {
    /// This machine's id
    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn num_machines(&self) -> usize {
        self.shared.num_machines
    }

    /// Register the next typed point-to-point channel
    pub fn endpoint<M: Send + 'static>(&self) -> CommResult<Endpoint<M>> {
        let index = self.next_channel.fetch_add(1, Ordering::SeqCst);
        let mut channels = self.shared.channels.lock();
        if channels.len() == index {
            channels.push(Box::new(ChannelSet::<M>::new(self.shared.num_machines)));
        }
        channels
            .get_mut(index)
            .and_then(|set| set.downcast_mut::<ChannelSet<M>>())
            .and_then(|set| set.take(self.id))
            .ok_or(CommError::ChannelMismatch { index })
    }

    /// Register the next all-to-all exchange channel
    pub fn exchange<T: Send + 'static>(&self) -> CommResult<Exchange<T>> {
        let endpoint: Endpoint<Batch<T>> = self.endpoint()?;
        Ok(Exchange::new(endpoint))
    }

    pub fn collective(&self) -> &Collective {
        &self.shared.collective
    }

    pub async fn barrier(&self) {
        self.shared.collective.barrier().await;
    }

    pub async fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> CommResult<Vec<T>> {
        self.shared.collective.all_gather(self.id, value).await
    }

    pub async fn all_reduce<T, F>(&self, value: T, op: F) -> CommResult<T>
    where
        T: Clone + Send + 'static,
        F: Fn(T, T) -> T,
    {
        self.shared.collective.all_reduce(self.id, value, op).await
    }

    /// Sum of `value` over all machines
    pub async fn all_sum(&self, value: u64) -> CommResult<u64> {
        self.all_reduce(value, |a, b| a + b).await
    }

    /// True if `flag` is set on any machine
    pub async fn any(&self, flag: bool) -> CommResult<bool> {
        self.all_reduce(flag, |a, b| a || b).await
    }
}

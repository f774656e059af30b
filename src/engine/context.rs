//! Per-call context handed to vertex programs

use crate::cluster::MachineId;
use crate::graph::VertexId;
use crate::scheduler::{ActiveSet, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Where `Context::signal` sends its signals
pub trait SignalSink<M>: Send + Sync {
    fn signal(&self, vertex: VertexId, message: M);
}

impl<M: Message> SignalSink<M> for ActiveSet<M> {
    fn signal(&self, vertex: VertexId, message: M) {
        ActiveSet::signal(self, vertex, message);
    }
}

/// Run-wide facts visible to programs
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub machine: MachineId,
    pub num_machines: usize,
    /// Completed rounds (synchronous engine); 0 for the asynchronous engine
    pub iteration: usize,
    pub num_vertices: u64,
    pub num_edges: u64,
    pub started: Instant,
}

/// Requests an engine to stop. Cloneable and shareable across tasks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a handled stop request. Engines call this when a run returns,
    /// so a stop issued before `start` still ends that run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves after [`StopHandle::stop`] has been called
    pub async fn stopped(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}

pub struct Context<'a, M> {
    info: &'a RunInfo,
    sink: &'a dyn SignalSink<M>,
    stop: &'a StopHandle,
}

impl<'a, M> Context<'a, M> {
    pub fn new(info: &'a RunInfo, sink: &'a dyn SignalSink<M>, stop: &'a StopHandle) -> Self {
        Self { info, sink, stop }
    }

    /// Schedule `vertex` with `message`, merged into any pending signal
    pub fn signal(&self, vertex: VertexId, message: M) {
        self.sink.signal(vertex, message);
    }

    /// Ask the engine to stop at the next activation or round boundary
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn iteration(&self) -> usize {
        self.info.iteration
    }

    /// This machine's id
    pub fn procid(&self) -> MachineId {
        self.info.machine
    }

    pub fn num_procs(&self) -> usize {
        self.info.num_machines
    }

    pub fn num_vertices(&self) -> u64 {
        self.info.num_vertices
    }

    pub fn num_edges(&self) -> u64 {
        self.info.num_edges
    }

    pub fn elapsed(&self) -> Duration {
        self.info.started.elapsed()
    }
}

//! Synchronous (bulk-synchronous) engine
//!
//! Each round runs over a snapshot of the active set:
//!
//! 1. agreement: every machine reports pending work and stop requests
//! 2. `init` + `gather_edges` on owners; activation requests to mirrors holding gather edges
//! 3. partial gathers on owners and mirrors (rayon), partials sent back to owners
//! 4. `apply` + `scatter_edges` on owners
//! 5. new data, program and scatter direction propagated to every mirror
//! 6. scatter on owners and mirrors; signals buffered for the next round
//! 7. signal exchange
//!
//! Each exchange doubles as a barrier, so no machine starts a phase before
//! every machine has finished the previous one.

use super::context::{Context, RunInfo, StopHandle};
use super::executor;
use super::program::VertexProgram;
use super::{agree_on_failure, Engine, EngineError, EngineResult, RunSummary, TerminationReason};
use crate::cluster::{Exchange, MachineContext, MachineId};
use crate::config::EngineConfig;
use crate::graph::{DistributedGraph, EdgeDirection, LocalGraph, LocalVid, VertexId};
use crate::scheduler::{ActiveSet, VertexIndex};
use async_trait::async_trait;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where the engine is in its round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Gather,
    Apply,
    Scatter,
    Barrier,
    Terminated,
}

/// Owner-to-mirror propagation after apply
struct Update<P: VertexProgram> {
    vertex: VertexId,
    data: P::VertexData,
    program: P,
    direction: EdgeDirection,
}

struct SyncChannels<P: VertexProgram> {
    signals: Exchange<(VertexId, P::Message)>,
    activations: Exchange<(VertexId, P, EdgeDirection)>,
    partials: Exchange<(VertexId, P::Gather)>,
    updates: Exchange<Update<P>>,
}

/// One owned vertex moving through a round
struct Activation<P: VertexProgram> {
    lvid: LocalVid,
    program: P,
    gather: EdgeDirection,
    total: Option<P::Gather>,
    scatter: EdgeDirection,
    applied: bool,
}

struct RoundOutcome {
    updates: u64,
    failure: Option<EngineError>,
}

fn note(failure: &mut Option<EngineError>, err: EngineError) {
    error!("{}", err);
    if failure.is_none() {
        *failure = Some(err);
    }
}

pub struct SynchronousEngine<P: VertexProgram> {
    machine: MachineContext,
    graph: Arc<LocalGraph<P::VertexData, P::EdgeData>>,
    prototype: P,
    config: EngineConfig,
    active: Arc<ActiveSet<P::Message>>,
    channels: SyncChannels<P>,
    stop: StopHandle,
    state: SyncState,
    iteration: usize,
}

impl<P: VertexProgram> SynchronousEngine<P> {
    /// Create an engine over a finalized graph. Collective: every machine
    /// must create its engines in the same order.
    pub fn new(
        graph: &DistributedGraph<P::VertexData, P::EdgeData>,
        prototype: P,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let local = Arc::clone(graph.local()?);
        let machine = graph.machine().clone();
        let index: Arc<dyn VertexIndex> = local.clone();
        let active = Arc::new(ActiveSet::new(index, graph.partitioner(), config.scheduler));
        let channels = SyncChannels {
            signals: machine.exchange()?,
            activations: machine.exchange()?,
            partials: machine.exchange()?,
            updates: machine.exchange()?,
        };
        Ok(Self {
            machine,
            graph: local,
            prototype,
            config,
            active,
            channels,
            stop: StopHandle::new(),
            state: SyncState::Idle,
            iteration: 0,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Rounds completed in the current or last run
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Pending local vertices
    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    async fn exchange_signals(&mut self) -> EngineResult<()> {
        let outgoing = self.active.take_remote();
        let incoming = self.channels.signals.exchange(outgoing).await?;
        for (vertex, message) in incoming.into_iter().flatten() {
            self.active.deliver(vertex, message);
        }
        Ok(())
    }

    async fn run_round(&mut self, info: &RunInfo) -> EngineResult<RoundOutcome> {
        let graph = Arc::clone(&self.graph);
        let active_set = Arc::clone(&self.active);
        let stop = self.stop.clone();
        let ctx = Context::new(info, active_set.as_ref(), &stop);
        let mut failure = None;

        // Gather
        self.state = SyncState::Gather;
        let snapshot = self.active.drain();
        let mut running: Vec<Activation<P>> = Vec::with_capacity(snapshot.len());
        for (lvid, message) in snapshot {
            let mut program = self.prototype.clone();
            match executor::begin(&mut program, &ctx, &graph, lvid, message) {
                Ok(gather) => running.push(Activation {
                    lvid,
                    program,
                    gather,
                    total: None,
                    scatter: EdgeDirection::None,
                    applied: false,
                }),
                Err(e) => note(&mut failure, e),
            }
        }

        let mut requests = self.channels.activations.buffers();
        for a in &running {
            if a.gather.is_none() {
                continue;
            }
            let id = graph.vertex(a.lvid).id();
            for mirror in graph.mirrors(a.lvid) {
                if mirror.has_edges(a.gather) {
                    requests[mirror.machine].push((id, a.program.clone(), a.gather));
                }
            }
        }
        let incoming = self.channels.activations.exchange(requests).await?;
        let mut remote: Vec<(MachineId, VertexId, LocalVid, P, EdgeDirection)> = Vec::new();
        for (from, batch) in incoming.into_iter().enumerate() {
            for (vertex, program, direction) in batch {
                match graph.lvid(vertex) {
                    Some(lvid) => remote.push((from, vertex, lvid, program, direction)),
                    None => warn!("Machine {} has no replica of {}", info.machine, vertex),
                }
            }
        }

        let partials: Vec<(MachineId, VertexId, EngineResult<Option<P::Gather>>)> = remote
            .par_iter()
            .map(|(from, vertex, lvid, program, direction)| {
                let result = executor::gather_local(program, &ctx, &graph, *lvid, *direction);
                (*from, *vertex, result)
            })
            .collect();
        let local_errors: Vec<EngineError> = running
            .par_iter_mut()
            .filter(|a| !a.gather.is_none())
            .filter_map(|a| match executor::gather_local(&a.program, &ctx, &graph, a.lvid, a.gather) {
                Ok(total) => {
                    a.total = total;
                    None
                }
                Err(e) => Some(e),
            })
            .collect();
        for e in local_errors {
            note(&mut failure, e);
        }

        let mut replies = self.channels.partials.buffers();
        for (from, vertex, result) in partials {
            match result {
                Ok(Some(total)) => replies[from].push((vertex, total)),
                Ok(None) => {}
                Err(e) => note(&mut failure, e),
            }
        }
        let incoming = self.channels.partials.exchange(replies).await?;
        let position: FxHashMap<LocalVid, usize> = running.iter().enumerate().map(|(i, a)| (a.lvid, i)).collect();
        for (vertex, total) in incoming.into_iter().flatten() {
            let slot = graph.lvid(vertex).and_then(|lvid| position.get(&lvid));
            match slot {
                Some(&i) => executor::combine(&mut running[i].total, Some(total)),
                None => warn!("Machine {} received a partial for inactive {}", info.machine, vertex),
            }
        }

        // Apply
        self.state = SyncState::Apply;
        let apply_errors: Vec<EngineError> = running
            .par_iter_mut()
            .filter_map(|a| {
                let total = a.total.take();
                match executor::apply(&mut a.program, &ctx, &graph, a.lvid, total) {
                    Ok(direction) => {
                        a.scatter = direction;
                        a.applied = true;
                        None
                    }
                    Err(e) => Some(e),
                }
            })
            .collect();
        for e in apply_errors {
            note(&mut failure, e);
        }

        // Propagate to every mirror before anyone reads it again
        let mut outgoing = self.channels.updates.buffers();
        for a in running.iter().filter(|a| a.applied) {
            let mirrors = graph.mirrors(a.lvid);
            if mirrors.is_empty() {
                continue;
            }
            let id = graph.vertex(a.lvid).id();
            let data = graph.clone_data(a.lvid);
            for mirror in mirrors {
                outgoing[mirror.machine].push(Update {
                    vertex: id,
                    data: data.clone(),
                    program: a.program.clone(),
                    direction: a.scatter,
                });
            }
        }
        let incoming = self.channels.updates.exchange(outgoing).await?;
        let mut mirror_scatters: Vec<(LocalVid, P, EdgeDirection)> = Vec::new();
        for update in incoming.into_iter().flatten() {
            match graph.lvid(update.vertex) {
                Some(lvid) => {
                    graph.set_data(lvid, update.data);
                    if graph.has_local_edges(lvid, update.direction) {
                        mirror_scatters.push((lvid, update.program, update.direction));
                    }
                }
                None => warn!("Machine {} has no replica of {}", info.machine, update.vertex),
            }
        }

        // Scatter
        self.state = SyncState::Scatter;
        let owner_errors: Vec<EngineError> = running
            .par_iter()
            .filter(|a| a.applied && !a.scatter.is_none())
            .filter_map(|a| executor::scatter_local(&a.program, &ctx, &graph, a.lvid, a.scatter).err())
            .collect();
        let mirror_errors: Vec<EngineError> = mirror_scatters
            .par_iter()
            .filter_map(|(lvid, program, direction)| {
                executor::scatter_local(program, &ctx, &graph, *lvid, *direction).err()
            })
            .collect();
        for e in owner_errors.into_iter().chain(mirror_errors) {
            note(&mut failure, e);
        }

        let updates = running.iter().filter(|a| a.applied).count() as u64;
        Ok(RoundOutcome { updates, failure })
    }
}

#[async_trait]
impl<P: VertexProgram> Engine<P> for SynchronousEngine<P> {
    fn signal(&self, vertex: VertexId, message: P::Message) {
        self.active.signal(vertex, message);
    }

    fn signal_all(&self, message: P::Message) {
        self.active.signal_all(message);
    }

    async fn start(&mut self) -> EngineResult<RunSummary> {
        let result = self.run().await;
        self.stop.reset();
        result
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl<P: VertexProgram> SynchronousEngine<P> {
    async fn run(&mut self) -> EngineResult<RunSummary> {
        let started = Instant::now();
        let timeout = self.config.timeout();
        self.iteration = 0;
        let mut updates = 0u64;
        info!(
            "Machine {} starting synchronous engine ({} scheduler)",
            self.machine.id(),
            self.active.scheduler_name()
        );

        let reason = loop {
            self.state = SyncState::Barrier;
            self.exchange_signals().await?;

            let timed_out = timeout.is_some_and(|t| started.elapsed() >= t);
            let report = (self.active.len() as u64, self.stop.is_stopped(), timed_out);
            let reports = self.machine.all_gather(report).await?;
            let pending: u64 = reports.iter().map(|r| r.0).sum();
            if reports.iter().any(|r| r.1) {
                break TerminationReason::Stopped;
            }
            if pending == 0 {
                break TerminationReason::Converged;
            }
            if self.config.max_iterations.is_some_and(|m| self.iteration >= m) {
                break TerminationReason::IterationLimit;
            }
            if reports.iter().any(|r| r.2) {
                break TerminationReason::Timeout;
            }

            let info = RunInfo {
                machine: self.machine.id(),
                num_machines: self.machine.num_machines(),
                iteration: self.iteration,
                num_vertices: self.graph.num_vertices(),
                num_edges: self.graph.num_edges(),
                started,
            };
            let outcome = self.run_round(&info).await?;
            let failed = self.machine.all_gather(outcome.failure.is_some()).await?;
            if let Err(e) = agree_on_failure(outcome.failure, &failed) {
                self.active.clear();
                self.state = SyncState::Terminated;
                return Err(e);
            }
            updates += outcome.updates;
            self.iteration += 1;
            debug!(
                "Machine {} finished round {} ({} global pending at start, {} local updates)",
                self.machine.id(),
                self.iteration,
                pending,
                outcome.updates
            );
        };

        self.state = SyncState::Terminated;
        if reason == TerminationReason::Stopped {
            self.active.clear();
        }
        let updates = self.machine.all_sum(updates).await?;
        let elapsed = started.elapsed();
        info!(
            "Machine {} synchronous engine finished: {} after {} rounds, {} updates in {:?}",
            self.machine.id(),
            reason,
            self.iteration,
            updates,
            elapsed
        );
        Ok(RunSummary {
            iterations: self.iteration,
            updates,
            elapsed,
            reason,
            trace: Vec::new(),
        })
    }
}

//! Asynchronous engine
//!
//! Each machine runs one message loop and up to `workers` concurrent
//! activations. An activation:
//!
//! 1. acquires its lock plan, one lock at a time in ascending vertex order
//! 2. runs `init` and `gather_edges`, then gathers locally and on every mirror
//!    holding gather edges
//! 3. applies on the owner
//! 4. ships the new data, program and scatter direction to every mirror and
//!    scatters locally; mirrors refresh their replica, scatter and acknowledge
//! 5. releases its locks once every mirror has acknowledged
//!
//! The loop services remote lock, gather and scatter requests while
//! activations are suspended, so a waiting activation never blocks its
//! machine. Global quiescence is detected with Safra's token algorithm.

use super::context::{Context, RunInfo, StopHandle};
use super::executor;
use super::program::VertexProgram;
use super::trace::{ActivationLog, ActivationRecord};
use super::{agree_on_failure, Engine, EngineError, EngineResult, RunSummary, TerminationReason};
use crate::cluster::{CommError, CommResult, Endpoint, MachineContext, MachineId, Outbox};
use crate::config::EngineConfig;
use crate::consistency::{
    lock_plan, ConsistencyError, ConsistencyManager, ConsistencyModel, ConsistencyResult, LockMode, LockTransport,
};
use crate::graph::{DistributedGraph, EdgeDirection, LocalGraph, LocalVid, VertexId};
use crate::scheduler::{ActiveSet, Step, TerminationDetector, Token, VertexIndex};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

enum AsyncMessage<P: VertexProgram> {
    Signal {
        vertex: VertexId,
        message: P::Message,
    },
    LockRequest {
        request: u64,
        vertex: VertexId,
        mode: LockMode,
    },
    LockGrant {
        request: u64,
    },
    Unlock {
        vertex: VertexId,
        mode: LockMode,
    },
    Gather {
        request: u64,
        vertex: VertexId,
        program: P,
        direction: EdgeDirection,
    },
    GatherReply {
        request: u64,
        total: Option<P::Gather>,
        /// The mirror's gather failed; `total` is incomplete
        failed: bool,
    },
    Scatter {
        request: u64,
        vertex: VertexId,
        data: P::VertexData,
        program: P,
        direction: EdgeDirection,
    },
    ScatterAck {
        request: u64,
    },
    Stop,
    Token(Token),
    Terminate,
}

impl<P: VertexProgram> AsyncMessage<P> {
    /// Messages counted by termination detection
    fn is_basic(&self) -> bool {
        !matches!(self, AsyncMessage::Token(_) | AsyncMessage::Terminate)
    }
}

/// Completion of a request awaited by an activation
enum Reply<G> {
    Granted,
    Gathered(Option<G>),
    GatherFailed,
    Scattered,
}

/// Why this machine entered stop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    None,
    Requested,
    Timeout,
}

/// State shared by the message loop and the activations of one machine
struct Shared<P: VertexProgram> {
    machine: MachineId,
    graph: Arc<LocalGraph<P::VertexData, P::EdgeData>>,
    prototype: P,
    consistency: ConsistencyModel,
    active: Arc<ActiveSet<P::Message>>,
    manager: ConsistencyManager,
    outbox: Outbox<AsyncMessage<P>>,
    stop: StopHandle,
    trace: Option<ActivationLog>,
    /// Basic messages sent during the current run
    sent: AtomicI64,
    updates: AtomicU64,
    next_request: AtomicU64,
    pending: Mutex<FxHashMap<u64, oneshot::Sender<Reply<P::Gather>>>>,
}

impl<P: VertexProgram> Shared<P> {
    fn send(&self, target: MachineId, message: AsyncMessage<P>) -> CommResult<()> {
        if message.is_basic() {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
        self.outbox.send(target, message)
    }

    fn register(&self) -> (u64, oneshot::Receiver<Reply<P::Gather>>) {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request, tx);
        (request, rx)
    }

    fn complete(&self, request: u64, reply: Reply<P::Gather>) {
        let waiter = self.pending.lock().remove(&request);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("Machine {} got a reply for unknown request {}", self.machine, request),
        }
    }

    /// Send buffered signals for remote vertices to their owners
    fn flush_signals(&self) -> CommResult<()> {
        for (target, batch) in self.active.take_remote().into_iter().enumerate() {
            for (vertex, message) in batch {
                self.send(target, AsyncMessage::Signal { vertex, message })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<P: VertexProgram> LockTransport for Shared<P> {
    async fn lock_remote(&self, owner: MachineId, vertex: VertexId, mode: LockMode) -> ConsistencyResult<()> {
        let (request, rx) = self.register();
        self.send(owner, AsyncMessage::LockRequest { request, vertex, mode })?;
        match rx.await {
            Ok(Reply::Granted) => Ok(()),
            _ => Err(ConsistencyError::Abandoned(vertex)),
        }
    }

    fn unlock_remote(&self, owner: MachineId, vertex: VertexId, mode: LockMode) -> ConsistencyResult<()> {
        Ok(self.send(owner, AsyncMessage::Unlock { vertex, mode })?)
    }

    fn grant_remote(&self, machine: MachineId, request: u64) -> ConsistencyResult<()> {
        Ok(self.send(machine, AsyncMessage::LockGrant { request })?)
    }
}

/// One full GAS cycle of an owned vertex, under its locks
async fn activate<P: VertexProgram>(
    shared: Arc<Shared<P>>,
    info: Arc<RunInfo>,
    lvid: LocalVid,
    message: P::Message,
) -> EngineResult<()> {
    let graph = Arc::clone(&shared.graph);
    let vertex = graph.vertex(lvid).id();
    let plan = lock_plan(shared.consistency, vertex, graph.scope(lvid));
    shared.manager.acquire(&plan, shared.as_ref()).await?;

    let started = Instant::now();
    let result = run_cycle(&shared, &info, lvid, message).await;
    let finished = Instant::now();
    if let Some(log) = &shared.trace {
        log.record(ActivationRecord {
            vertex,
            machine: shared.machine,
            started,
            finished,
        });
    }

    let released = shared.manager.release(&plan, shared.as_ref());
    result?;
    released?;
    Ok(())
}

async fn run_cycle<P: VertexProgram>(
    shared: &Shared<P>,
    info: &RunInfo,
    lvid: LocalVid,
    message: P::Message,
) -> EngineResult<()> {
    let graph = shared.graph.as_ref();
    let ctx = Context::new(info, shared.active.as_ref(), &shared.stop);
    let vertex = graph.vertex(lvid).id();
    let mut program = shared.prototype.clone();

    let gather = executor::begin(&mut program, &ctx, graph, lvid, message)?;
    let mut total = None;
    if !gather.is_none() {
        let mut partials = Vec::new();
        for mirror in graph.mirrors(lvid) {
            if mirror.has_edges(gather) {
                let (request, rx) = shared.register();
                shared.send(
                    mirror.machine,
                    AsyncMessage::Gather {
                        request,
                        vertex,
                        program: program.clone(),
                        direction: gather,
                    },
                )?;
                partials.push((mirror.machine, rx));
            }
        }
        total = executor::gather_local(&program, &ctx, graph, lvid, gather)?;
        let mut incomplete = false;
        for (machine, rx) in partials {
            match rx.await {
                Ok(Reply::Gathered(partial)) => executor::combine(&mut total, partial),
                Ok(Reply::GatherFailed) => incomplete = true,
                _ => return Err(CommError::Disconnected(machine).into()),
            }
        }
        // The failing mirror reports the error and stops the run
        if incomplete {
            debug!("Machine {} abandoning {} after a failed remote gather", shared.machine, vertex);
            return Ok(());
        }
    }

    let scatter = executor::apply(&mut program, &ctx, graph, lvid, total)?;
    shared.updates.fetch_add(1, Ordering::Relaxed);

    // New data reaches every replica before the locks are released
    let mut acks = Vec::new();
    let mirrors = graph.mirrors(lvid);
    if !mirrors.is_empty() {
        let data = graph.clone_data(lvid);
        for mirror in mirrors {
            let (request, rx) = shared.register();
            shared.send(
                mirror.machine,
                AsyncMessage::Scatter {
                    request,
                    vertex,
                    data: data.clone(),
                    program: program.clone(),
                    direction: scatter,
                },
            )?;
            acks.push((mirror.machine, rx));
        }
    }
    if !scatter.is_none() {
        executor::scatter_local(&program, &ctx, graph, lvid, scatter)?;
    }
    shared.flush_signals()?;
    for (machine, rx) in acks {
        match rx.await {
            Ok(Reply::Scattered) => {}
            _ => return Err(CommError::Disconnected(machine).into()),
        }
    }
    Ok(())
}

fn note(failure: &mut Option<EngineError>, err: EngineError) {
    error!("{}", err);
    if failure.is_none() {
        *failure = Some(err);
    }
}

/// What woke the message loop
enum Event<P: VertexProgram> {
    Message(MachineId, AsyncMessage<P>),
    Finished(Result<EngineResult<()>, tokio::task::JoinError>),
    Wake,
}

pub struct AsynchronousEngine<P: VertexProgram> {
    machine: MachineContext,
    endpoint: Endpoint<AsyncMessage<P>>,
    shared: Arc<Shared<P>>,
    config: EngineConfig,
}

impl<P: VertexProgram> AsynchronousEngine<P> {
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
        let endpoint: Endpoint<AsyncMessage<P>> = machine.endpoint()?;
        let shared = Arc::new(Shared {
            machine: machine.id(),
            graph: local,
            prototype,
            consistency: config.consistency,
            active,
            manager: ConsistencyManager::new(machine.id(), machine.num_machines(), graph.partitioner()),
            outbox: endpoint.outbox(),
            stop: StopHandle::new(),
            trace: config.trace_activations.then(ActivationLog::new),
            sent: AtomicI64::new(0),
            updates: AtomicU64::new(0),
            next_request: AtomicU64::new(0),
            pending: Mutex::new(FxHashMap::default()),
        });
        Ok(Self {
            machine,
            endpoint,
            shared,
            config,
        })
    }

    /// Pending local vertices
    pub fn num_active(&self) -> usize {
        self.shared.active.len()
    }

    /// Stop popping work and tell every peer to do the same
    fn begin_stop(&self, stopping: &mut bool) -> CommResult<()> {
        if *stopping {
            return Ok(());
        }
        *stopping = true;
        self.shared.active.clear();
        for peer in 0..self.machine.num_machines() {
            if peer != self.machine.id() {
                self.shared.send(peer, AsyncMessage::Stop)?;
            }
        }
        Ok(())
    }

    /// Serve one request from a peer. Program failures are recorded, and the
    /// requester is still answered so it can release its locks.
    fn handle(
        &self,
        info: &RunInfo,
        from: MachineId,
        message: AsyncMessage<P>,
        failure: &mut Option<EngineError>,
    ) -> EngineResult<()> {
        let shared = self.shared.as_ref();
        let graph = shared.graph.as_ref();
        let ctx = Context::new(info, shared.active.as_ref(), &shared.stop);
        match message {
            AsyncMessage::Signal { vertex, message } => {
                shared.active.deliver(vertex, message);
            }
            AsyncMessage::LockRequest { request, vertex, mode } => {
                shared.manager.handle_request(from, request, vertex, mode, shared)?;
            }
            AsyncMessage::LockGrant { request } => shared.complete(request, Reply::Granted),
            AsyncMessage::Unlock { vertex, mode } => {
                shared.manager.unlock(vertex, mode, shared)?;
            }
            AsyncMessage::Gather {
                request,
                vertex,
                program,
                direction,
            } => {
                let (total, failed) = match graph.lvid(vertex) {
                    Some(lvid) => match executor::gather_local(&program, &ctx, graph, lvid, direction) {
                        Ok(total) => (total, false),
                        Err(e) => {
                            note(failure, e);
                            (None, true)
                        }
                    },
                    None => {
                        warn!("Machine {} has no replica of {}", shared.machine, vertex);
                        (None, false)
                    }
                };
                shared.send(from, AsyncMessage::GatherReply { request, total, failed })?;
            }
            AsyncMessage::GatherReply { request, total, failed } => {
                let reply = if failed { Reply::GatherFailed } else { Reply::Gathered(total) };
                shared.complete(request, reply);
            }
            AsyncMessage::Scatter {
                request,
                vertex,
                data,
                program,
                direction,
            } => {
                match graph.lvid(vertex) {
                    Some(lvid) => {
                        graph.set_data(lvid, data);
                        if !direction.is_none() {
                            if let Err(e) = executor::scatter_local(&program, &ctx, graph, lvid, direction) {
                                note(failure, e);
                            }
                        }
                    }
                    None => warn!("Machine {} has no replica of {}", shared.machine, vertex),
                }
                shared.flush_signals()?;
                shared.send(from, AsyncMessage::ScatterAck { request })?;
            }
            AsyncMessage::ScatterAck { request } => shared.complete(request, Reply::Scattered),
            AsyncMessage::Stop | AsyncMessage::Token(_) | AsyncMessage::Terminate => {}
        }
        Ok(())
    }
}

#[async_trait]
impl<P: VertexProgram> Engine<P> for AsynchronousEngine<P> {
    fn signal(&self, vertex: VertexId, message: P::Message) {
        self.shared.active.signal(vertex, message);
    }

    fn signal_all(&self, message: P::Message) {
        self.shared.active.signal_all(message);
    }

    async fn start(&mut self) -> EngineResult<RunSummary> {
        let result = self.run().await;
        self.shared.stop.reset();
        result
    }

    fn stop_handle(&self) -> StopHandle {
        self.shared.stop.clone()
    }
}

impl<P: VertexProgram> AsynchronousEngine<P> {
    async fn run(&mut self) -> EngineResult<RunSummary> {
        let started = Instant::now();
        let me = self.machine.id();
        let num_machines = self.machine.num_machines();
        let shared = Arc::clone(&self.shared);
        let stop = shared.stop.clone();
        let info = Arc::new(RunInfo {
            machine: me,
            num_machines,
            iteration: 0,
            num_vertices: shared.graph.num_vertices(),
            num_edges: shared.graph.num_edges(),
            started,
        });
        shared.sent.store(0, Ordering::SeqCst);
        shared.updates.store(0, Ordering::SeqCst);

        let workers = self.config.workers.max(1);
        let deadline = self.config.timeout().map(|t| tokio::time::Instant::now() + t);
        let far_future = tokio::time::Instant::now() + Duration::from_secs(365 * 24 * 3600);
        let mut detector = TerminationDetector::new(me, num_machines);
        let mut running: JoinSet<EngineResult<()>> = JoinSet::new();
        let mut failure: Option<EngineError> = None;
        let mut stopping = false;
        let mut cause = Cause::None;
        info!(
            "Machine {} starting asynchronous engine ({} scheduler, {:?} consistency, {} workers)",
            me,
            shared.active.scheduler_name(),
            shared.consistency,
            workers
        );

        loop {
            shared.flush_signals()?;
            if !stopping {
                if stop.is_stopped() {
                    cause = Cause::Requested;
                    self.begin_stop(&mut stopping)?;
                } else if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    cause = Cause::Timeout;
                    self.begin_stop(&mut stopping)?;
                }
            }
            if !stopping {
                while running.len() < workers {
                    match shared.active.pop() {
                        Some((lvid, message)) => {
                            running.spawn(activate(Arc::clone(&shared), Arc::clone(&info), lvid, message));
                        }
                        None => break,
                    }
                }
            }

            let passive = running.is_empty() && (stopping || shared.active.is_empty());
            match detector.poll(passive, shared.sent.load(Ordering::SeqCst)) {
                Step::Forward { to, token } => shared.send(to, AsyncMessage::Token(token))?,
                Step::Terminated => {
                    for peer in (0..num_machines).filter(|&m| m != me) {
                        shared.send(peer, AsyncMessage::Terminate)?;
                    }
                    break;
                }
                Step::Idle => {}
            }

            let event = tokio::select! {
                received = self.endpoint.recv() => {
                    let envelope = received?;
                    Event::Message(envelope.from, envelope.payload)
                }
                Some(joined) = running.join_next(), if !running.is_empty() => Event::Finished(joined),
                _ = stop.stopped(), if !stopping => Event::Wake,
                _ = tokio::time::sleep_until(deadline.unwrap_or(far_future)), if deadline.is_some() && !stopping => Event::Wake,
            };

            match event {
                Event::Message(from, message) => {
                    if message.is_basic() {
                        detector.on_receive();
                    }
                    match message {
                        AsyncMessage::Terminate => break,
                        AsyncMessage::Token(token) => detector.on_token(token),
                        AsyncMessage::Stop => {
                            stopping = true;
                            shared.active.clear();
                        }
                        other => {
                            let had_failure = failure.is_some();
                            self.handle(&info, from, other, &mut failure)?;
                            if !had_failure && failure.is_some() {
                                self.begin_stop(&mut stopping)?;
                            }
                        }
                    }
                }
                Event::Finished(joined) => {
                    let outcome = joined.map_err(|e| EngineError::Join(e.to_string())).and_then(|r| r);
                    if let Err(e) = outcome {
                        note(&mut failure, e);
                        self.begin_stop(&mut stopping)?;
                    }
                }
                Event::Wake => {}
            }
        }

        shared.active.clear();
        let local_updates = shared.updates.load(Ordering::SeqCst);
        let report = (failure.is_some(), cause == Cause::Timeout, cause == Cause::Requested, local_updates);
        let reports = self.machine.all_gather(report).await?;
        let failed: Vec<bool> = reports.iter().map(|r| r.0).collect();
        agree_on_failure(failure, &failed)?;

        let reason = if reports.iter().any(|r| r.1) {
            TerminationReason::Timeout
        } else if reports.iter().any(|r| r.2) {
            TerminationReason::Stopped
        } else {
            TerminationReason::Converged
        };
        let updates: u64 = reports.iter().map(|r| r.3).sum();
        let elapsed = started.elapsed();
        info!(
            "Machine {} asynchronous engine finished: {}, {} updates in {:?}",
            me, reason, updates, elapsed
        );
        Ok(RunSummary {
            iterations: 0,
            updates,
            elapsed,
            reason,
            trace: shared.trace.as_ref().map(ActivationLog::take).unwrap_or_default(),
        })
    }
}

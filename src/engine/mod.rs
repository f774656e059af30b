//! Vertex-program execution engines
//!
//! Two engines run the same [`VertexProgram`] contract:
//! - [`SynchronousEngine`]: barrier-separated rounds over a snapshot of the active set
//! - [`AsynchronousEngine`]: independent activations serialized by the consistency manager

pub mod async_engine;
pub mod context;
pub(crate) mod executor;
pub mod program;
pub mod sync;
pub mod trace;

pub use async_engine::AsynchronousEngine;
pub use context::{Context, RunInfo, SignalSink, StopHandle};
pub use executor::Phase;
pub use program::{ProgramEdge, ProgramEdgeMut, ProgramVertex, ProgramVertexMut, VertexProgram};
pub use sync::{SyncState, SynchronousEngine};
pub use trace::{ActivationLog, ActivationRecord};

use crate::cluster::{CommError, MachineId};
use crate::consistency::ConsistencyError;
use crate::graph::{GraphError, VertexId};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Vertex program failed in {phase} on {vertex}: {message}")]
    VertexProgram {
        vertex: VertexId,
        phase: Phase,
        message: String,
    },

    #[error("Machine {machine} failed")]
    RemoteFailure { machine: MachineId },

    #[error("Engine task failed: {0}")]
    Join(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a run ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// No machine had an active vertex left
    Converged,
    /// `max_iterations` rounds ran
    IterationLimit,
    /// The configured timeout elapsed
    Timeout,
    /// `stop()` was called
    Stopped,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::Converged => "converged",
            TerminationReason::IterationLimit => "iteration limit",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one engine run, identical on every machine except `trace`
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Rounds completed (synchronous engine only)
    pub iterations: usize,
    /// Applies executed across the cluster
    pub updates: u64,
    pub elapsed: Duration,
    pub reason: TerminationReason,
    /// This machine's activations, when tracing is enabled
    pub trace: Vec<ActivationRecord>,
}

/// Common surface of both engines
#[async_trait]
pub trait Engine<P: VertexProgram>: Send {
    /// Schedule `vertex`, which may be owned by any machine
    fn signal(&self, vertex: VertexId, message: P::Message);

    /// Schedule every vertex this machine owns
    fn signal_all(&self, message: P::Message);

    /// Run until the active set is globally empty or another stop condition
    /// holds. Collective.
    async fn start(&mut self) -> EngineResult<RunSummary>;

    fn stop_handle(&self) -> StopHandle;
}

/// Resolve a per-machine failure flag into a shared outcome: the failing
/// machine keeps its own error, the others report the first failing machine.
pub(crate) fn agree_on_failure(local: Option<EngineError>, failed: &[bool]) -> EngineResult<()> {
    match failed.iter().position(|&f| f) {
        None => Ok(()),
        Some(machine) => Err(local.unwrap_or(EngineError::RemoteFailure { machine })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agree_on_failure() {
        assert_eq!(agree_on_failure(None, &[false, false]), Ok(()));
        assert_eq!(
            agree_on_failure(None, &[false, true, true]),
            Err(EngineError::RemoteFailure { machine: 1 })
        );
        let own = EngineError::Join("boom".to_string());
        assert_eq!(agree_on_failure(Some(own.clone()), &[false, true]), Err(own));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::VertexProgram {
            vertex: VertexId::new(3),
            phase: Phase::Apply,
            message: "oops".to_string(),
        };
        assert_eq!(err.to_string(), "Vertex program failed in apply on VertexId(3): oops");
    }
}

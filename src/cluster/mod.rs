//! In-process cluster substrate
//!
//! Every distributed component in this crate talks to its peers only through
//! the primitives in this module:
//! - Reliable, per-pair FIFO point-to-point messaging ([`Endpoint`], [`Outbox`])
//! - Epoch-tagged all-to-all batch exchange ([`Exchange`])
//! - Barrier, all-gather and all-reduce ([`Collective`])
//!
//! A [`Cluster`] simulates `N` machines as `N` tokio tasks in one process. Each
//! task receives a [`MachineContext`], the explicit handle passed to the graph
//! store, schedulers and engines.

pub mod collective;
pub mod exchange;
pub mod machine;
pub mod network;

pub use collective::Collective;
pub use exchange::Exchange;
pub use machine::{Cluster, MachineContext};
pub use network::{Endpoint, Envelope, Outbox};

use thiserror::Error;

/// Machine (process) identifier, dense in `0..num_machines`
pub type MachineId = usize;

/// Communication errors. The substrate is assumed reliable, so every one of
/// these is fatal to the computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    #[error("Machine {0} is unreachable")]
    Disconnected(MachineId),

    #[error("Channel {index} was registered with a different message type")]
    ChannelMismatch { index: usize },

    #[error("Collective operation received mismatched value types")]
    CollectiveMismatch,

    #[error("Machine {machine} failed: {reason}")]
    MachineFailed { machine: MachineId, reason: String },

    #[error("Invalid cluster size: {0}")]
    InvalidClusterSize(usize),
}

pub type CommResult<T> = Result<T, CommError>;

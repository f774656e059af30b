//! Consistency manager for the asynchronous engine
//!
//! Every vertex lock lives on the machine owning the vertex. An activation
//! computes its [`lock_plan`] and acquires the locks one at a time in
//! ascending [`VertexId`] order, which rules out circular waits across
//! machines. Contended requests queue FIFO; remote ones are granted by a
//! message from the owner.

pub mod lock_table;
pub mod manager;

pub use lock_table::LockTable;
pub use manager::{ConsistencyManager, LockTransport};

use crate::cluster::CommError;
use crate::graph::VertexId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mutual exclusion around one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyModel {
    /// Exclusive on the vertex and every neighbor: adjacent activations never overlap
    Full,
    /// Exclusive on the vertex, shared on its neighbors
    #[default]
    Edge,
    /// Exclusive on the vertex only
    Vertex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("Lock on {0} was abandoned before it was granted")]
    Abandoned(VertexId),

    #[error("Communication error: {0}")]
    Comm(#[from] CommError),
}

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;

/// Locks needed to activate `center`, ascending by vertex id.
///
/// `scope` is the center's distinct neighbor set, ascending and without the
/// center itself.
pub fn lock_plan(model: ConsistencyModel, center: VertexId, scope: &[VertexId]) -> Vec<(VertexId, LockMode)> {
    let neighbor_mode = match model {
        ConsistencyModel::Full => LockMode::Write,
        ConsistencyModel::Edge => LockMode::Read,
        ConsistencyModel::Vertex => return vec![(center, LockMode::Write)],
    };
    let mut plan = Vec::with_capacity(scope.len() + 1);
    let split = scope.partition_point(|&n| n < center);
    plan.extend(scope[..split].iter().map(|&n| (n, neighbor_mode)));
    plan.push((center, LockMode::Write));
    plan.extend(scope[split..].iter().map(|&n| (n, neighbor_mode)));
    plan
}

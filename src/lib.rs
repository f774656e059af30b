//! Samyama GAS
//!
//! A distributed, vertex-centric graph computation engine. A directed graph is
//! partitioned across machines and small vertex programs run repeatedly
//! following the Gather-Apply-Scatter protocol, either in synchronous rounds
//! or asynchronously under a distributed consistency protocol.
//!
//! # Architecture
//!
//! - [`cluster`]: in-process machines connected by typed FIFO channels, with
//!   barrier and all-gather collectives
//! - [`graph`]: partitioned storage, replicas and finalized adjacency indices
//! - [`scheduler`]: per-machine active sets, message merging and
//!   distributed termination detection
//! - [`consistency`]: ordered, FIFO distributed vertex locks
//! - [`engine`]: the vertex program contract and the two engines
//! - [`algo`]: toolkit programs (PageRank, connected components, shortest paths)
//! - [`io`]: line loader and record writers
//!
//! ## Example Usage
//!
//! ```rust
//! use samyama_gas::algo::{collect_vertex_data, PageRank};
//! use samyama_gas::cluster::Cluster;
//! use samyama_gas::engine::{Engine, SynchronousEngine};
//! use samyama_gas::graph::{DistributedGraph, VertexId};
//! use samyama_gas::EngineConfig;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let cluster = Cluster::new(2).unwrap();
//! let ranks = cluster
//!     .run(|machine| async move {
//!         let mut graph: DistributedGraph<f64, ()> = DistributedGraph::new(&machine).unwrap();
//!         if machine.id() == 0 {
//!             for id in 0..3 {
//!                 graph.add_vertex(VertexId::new(id), 1.0).unwrap();
//!             }
//!             for (s, t) in [(0, 1), (1, 2), (2, 0)] {
//!                 graph.add_edge(VertexId::new(s), VertexId::new(t), ()).unwrap();
//!             }
//!         }
//!         graph.finalize().await.unwrap();
//!
//!         let config = EngineConfig::default().with_max_iterations(10);
//!         let mut engine = SynchronousEngine::new(&graph, PageRank::fixed(0.85), config).unwrap();
//!         engine.signal_all(());
//!         engine.start().await.unwrap();
//!         collect_vertex_data(&graph).await.unwrap()
//!     })
//!     .await
//!     .unwrap();
//!
//! // A directed cycle keeps every rank at 1.0
//! assert!((ranks[0][&VertexId::new(1)] - 1.0).abs() < 1e-9);
//! # });
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod cluster;
pub mod config;
pub mod consistency;
pub mod engine;
pub mod graph;
pub mod io;
pub mod scheduler;

// Re-export main types for convenience
pub use cluster::{Cluster, CommError, CommResult, MachineContext, MachineId};

pub use config::{ClusterConfig, ConfigError, ConfigResult, EngineConfig, GasConfig};

pub use consistency::{ConsistencyError, ConsistencyModel, LockMode};

pub use engine::{
    AsynchronousEngine, Context, Engine, EngineError, EngineResult, RunSummary, StopHandle, SynchronousEngine,
    TerminationReason, VertexProgram,
};

pub use graph::{
    DistributedGraph, EdgeDirection, EdgeRef, GraphError, GraphResult, PartitionerKind, VertexId, VertexMut,
    VertexRef,
};

pub use scheduler::{Message, SchedulerKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
